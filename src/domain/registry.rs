//! Node registry built from configuration.

use crate::config::NodeTarget;

#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    targets: Vec<NodeTarget>,
}

impl NodeRegistry {
    pub fn new(targets: Vec<NodeTarget>) -> Self {
        Self { targets }
    }

    /// Ids of every enabled node, in configuration order.
    pub fn list_active_node_ids(&self) -> Vec<String> {
        self.targets
            .iter()
            .filter(|t| t.enabled)
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.targets.iter().any(|t| t.enabled && t.id == node_id)
    }

    pub fn targets(&self) -> &[NodeTarget] {
        &self.targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, enabled: bool) -> NodeTarget {
        NodeTarget {
            id: id.to_string(),
            url: format!("https://{id}.example.net:2222"),
            enabled,
            token: None,
        }
    }

    #[test]
    fn disabled_nodes_are_not_active() {
        let registry = NodeRegistry::new(vec![target("de-1", true), target("nl-1", false)]);
        assert_eq!(registry.list_active_node_ids(), vec!["de-1".to_string()]);
        assert!(registry.contains("de-1"));
        assert!(!registry.contains("nl-1"));
    }
}
