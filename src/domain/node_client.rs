//! Node Telemetry Client — one node, three independent bounded fetches.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{FetchError, TransportError};
use crate::transport::NodeTransport;

use super::types::{FetchKind, NodeHealth, NodeStats};

/// One failed fetch inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchFailure {
    pub kind: FetchKind,
    pub error: FetchError,
}

/// Result of querying one node. Lives only for one aggregation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub node_id: String,
    /// At least one of the three fetches succeeded.
    pub reachable: bool,
    pub stats: Option<NodeStats>,
    pub health: Option<NodeHealth>,
    pub metrics: Option<String>,
    pub errors: Vec<FetchFailure>,
    pub fetched_at: DateTime<Utc>,
}

impl NodeSnapshot {
    /// A node that produced nothing, with the same error for every payload.
    pub fn failed(node_id: String, error: FetchError) -> Self {
        Self {
            errors: FetchKind::ALL
                .iter()
                .map(|&kind| FetchFailure {
                    kind,
                    error: error.clone(),
                })
                .collect(),
            node_id,
            reachable: false,
            stats: None,
            health: None,
            metrics: None,
            fetched_at: Utc::now(),
        }
    }

    /// Payload kinds that did not arrive.
    pub fn missing(&self) -> Vec<FetchKind> {
        let mut kinds: Vec<FetchKind> = self.errors.iter().map(|f| f.kind).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|f| format!("{}: {}", f.kind.as_str(), f.error))
            .collect()
    }
}

pub struct NodeTelemetryClient<T> {
    transport: Arc<T>,
    fetch_timeout: Duration,
}

impl<T: NodeTransport> NodeTelemetryClient<T> {
    pub fn new(transport: Arc<T>, fetch_timeout: Duration) -> Self {
        Self {
            transport,
            fetch_timeout,
        }
    }

    /// Fetch stats, health, and metrics concurrently. A failure in one never
    /// aborts the others.
    pub async fn snapshot(&self, node_id: &str) -> NodeSnapshot {
        let timeout = self.fetch_timeout;
        let (stats, health, metrics) = tokio::join!(
            bounded(node_id, timeout, self.transport.fetch_stats(node_id, timeout)),
            bounded(node_id, timeout, self.transport.fetch_health(node_id, timeout)),
            bounded(node_id, timeout, self.transport.fetch_metrics(node_id, timeout)),
        );

        let mut errors = Vec::new();
        let stats = keep(
            FetchKind::Stats,
            stats.and_then(|b| decode_json::<NodeStats>(node_id, &b)),
            &mut errors,
        );
        let health = keep(
            FetchKind::Health,
            health.and_then(|b| decode_json::<NodeHealth>(node_id, &b)),
            &mut errors,
        );
        let metrics = keep(
            FetchKind::Metrics,
            metrics.and_then(|b| decode_text(node_id, b)),
            &mut errors,
        );

        let reachable = stats.is_some() || health.is_some() || metrics.is_some();
        if !reachable {
            warn!(node = node_id, "node unreachable, all fetches failed");
        } else if !errors.is_empty() {
            debug!(node = node_id, failed = errors.len(), "node returned partial telemetry");
        }

        NodeSnapshot {
            node_id: node_id.to_string(),
            reachable,
            stats,
            health,
            metrics,
            errors,
            fetched_at: Utc::now(),
        }
    }
}

/// Apply the per-fetch timeout. A timeout counts as a transport error.
async fn bounded<F>(node_id: &str, timeout: Duration, fetch: F) -> Result<Vec<u8>, FetchError>
where
    F: Future<Output = Result<Vec<u8>, TransportError>>,
{
    match tokio::time::timeout(timeout, fetch).await {
        Ok(Ok(body)) => Ok(body),
        Ok(Err(e)) => Err(FetchError::NodeUnreachable {
            node_id: node_id.to_string(),
            detail: e.to_string(),
        }),
        Err(_) => Err(FetchError::NodeUnreachable {
            node_id: node_id.to_string(),
            detail: format!("timed out after {}ms", timeout.as_millis()),
        }),
    }
}

fn decode_json<P: DeserializeOwned>(node_id: &str, body: &[u8]) -> Result<P, FetchError> {
    serde_json::from_slice(body).map_err(|e| FetchError::Upstream {
        node_id: node_id.to_string(),
        detail: e.to_string(),
    })
}

fn decode_text(node_id: &str, body: Vec<u8>) -> Result<String, FetchError> {
    String::from_utf8(body).map_err(|e| FetchError::Upstream {
        node_id: node_id.to_string(),
        detail: format!("metrics are not UTF-8: {e}"),
    })
}

fn keep<P>(
    kind: FetchKind,
    result: Result<P, FetchError>,
    errors: &mut Vec<FetchFailure>,
) -> Option<P> {
    match result {
        Ok(payload) => Some(payload),
        Err(error) => {
            errors.push(FetchFailure { kind, error });
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable in-process transport shared by the domain tests.

    use std::collections::HashMap;
    use std::time::Duration;

    use serde_json::Value;

    use crate::error::TransportError;
    use crate::transport::NodeTransport;

    use super::FetchKind;

    #[derive(Debug, Clone, Default)]
    pub struct ScriptedNode {
        pub delay: Duration,
        pub stats: Option<Vec<u8>>,
        pub health: Option<Vec<u8>>,
        pub metrics: Option<Vec<u8>>,
        /// This fetch never completes in any reasonable time.
        pub hang: Option<FetchKind>,
        /// This fetch panics inside the node task.
        pub panic_on: Option<FetchKind>,
    }

    impl ScriptedNode {
        pub fn healthy(stats: Value) -> Self {
            Self {
                stats: Some(stats.to_string().into_bytes()),
                health: Some(br#"{"coreRunning":true,"version":"25.1.1"}"#.to_vec()),
                metrics: Some(b"xray_up 1\n".to_vec()),
                ..Default::default()
            }
        }

        pub fn down() -> Self {
            Self::default()
        }

        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[derive(Default)]
    pub struct ScriptedTransport {
        pub nodes: HashMap<String, ScriptedNode>,
    }

    impl ScriptedTransport {
        pub fn with(mut self, id: &str, node: ScriptedNode) -> Self {
            self.nodes.insert(id.to_string(), node);
            self
        }

        async fn fetch(&self, node_id: &str, kind: FetchKind) -> Result<Vec<u8>, TransportError> {
            let node = self
                .nodes
                .get(node_id)
                .ok_or_else(|| TransportError::UnknownNode(node_id.to_string()))?;

            tokio::time::sleep(node.delay).await;
            if node.panic_on == Some(kind) {
                panic!("scripted {} fetch panic for {node_id}", kind.as_str());
            }
            if node.hang == Some(kind) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }

            let body = match kind {
                FetchKind::Stats => &node.stats,
                FetchKind::Health => &node.health,
                FetchKind::Metrics => &node.metrics,
            };
            body.clone()
                .ok_or_else(|| TransportError::Connection("connection refused".into()))
        }
    }

    impl NodeTransport for ScriptedTransport {
        async fn fetch_stats(&self, node_id: &str, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
            self.fetch(node_id, FetchKind::Stats).await
        }

        async fn fetch_health(&self, node_id: &str, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
            self.fetch(node_id, FetchKind::Health).await
        }

        async fn fetch_metrics(&self, node_id: &str, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
            self.fetch(node_id, FetchKind::Metrics).await
        }
    }
}
