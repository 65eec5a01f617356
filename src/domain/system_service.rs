//! System facade — the single entry point for fleet telemetry and key
//! generation.
//!
//! Each read fans out through the aggregator and selects the sub-payload the
//! caller asked for. Telemetry reads always produce a response (possibly
//! partial); only keypair generation can fail.

use std::sync::Arc;

use tracing::info;

use crate::error::ControlError;
use crate::transport::NodeTransport;

use super::aggregator::{FleetAggregator, FleetView};
use super::host::FingerprintPolicy;
use super::host_store::{HostFilter, HostStore};
use super::keypair::{self, EncodedKeyPair};
use super::registry::NodeRegistry;
use super::types::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemSettings {
    /// Whether hidden hosts count towards host totals.
    pub include_hidden_hosts: bool,
    pub fingerprint_policy: FingerprintPolicy,
    pub keygen_batch_size: usize,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            include_hidden_hosts: true,
            fingerprint_policy: FingerprintPolicy::default(),
            keygen_batch_size: 1,
        }
    }
}

pub struct SystemService<T, S> {
    aggregator: FleetAggregator<T>,
    registry: NodeRegistry,
    hosts: Arc<S>,
    settings: SystemSettings,
}

impl<T: NodeTransport, S: HostStore> SystemService<T, S> {
    pub fn new(
        aggregator: FleetAggregator<T>,
        registry: NodeRegistry,
        hosts: Arc<S>,
        settings: SystemSettings,
    ) -> Self {
        Self {
            aggregator,
            registry,
            hosts,
            settings,
        }
    }

    pub fn settings(&self) -> &SystemSettings {
        &self.settings
    }

    pub fn hosts(&self) -> &Arc<S> {
        &self.hosts
    }

    async fn collect(&self) -> FleetView {
        let ids = self.registry.list_active_node_ids();
        self.aggregator.collect(&ids).await
    }

    pub async fn get_stats(&self) -> FleetStats {
        let view = self.collect().await;
        let hosts = self.host_summary().await;

        FleetStats {
            node_count: view.node_count() as u64,
            reachable_nodes: view.reachable_count() as u64,
            partial: view.is_partial(),
            failed_nodes: view.failed_node_ids(),
            totals: TrafficTotals::from(&view.totals),
            hosts,
            collected_at: view.collected_at,
        }
    }

    async fn host_summary(&self) -> HostSummary {
        let filter = HostFilter {
            include_hidden: self.settings.include_hidden_hosts,
            ..HostFilter::default()
        };
        let policy = &self.settings.fingerprint_policy;

        self.hosts
            .list(filter)
            .await
            .iter()
            .fold(HostSummary::default(), |mut acc, host| {
                acc.total += 1;
                acc.routable += u64::from(host.is_routable(policy));
                acc.disabled += u64::from(host.is_disabled);
                acc.hidden += u64::from(host.is_hidden);
                acc
            })
    }

    pub async fn get_bandwidth_stats(&self, query: &BandwidthQuery) -> BandwidthStats {
        let ids = match &query.node_id {
            Some(node_id) if self.registry.contains(node_id) => vec![node_id.clone()],
            Some(_) => Vec::new(),
            None => self.registry.list_active_node_ids(),
        };
        let view = self.aggregator.collect(&ids).await;

        let periods = match query.period {
            Some(period) => vec![period],
            None => BandwidthPeriod::ALL.to_vec(),
        };

        BandwidthStats {
            node_count: view.node_count() as u64,
            partial: view.is_partial(),
            failed_nodes: view.failed_node_ids(),
            periods: periods
                .into_iter()
                .map(|period| {
                    let traffic = view.totals.bandwidth.get(period);
                    PeriodTraffic {
                        period,
                        upload_bytes: traffic.upload,
                        download_bytes: traffic.download,
                    }
                })
                .collect(),
        }
    }

    pub async fn get_nodes_statistics(&self) -> Vec<PerNodeStatistics> {
        let view = self.collect().await;
        view.snapshots
            .values()
            .map(|snap| PerNodeStatistics {
                node_id: snap.node_id.clone(),
                reachable: snap.reachable,
                stats: snap.stats.as_ref().map(TrafficTotals::from),
                core_running: snap.health.as_ref().map(|h| h.core_running),
                core_version: snap.health.as_ref().and_then(|h| h.version.clone()),
                missing: snap.missing(),
                errors: snap.error_messages(),
                fetched_at: snap.fetched_at,
            })
            .collect()
    }

    pub async fn get_health(&self) -> HealthReport {
        let view = self.collect().await;
        HealthReport {
            status: view.health(),
            node_count: view.node_count() as u64,
            failed_nodes: view.failed_node_ids(),
            missing_payloads: view.missing_payloads(),
            deadline_exceeded: view.deadline_exceeded,
        }
    }

    pub async fn get_nodes_metrics(&self) -> Vec<PerNodeMetrics> {
        let view = self.collect().await;
        view.metrics()
            .map(|(node_id, metrics)| PerNodeMetrics {
                node_id: node_id.to_string(),
                metrics: metrics.to_string(),
            })
            .collect()
    }

    pub fn generate_x25519_keypairs(&self) -> Result<X25519Keypairs, ControlError> {
        let pairs = keypair::generate_batch(self.settings.keygen_batch_size)?;
        info!(count = pairs.len(), "generated x25519 keypairs");
        Ok(X25519Keypairs {
            keypairs: pairs.iter().map(EncodedKeyPair::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::super::aggregator::AggregatorSettings;
    use super::super::host::HostDraft;
    use super::super::host_store::MemoryHostStore;
    use super::super::node_client::testing::{ScriptedNode, ScriptedTransport};
    use super::*;
    use crate::config::NodeTarget;

    fn target(id: &str) -> NodeTarget {
        NodeTarget {
            id: id.to_string(),
            url: format!("http://{id}.invalid"),
            enabled: true,
            token: None,
        }
    }

    fn service(
        transport: ScriptedTransport,
        node_ids: &[&str],
        settings: SystemSettings,
    ) -> SystemService<ScriptedTransport, MemoryHostStore> {
        let aggregator = FleetAggregator::new(
            Arc::new(transport),
            AggregatorSettings {
                fetch_timeout: Duration::from_millis(300),
                deadline: Duration::from_secs(2),
            },
        );
        let registry = NodeRegistry::new(node_ids.iter().map(|id| target(id)).collect());
        SystemService::new(aggregator, registry, Arc::new(MemoryHostStore::new()), settings)
    }

    fn two_nodes() -> ScriptedTransport {
        ScriptedTransport::default()
            .with(
                "a",
                ScriptedNode::healthy(json!({
                    "bytesSent": 100,
                    "usersOnline": 2,
                    "bandwidth": { "today": { "upload": 10, "download": 20 } }
                })),
            )
            .with(
                "b",
                ScriptedNode::healthy(json!({
                    "bytesSent": 200,
                    "usersOnline": 3,
                    "bandwidth": { "today": { "upload": 1, "download": 2 }, "last7Days": { "upload": 50 } }
                })),
            )
    }

    #[tokio::test]
    async fn stats_sum_traffic_and_count_hosts() {
        let svc = service(two_nodes(), &["a", "b"], SystemSettings::default());
        let mut hidden = HostDraft::new("hidden", "h.example.net", 443);
        hidden.is_hidden = true;
        let mut reality = HostDraft::new("reality", "r.example.net", 443);
        reality.security_layer = Some("REALITY".into());
        svc.hosts().create(hidden.build().unwrap()).await.unwrap();
        svc.hosts().create(reality.build().unwrap()).await.unwrap();

        let stats = svc.get_stats().await;
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.totals.bytes_sent, 300);
        assert_eq!(stats.totals.users_online, 5);
        assert!(!stats.partial);
        assert_eq!(stats.hosts.total, 2);
        assert_eq!(stats.hosts.hidden, 1);
        // REALITY without any fingerprint source.
        assert_eq!(stats.hosts.routable, 1);
    }

    #[tokio::test]
    async fn hidden_hosts_can_be_excluded_from_totals() {
        let settings = SystemSettings {
            include_hidden_hosts: false,
            ..SystemSettings::default()
        };
        let svc = service(ScriptedTransport::default(), &[], settings);
        let mut hidden = HostDraft::new("hidden", "h.example.net", 443);
        hidden.is_hidden = true;
        svc.hosts().create(hidden.build().unwrap()).await.unwrap();

        let stats = svc.get_stats().await;
        assert_eq!(stats.hosts.total, 0);
        assert_eq!(stats.node_count, 0);
        assert!(!stats.partial);
    }

    #[tokio::test]
    async fn bandwidth_filters_by_period_and_node() {
        let svc = service(two_nodes(), &["a", "b"], SystemSettings::default());

        let all = svc.get_bandwidth_stats(&BandwidthQuery::default()).await;
        assert_eq!(all.periods.len(), 4);
        assert_eq!(all.periods[0].upload_bytes, 11);
        assert_eq!(all.periods[1].upload_bytes, 50);

        let one = svc
            .get_bandwidth_stats(&BandwidthQuery {
                period: Some(BandwidthPeriod::Today),
                node_id: Some("a".into()),
            })
            .await;
        assert_eq!(one.node_count, 1);
        assert_eq!(one.periods.len(), 1);
        assert_eq!(one.periods[0].download_bytes, 20);

        let unknown = svc
            .get_bandwidth_stats(&BandwidthQuery {
                period: None,
                node_id: Some("zz".into()),
            })
            .await;
        assert_eq!(unknown.node_count, 0);
        assert!(unknown.periods.iter().all(|p| p.upload_bytes == 0));
    }

    #[tokio::test]
    async fn health_is_degraded_with_failed_ids() {
        let transport = two_nodes().with("c", ScriptedNode::down());
        let svc = service(transport, &["a", "b", "c"], SystemSettings::default());

        let health = svc.get_health().await;
        assert_eq!(health.status, FleetHealth::Degraded);
        assert_eq!(health.failed_nodes, vec!["c".to_string()]);
        assert_eq!(health.node_count, 3);

        let healthy = service(two_nodes(), &["a", "b"], SystemSettings::default())
            .get_health()
            .await;
        assert_eq!(healthy.status, FleetHealth::Healthy);
    }

    #[tokio::test]
    async fn node_statistics_include_unreachable_nodes() {
        let transport = two_nodes().with("c", ScriptedNode::down());
        let svc = service(transport, &["c", "a", "b"], SystemSettings::default());

        let nodes = svc.get_nodes_statistics().await;
        let ids: Vec<&str> = nodes.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(nodes[0].core_running, Some(true));
        assert!(!nodes[2].reachable);
        assert_eq!(nodes[2].stats, None);
        assert_eq!(nodes[2].errors.len(), 3);
    }

    #[tokio::test]
    async fn metrics_stay_attributed_per_node() {
        let mut b = ScriptedNode::healthy(json!({}));
        b.metrics = Some(b"xray_up 0\n".to_vec());
        let transport = two_nodes().with("b", b).with("c", ScriptedNode::down());
        let svc = service(transport, &["a", "b", "c"], SystemSettings::default());

        let metrics = svc.get_nodes_metrics().await;
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].node_id, "a");
        assert_eq!(metrics[0].metrics, "xray_up 1\n");
        assert_eq!(metrics[1].metrics, "xray_up 0\n");
    }

    #[tokio::test]
    async fn keypair_batch_follows_settings() {
        let settings = SystemSettings {
            keygen_batch_size: 3,
            ..SystemSettings::default()
        };
        let svc = service(ScriptedTransport::default(), &[], settings);
        let pairs = svc.generate_x25519_keypairs().unwrap();
        assert_eq!(pairs.keypairs.len(), 3);
        assert_ne!(pairs.keypairs[0], pairs.keypairs[1]);
    }
}
