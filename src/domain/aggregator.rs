//! Fleet Telemetry Aggregator — concurrent fan-out to every node, one join
//! barrier bounded by an overall deadline, and a commutative merge.
//!
//! Node failures never fail the call. They end up in `failed_nodes` and the
//! view is marked partial. An empty fleet is a normal, non-partial result.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::transport::NodeTransport;

use super::node_client::{NodeSnapshot, NodeTelemetryClient};
use super::types::{FleetHealth, MissingPayloads, NodeStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorSettings {
    /// Bound on each individual fetch.
    pub fetch_timeout: Duration,
    /// Bound on the whole aggregation, independent of `fetch_timeout`.
    pub deadline: Duration,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
            deadline: Duration::from_secs(10),
        }
    }
}

/// Merged result of one aggregation call.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetView {
    /// Keyed by node id; iteration order carries no meaning.
    pub snapshots: BTreeMap<String, NodeSnapshot>,
    /// Sum over every node that returned stats.
    pub totals: NodeStats,
    pub failed_nodes: BTreeSet<String>,
    pub deadline_exceeded: bool,
    pub collected_at: DateTime<Utc>,
}

impl FleetView {
    pub fn merge(snapshots: BTreeMap<String, NodeSnapshot>, deadline_exceeded: bool) -> Self {
        let mut totals = NodeStats::default();
        let mut failed_nodes = BTreeSet::new();

        for snap in snapshots.values() {
            if let Some(stats) = &snap.stats {
                totals += *stats;
            }
            if !snap.reachable {
                failed_nodes.insert(snap.node_id.clone());
            }
        }

        Self {
            snapshots,
            totals,
            failed_nodes,
            deadline_exceeded,
            collected_at: Utc::now(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.snapshots.len()
    }

    pub fn reachable_count(&self) -> usize {
        self.node_count() - self.failed_nodes.len()
    }

    pub fn is_partial(&self) -> bool {
        !self.failed_nodes.is_empty()
    }

    pub fn failed_node_ids(&self) -> Vec<String> {
        self.failed_nodes.iter().cloned().collect()
    }

    /// Healthy iff every node is reachable. Vacuously true for an empty fleet.
    pub fn health(&self) -> FleetHealth {
        if self.is_partial() {
            FleetHealth::Degraded
        } else {
            FleetHealth::Healthy
        }
    }

    /// Reachable nodes that still failed to deliver some payloads.
    pub fn missing_payloads(&self) -> Vec<MissingPayloads> {
        self.snapshots
            .values()
            .filter(|s| s.reachable && !s.errors.is_empty())
            .map(|s| MissingPayloads {
                node_id: s.node_id.clone(),
                kinds: s.missing(),
            })
            .collect()
    }

    /// Raw metrics per node; never merged across nodes.
    pub fn metrics(&self) -> impl Iterator<Item = (&str, &str)> {
        self.snapshots
            .values()
            .filter_map(|s| Some((s.node_id.as_str(), s.metrics.as_deref()?)))
    }
}

pub struct FleetAggregator<T> {
    transport: Arc<T>,
    settings: AggregatorSettings,
}

impl<T: NodeTransport> FleetAggregator<T> {
    pub fn new(transport: Arc<T>, settings: AggregatorSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// Query every node concurrently and merge whatever arrives before the
    /// deadline. Duplicate ids are queried once.
    pub async fn collect(&self, node_ids: &[String]) -> FleetView {
        let unique: BTreeSet<String> = node_ids.iter().cloned().collect();
        if unique.is_empty() {
            return FleetView::merge(BTreeMap::new(), false);
        }

        let client = Arc::new(NodeTelemetryClient::new(
            self.transport.clone(),
            self.settings.fetch_timeout,
        ));

        let mut tasks = JoinSet::new();
        for id in &unique {
            let client = client.clone();
            let id = id.clone();
            tasks.spawn(async move { client.snapshot(&id).await });
        }

        let deadline = Instant::now() + self.settings.deadline;
        let mut snapshots = BTreeMap::new();
        let mut deadline_exceeded = false;

        loop {
            let next = tokio::time::timeout_at(deadline, tasks.join_next()).await;
            match next {
                Ok(Some(Ok(snap))) => {
                    snapshots.insert(snap.node_id.clone(), snap);
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "node telemetry task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_exceeded = true;
                    // Keep snapshots that finished but were not reaped yet.
                    while let Some(done) = tasks.try_join_next() {
                        if let Ok(snap) = done {
                            snapshots.insert(snap.node_id.clone(), snap);
                        }
                    }
                    tasks.abort_all();
                    break;
                }
            }
        }

        for id in unique {
            if snapshots.contains_key(&id) {
                continue;
            }
            let error = if deadline_exceeded {
                FetchError::AggregationTimeout { node_id: id.clone() }
            } else {
                FetchError::NodeUnreachable {
                    node_id: id.clone(),
                    detail: "telemetry task aborted".to_string(),
                }
            };
            snapshots.insert(id.clone(), NodeSnapshot::failed(id, error));
        }

        let view = FleetView::merge(snapshots, deadline_exceeded);
        info!(
            nodes = view.node_count(),
            failed = view.failed_nodes.len(),
            deadline_exceeded = view.deadline_exceeded,
            "fleet telemetry collected"
        );
        view
    }
}
