use std::ops::AddAssign;
use std::str::FromStr;

use async_graphql::{Enum, InputObject, SimpleObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::keypair::EncodedKeyPair;

// ── Node wire payloads ─────────────────────────────────────

/// Upload/download byte counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase", default)]
pub struct Traffic {
    pub upload: u64,
    pub download: u64,
}

impl AddAssign for Traffic {
    fn add_assign(&mut self, rhs: Self) {
        self.upload = self.upload.saturating_add(rhs.upload);
        self.download = self.download.saturating_add(rhs.download);
    }
}

/// Per-period bandwidth as reported by a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BandwidthCounters {
    pub today: Traffic,
    #[serde(rename = "last7Days")]
    pub last_7_days: Traffic,
    #[serde(rename = "last30Days")]
    pub last_30_days: Traffic,
    pub current_month: Traffic,
}

impl BandwidthCounters {
    pub fn get(&self, period: BandwidthPeriod) -> Traffic {
        match period {
            BandwidthPeriod::Today => self.today,
            BandwidthPeriod::Last7Days => self.last_7_days,
            BandwidthPeriod::Last30Days => self.last_30_days,
            BandwidthPeriod::CurrentMonth => self.current_month,
        }
    }
}

impl AddAssign for BandwidthCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.today += rhs.today;
        self.last_7_days += rhs.last_7_days;
        self.last_30_days += rhs.last_30_days;
        self.current_month += rhs.current_month;
    }
}

/// Stats payload served by a node. Missing counters read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connections: u64,
    pub users_online: u64,
    pub bandwidth: BandwidthCounters,
}

impl AddAssign for NodeStats {
    fn add_assign(&mut self, rhs: Self) {
        self.bytes_sent = self.bytes_sent.saturating_add(rhs.bytes_sent);
        self.bytes_received = self.bytes_received.saturating_add(rhs.bytes_received);
        self.connections = self.connections.saturating_add(rhs.connections);
        self.users_online = self.users_online.saturating_add(rhs.users_online);
        self.bandwidth += rhs.bandwidth;
    }
}

/// Health payload served by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealth {
    pub core_running: bool,
    #[serde(default)]
    pub version: Option<String>,
}

// ── Snapshot ───────────────────────────────────────────────

/// The three payloads fetched from every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Enum)]
#[serde(rename_all = "camelCase")]
pub enum FetchKind {
    Stats,
    Health,
    Metrics,
}

impl FetchKind {
    pub const ALL: [FetchKind; 3] = [FetchKind::Stats, FetchKind::Health, FetchKind::Metrics];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stats => "stats",
            Self::Health => "health",
            Self::Metrics => "metrics",
        }
    }
}

// ── Facade responses ───────────────────────────────────────

/// Fleet-wide traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct TrafficTotals {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connections: u64,
    pub users_online: u64,
}

impl From<&NodeStats> for TrafficTotals {
    fn from(stats: &NodeStats) -> Self {
        Self {
            bytes_sent: stats.bytes_sent,
            bytes_received: stats.bytes_received,
            connections: stats.connections,
            users_online: stats.users_online,
        }
    }
}

/// Host counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct HostSummary {
    pub total: u64,
    pub routable: u64,
    pub disabled: u64,
    pub hidden: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct FleetStats {
    /// Registered nodes queried. Zero means an empty fleet, not an outage.
    pub node_count: u64,
    pub reachable_nodes: u64,
    pub partial: bool,
    pub failed_nodes: Vec<String>,
    pub totals: TrafficTotals,
    pub hosts: HostSummary,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Enum)]
pub enum BandwidthPeriod {
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "last7Days")]
    Last7Days,
    #[serde(rename = "last30Days")]
    Last30Days,
    #[serde(rename = "currentMonth")]
    CurrentMonth,
}

impl BandwidthPeriod {
    pub const ALL: [BandwidthPeriod; 4] = [
        BandwidthPeriod::Today,
        BandwidthPeriod::Last7Days,
        BandwidthPeriod::Last30Days,
        BandwidthPeriod::CurrentMonth,
    ];
}

impl FromStr for BandwidthPeriod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Self::Today),
            "last7Days" => Ok(Self::Last7Days),
            "last30Days" => Ok(Self::Last30Days),
            "currentMonth" => Ok(Self::CurrentMonth),
            other => anyhow::bail!(
                "unknown period '{}' (expected today, last7Days, last30Days or currentMonth)",
                other
            ),
        }
    }
}

/// Filter for the bandwidth view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, InputObject)]
#[serde(rename_all = "camelCase")]
pub struct BandwidthQuery {
    #[serde(default)]
    pub period: Option<BandwidthPeriod>,
    #[serde(default)]
    pub node_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTraffic {
    pub period: BandwidthPeriod,
    pub upload_bytes: u64,
    pub download_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct BandwidthStats {
    pub node_count: u64,
    pub partial: bool,
    pub failed_nodes: Vec<String>,
    pub periods: Vec<PeriodTraffic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct PerNodeStatistics {
    pub node_id: String,
    pub reachable: bool,
    pub stats: Option<TrafficTotals>,
    pub core_running: Option<bool>,
    pub core_version: Option<String>,
    /// Payloads this node failed to deliver.
    pub missing: Vec<FetchKind>,
    pub errors: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "UPPERCASE")]
pub enum FleetHealth {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct MissingPayloads {
    pub node_id: String,
    pub kinds: Vec<FetchKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: FleetHealth,
    pub node_count: u64,
    pub failed_nodes: Vec<String>,
    /// Reachable nodes that still failed some fetches.
    pub missing_payloads: Vec<MissingPayloads>,
    pub deadline_exceeded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct PerNodeMetrics {
    pub node_id: String,
    /// Prometheus text exposition, passed through untouched.
    pub metrics: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct X25519Keypairs {
    pub keypairs: Vec<EncodedKeyPair>,
}

/// `{ "response": ... }` envelope used by every API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub response: T,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stats_payload_defaults_missing_counters() {
        let stats: NodeStats = serde_json::from_value(json!({
            "bytesSent": 100,
            "bandwidth": { "last7Days": { "upload": 5 } }
        }))
        .unwrap();

        assert_eq!(stats.bytes_sent, 100);
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.bandwidth.last_7_days, Traffic { upload: 5, download: 0 });
    }

    #[test]
    fn accumulation_saturates() {
        let mut total = NodeStats {
            bytes_sent: u64::MAX - 1,
            ..Default::default()
        };
        total += NodeStats {
            bytes_sent: 10,
            ..Default::default()
        };
        assert_eq!(total.bytes_sent, u64::MAX);
    }

    #[test]
    fn period_names_round_trip_through_from_str() {
        for period in BandwidthPeriod::ALL {
            let name = serde_json::to_value(period).unwrap();
            let parsed: BandwidthPeriod = name.as_str().unwrap().parse().unwrap();
            assert_eq!(parsed, period);
        }
        assert!("yesterday".parse::<BandwidthPeriod>().is_err());
    }
}
