use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::aggregator::AggregatorSettings;
use crate::domain::host::FingerprintPolicy;
use crate::domain::system_service::SystemSettings;

const ENV_PREFIX: &str = "REALITYCTL_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub hosts: HostsConfig,
    #[serde(default)]
    pub keygen: KeygenConfig,
    #[serde(default)]
    pub nodes: Vec<NodeTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            log_level: default_log_level(),
        }
    }
}

fn default_http_addr() -> String {
    "127.0.0.1:3010".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Timeout for each individual node fetch.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Overall bound on one fleet aggregation.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Count hidden hosts in fleet statistics.
    #[serde(default = "default_true")]
    pub include_hidden_hosts: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_fetch_timeout_ms(),
            deadline_ms: default_deadline_ms(),
            include_hidden_hosts: true,
        }
    }
}

fn default_fetch_timeout_ms() -> u64 {
    5_000
}

fn default_deadline_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

impl TelemetryConfig {
    pub fn aggregator_settings(&self) -> AggregatorSettings {
        AggregatorSettings {
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            deadline: Duration::from_millis(self.deadline_ms),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostsConfig {
    /// Fingerprint assumed for REALITY hosts that don't set one.
    #[serde(default)]
    pub default_fingerprint: Option<String>,
    /// YAML list of hosts loaded into the store at daemon start.
    #[serde(default)]
    pub seed_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeygenConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for KeygenConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    1
}

/// A proxy node the daemon collects telemetry from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTarget {
    pub id: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Bearer token presented to the node API.
    #[serde(default)]
    pub token: Option<String>,
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("realityctl").join("config.yaml"))
    }

    pub fn fingerprint_policy(&self) -> FingerprintPolicy {
        FingerprintPolicy::new(self.hosts.default_fingerprint.clone())
    }

    pub fn system_settings(&self) -> SystemSettings {
        SystemSettings {
            include_hidden_hosts: self.telemetry.include_hidden_hosts,
            fingerprint_policy: self.fingerprint_policy(),
            keygen_batch_size: self.keygen.batch_size,
        }
    }

    fn check(&self) -> Result<()> {
        if self.telemetry.fetch_timeout_ms == 0 {
            bail!("telemetry.fetch_timeout_ms must be greater than zero");
        }
        if self.telemetry.deadline_ms == 0 {
            bail!("telemetry.deadline_ms must be greater than zero");
        }
        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                bail!("node id '{}' is configured more than once", node.id);
            }
        }
        Ok(())
    }
}

/// Layer defaults, the YAML file, and `REALITYCTL_*` environment variables
/// (nested keys separated by `__`, e.g. `REALITYCTL_DAEMON__HTTP_ADDR`).
///
/// An explicit `path` must exist; the default path is optional.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                bail!("config file {} does not exist", p.display());
            }
            p.to_path_buf()
        }
        None => Config::path()?,
    };

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Yaml::file(&path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .with_context(|| format!("loading configuration from {}", path.display()))?;

    config.check()?;
    Ok(config)
}
