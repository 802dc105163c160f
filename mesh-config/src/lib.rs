//! Node configuration: a single YAML document loaded from secure storage,
//! following `nearcore::config`'s "parse, then `verify()`, then use" shape.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILENAME: &str = "config.yaml";

fn default_gossip_interval_min() -> f64 {
    0.2
}
fn default_gossip_interval_max() -> f64 {
    2.0
}
fn default_failure_timeout() -> f64 {
    10.0
}
fn default_max_gossip_targets() -> usize {
    3
}
fn default_compression_threshold() -> usize {
    4096
}
fn default_jwt_expiration_hours() -> u64 {
    24
}
fn default_cleanup_interval() -> f64 {
    30.0
}
fn default_adjust_interval_period() -> f64 {
    10.0
}

/// Pool limits and timeouts for the pooled HTTPS transport (spec.md §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "TransportConfig::default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "TransportConfig::default_max_keepalive")]
    pub max_keepalive: usize,
    #[serde(default = "TransportConfig::default_keepalive_expiry_secs")]
    pub keepalive_expiry_secs: u64,
    #[serde(default = "TransportConfig::default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "TransportConfig::default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "TransportConfig::default_total_timeout_secs")]
    pub total_timeout_secs: u64,
}

impl TransportConfig {
    fn default_max_connections() -> usize {
        64
    }
    fn default_max_keepalive() -> usize {
        32
    }
    fn default_keepalive_expiry_secs() -> u64 {
        90
    }
    fn default_connect_timeout_secs() -> u64 {
        5
    }
    fn default_read_timeout_secs() -> u64 {
        10
    }
    fn default_total_timeout_secs() -> u64 {
        15
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_connections: Self::default_max_connections(),
            max_keepalive: Self::default_max_keepalive(),
            keepalive_expiry_secs: Self::default_keepalive_expiry_secs(),
            connect_timeout_secs: Self::default_connect_timeout_secs(),
            read_timeout_secs: Self::default_read_timeout_secs(),
            total_timeout_secs: Self::default_total_timeout_secs(),
        }
    }
}

/// Hash-cracking worker pool sizing (spec.md §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashJobConfig {
    #[serde(default = "HashJobConfig::default_pool_size_ceiling")]
    pub pool_size_ceiling: usize,
    #[serde(default = "HashJobConfig::default_progress_interval_secs")]
    pub progress_interval_secs: u64,
    #[serde(default = "HashJobConfig::default_lookahead_batches")]
    pub lookahead_batches: usize,
    #[serde(default = "HashJobConfig::default_base_chunk_size")]
    pub base_chunk_size: u64,
}

impl HashJobConfig {
    fn default_pool_size_ceiling() -> usize {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
    }
    fn default_progress_interval_secs() -> u64 {
        10
    }
    fn default_lookahead_batches() -> usize {
        2
    }
    fn default_base_chunk_size() -> u64 {
        100_000
    }
}

impl Default for HashJobConfig {
    fn default() -> Self {
        Self {
            pool_size_ceiling: Self::default_pool_size_ceiling(),
            progress_interval_secs: Self::default_progress_interval_secs(),
            lookahead_batches: Self::default_lookahead_batches(),
            base_chunk_size: Self::default_base_chunk_size(),
        }
    }
}

/// Update-engine retention and rollout defaults (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    #[serde(default = "UpdateConfig::default_backup_retention")]
    pub backup_retention: usize,
    #[serde(default = "UpdateConfig::default_rolling_interval_secs")]
    pub rolling_interval_secs: u64,
    #[serde(default = "UpdateConfig::default_max_failures")]
    pub max_failures: usize,
    #[serde(default = "UpdateConfig::default_canary_duration_secs")]
    pub canary_duration_secs: u64,
}

impl UpdateConfig {
    fn default_backup_retention() -> usize {
        3
    }
    fn default_rolling_interval_secs() -> u64 {
        30
    }
    fn default_max_failures() -> usize {
        1
    }
    fn default_canary_duration_secs() -> u64 {
        120
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            backup_retention: Self::default_backup_retention(),
            rolling_interval_secs: Self::default_rolling_interval_secs(),
            max_failures: Self::default_max_failures(),
            canary_duration_secs: Self::default_canary_duration_secs(),
        }
    }
}

/// Top-level node configuration, matching the keys enumerated in spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node_id: String,
    #[serde(default = "Config::default_port")]
    pub port: u16,
    #[serde(default = "Config::default_bind_address")]
    pub bind_address: String,
    #[serde(default)]
    pub coordinator_mode: bool,
    #[serde(default)]
    pub coordinator_addresses: Vec<String>,

    #[serde(default = "default_gossip_interval_min")]
    pub gossip_interval_min: f64,
    #[serde(default = "default_gossip_interval_max")]
    pub gossip_interval_max: f64,
    #[serde(default = "default_failure_timeout")]
    pub failure_timeout: f64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: f64,
    #[serde(default = "default_adjust_interval_period")]
    pub adjust_interval_period: f64,
    #[serde(default = "default_max_gossip_targets")]
    pub max_gossip_targets: usize,

    #[serde(default = "Config::default_compression_enabled")]
    pub compression_enabled: bool,
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,

    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiration_hours")]
    pub jwt_expiration_hours: u64,

    #[serde(default)]
    pub ssl_cert_file: Option<PathBuf>,
    #[serde(default)]
    pub ssl_key_file: Option<PathBuf>,
    #[serde(default)]
    pub ssl_ca_cert_file: Option<PathBuf>,
    #[serde(default = "Config::default_ssl_verify")]
    pub ssl_verify: bool,

    pub state_directory: PathBuf,

    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub hashjob: HashJobConfig,
    #[serde(default)]
    pub update: UpdateConfig,
}

impl Config {
    fn default_port() -> u16 {
        9001
    }
    fn default_bind_address() -> String {
        "0.0.0.0".to_string()
    }
    fn default_compression_enabled() -> bool {
        true
    }
    fn default_ssl_verify() -> bool {
        true
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Config> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.verify().context("config")?;
        Ok(config)
    }

    /// Validates cross-field invariants that `serde` alone can't express.
    /// Mirrors the teacher's `NetworkConfig::verify()` convention: parse
    /// first, then verify, so error messages are about semantics, not
    /// syntax.
    pub fn verify(&self) -> Result<(), ConfigError> {
        if self.node_id.trim().is_empty() {
            return Err(ConfigError::Invalid("node_id must not be empty".into()));
        }
        if self.gossip_interval_min <= 0.0 || self.gossip_interval_max < self.gossip_interval_min {
            return Err(ConfigError::Invalid(
                "gossip_interval_min must be positive and <= gossip_interval_max".into(),
            ));
        }
        if self.failure_timeout <= self.gossip_interval_max {
            return Err(ConfigError::Invalid(
                "failure_timeout must exceed gossip_interval_max".into(),
            ));
        }
        if !self.coordinator_mode && self.coordinator_addresses.is_empty() {
            return Err(ConfigError::Invalid(
                "worker nodes must configure at least one coordinator_addresses entry".into(),
            ));
        }
        if self.jwt_secret.len() < 16 {
            return Err(ConfigError::Invalid("jwt_secret must be at least 16 bytes".into()));
        }
        Ok(())
    }

    pub fn certs_dir(&self) -> PathBuf {
        self.state_directory.join("certs")
    }

    pub fn role_label(&self) -> &'static str {
        if self.coordinator_mode { "coordinator" } else { "worker" }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            node_id: "node-1".into(),
            port: 9001,
            bind_address: "0.0.0.0".into(),
            coordinator_mode: true,
            coordinator_addresses: vec![],
            gossip_interval_min: 0.2,
            gossip_interval_max: 2.0,
            failure_timeout: 10.0,
            cleanup_interval: 30.0,
            adjust_interval_period: 10.0,
            max_gossip_targets: 3,
            compression_enabled: true,
            compression_threshold: 4096,
            jwt_secret: "0123456789abcdef".into(),
            jwt_expiration_hours: 24,
            ssl_cert_file: None,
            ssl_key_file: None,
            ssl_ca_cert_file: None,
            ssl_verify: true,
            state_directory: PathBuf::from("/tmp/mesh-state"),
            transport: TransportConfig::default(),
            hashjob: HashJobConfig::default(),
            update: UpdateConfig::default(),
        }
    }

    #[test]
    fn coordinator_without_peers_is_valid() {
        assert!(base_config().verify().is_ok());
    }

    #[test]
    fn worker_requires_coordinator_addresses() {
        let mut config = base_config();
        config.coordinator_mode = false;
        assert!(config.verify().is_err());
        config.coordinator_addresses.push("127.0.0.1:9001".into());
        assert!(config.verify().is_ok());
    }

    #[test]
    fn rejects_short_jwt_secret() {
        let mut config = base_config();
        config.jwt_secret = "short".into();
        assert!(config.verify().is_err());
    }
}
