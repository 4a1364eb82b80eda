//! Layered node configuration (defaults < file < env), matching the
//! recognized options of spec.md §6. Loaded with the `config` crate the
//! way the teacher's `ilp-node` loads its `config::Config`.

use std::collections::HashMap;

use serde::Deserialize;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSettings {
    pub node_id: String,
    pub ilp_address: String,
    #[serde(default = "default_btp_port")]
    pub btp_server_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub explorer_port: Option<u16>,
    pub health_check_port: Option<u16>,
}

fn default_btp_port() -> u16 {
    7768
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeerSettings {
    pub id: String,
    pub url: String,
    pub auth_token: String,
    pub ilp_prefix: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteSettings {
    pub prefix: String,
    pub next_hop: String,
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitOverride {
    pub max_requests_per_second: Option<f64>,
    pub max_requests_per_minute: Option<f64>,
    pub burst_size: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_rps")]
    pub max_requests_per_second: f64,
    #[serde(default = "default_rpm")]
    pub max_requests_per_minute: f64,
    #[serde(default = "default_burst")]
    pub burst_size: f64,
    #[serde(default = "default_block_duration_secs")]
    pub block_duration_secs: u64,
    #[serde(default = "default_violation_threshold")]
    pub violation_threshold: u32,
    #[serde(default = "default_violation_window_secs")]
    pub violation_window_secs: u64,
    #[serde(default)]
    pub peer_limits: HashMap<String, RateLimitOverride>,
    #[serde(default)]
    pub trusted_peers: Vec<String>,
    #[serde(default)]
    pub adaptive: bool,
}

fn default_rps() -> f64 {
    100.0
}
fn default_rpm() -> f64 {
    3000.0
}
fn default_burst() -> f64 {
    100.0
}
fn default_block_duration_secs() -> u64 {
    30
}
fn default_violation_threshold() -> u32 {
    5
}
fn default_violation_window_secs() -> u64 {
    10
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        RateLimitSettings {
            max_requests_per_second: default_rps(),
            max_requests_per_minute: default_rpm(),
            burst_size: default_burst(),
            block_duration_secs: default_block_duration_secs(),
            violation_threshold: default_violation_threshold(),
            violation_window_secs: default_violation_window_secs(),
            peer_limits: HashMap::new(),
            trusted_peers: Vec::new(),
            adaptive: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FraudSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_auto_pause_threshold")]
    pub auto_pause_threshold: String,
    #[serde(default = "default_rapid_funding_threshold")]
    pub rapid_funding_threshold: usize,
    #[serde(default = "default_unusual_std_dev")]
    pub unusual_transaction_std_dev: f64,
}

fn default_auto_pause_threshold() -> String {
    "high".to_string()
}
fn default_rapid_funding_threshold() -> usize {
    5
}
fn default_unusual_std_dev() -> f64 {
    3.0
}

impl Default for FraudSettings {
    fn default() -> Self {
        FraudSettings {
            enabled: true,
            auto_pause_threshold: default_auto_pause_threshold(),
            rapid_funding_threshold: default_rapid_funding_threshold(),
            unusual_transaction_std_dev: default_unusual_std_dev(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    pub event_store_path: Option<String>,
    #[serde(default = "default_max_database_bytes")]
    pub max_database_bytes: u64,
}

fn default_buffer_size() -> usize {
    1000
}
fn default_flush_interval_ms() -> u64 {
    100
}
fn default_max_database_bytes() -> u64 {
    100 * 1024 * 1024
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        TelemetrySettings {
            buffer_size: default_buffer_size(),
            flush_interval_ms: default_flush_interval_ms(),
            event_store_path: None,
            max_database_bytes: default_max_database_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_broadcast_interval_secs")]
    pub broadcast_interval_secs: u64,
    #[serde(default)]
    pub discovery_endpoints: Vec<String>,
    pub announce_address: Option<String>,
}

fn default_broadcast_interval_secs() -> u64 {
    60
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        DiscoverySettings {
            enabled: false,
            broadcast_interval_secs: default_broadcast_interval_secs(),
            discovery_endpoints: Vec::new(),
            announce_address: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSettings,
    #[serde(default)]
    pub peers: Vec<PeerSettings>,
    #[serde(default)]
    pub routes: Vec<RouteSettings>,
    #[serde(default)]
    pub rate_limits: RateLimitSettings,
    #[serde(default)]
    pub fraud: FraudSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
}

#[derive(Debug)]
pub enum ConfigError {
    Load(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Load(msg) => write!(f, "failed to load configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Layers defaults, an optional config file, then `ILC_`-prefixed
/// environment variables, matching `ilp-node`'s `config::Config`
/// layering (json/toml/yaml file formats, §6 "Configuration recognized
/// options").
pub fn load(config_path: Option<&str>) -> Result<NodeConfig, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = config_path {
        builder = builder.add_source(config::File::with_name(path));
    }
    builder = builder.add_source(config::Environment::with_prefix("ILC").separator("__"));

    let settings = builder.build().map_err(|e| ConfigError::Load(e.to_string()))?;
    settings
        .try_deserialize::<NodeConfig>()
        .map_err(|e| ConfigError::Load(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_defaults_match_spec() {
        let defaults = RateLimitSettings::default();
        assert_eq!(defaults.max_requests_per_second, 100.0);
        assert_eq!(defaults.violation_threshold, 5);
        assert_eq!(defaults.block_duration_secs, 30);
    }

    #[test]
    fn telemetry_defaults_match_spec() {
        let defaults = TelemetrySettings::default();
        assert_eq!(defaults.buffer_size, 1000);
        assert_eq!(defaults.flush_interval_ms, 100);
    }
}
