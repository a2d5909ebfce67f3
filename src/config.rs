//! Configuration module for the tanglewatch proxy
//!
//! This module handles all configuration loading from TOML files,
//! environment variables, and provides structured configuration types.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ledger node (IRI) configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Proxy listener configuration
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Confirmation retry configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Proof-of-work parameters used for reattach and promotion
    #[serde(default)]
    pub pow: PowConfig,

    /// Monitoring and metrics
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node HTTP endpoint
    #[serde(default = "default_node_endpoint")]
    pub endpoint: String,

    /// Value sent in the X-IOTA-API-Version header
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Request timeout in seconds
    #[serde(default = "default_node_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Port the proxy listens on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Maximum accepted request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Seconds between inclusion-check cycles for one bundle
    #[serde(default = "default_cadence")]
    pub cadence_secs: u64,

    /// Maximum reattach attempts before a bundle is given up on
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Minimum number of promotion steps per reattach
    #[serde(default = "default_min_promotion_budget")]
    pub min_promotion_budget: usize,

    /// Seconds between consecutive promotion steps
    #[serde(default = "default_promotion_step")]
    pub promotion_step_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowConfig {
    /// Tip-selection depth
    #[serde(default = "default_depth")]
    pub depth: u32,

    /// Minimum weight magnitude (mainnet: 14)
    #[serde(default = "default_mwm")]
    pub min_weight_magnitude: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

// Default value functions
fn default_node_endpoint() -> String {
    "http://localhost:14265".to_string()
}
fn default_api_version() -> String {
    "1".to_string()
}
fn default_node_timeout() -> u64 {
    30
}
fn default_listen_port() -> u16 {
    14266
}
fn default_max_body_bytes() -> usize {
    1_000_000
}
fn default_cadence() -> u64 {
    15 * 60
}
fn default_max_attempts() -> u32 {
    5
}
fn default_min_promotion_budget() -> usize {
    4
}
fn default_promotion_step() -> u64 {
    1
}
fn default_depth() -> u32 {
    4
}
fn default_mwm() -> u32 {
    14
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_true() -> bool {
    true
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_node_endpoint(),
            api_version: default_api_version(),
            timeout_secs: default_node_timeout(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            cadence_secs: default_cadence(),
            max_attempts: default_max_attempts(),
            min_promotion_budget: default_min_promotion_budget(),
            promotion_step_secs: default_promotion_step(),
        }
    }
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            min_weight_magnitude: default_mwm(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: default_true(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_file(path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            proxy: ProxyConfig::default(),
            retry: RetryConfig::default(),
            pow: PowConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}
