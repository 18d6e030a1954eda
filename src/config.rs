//! Configuration types for polysettle

use serde::Deserialize;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Ledger node connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Node gateway HTTP endpoint
    pub http_url: String,
    /// Node event feed websocket endpoint
    pub ws_url: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Bounded wait for transaction confirmation
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    /// Receipt polling cadence while waiting for confirmation
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_request_timeout() -> u64 {
    10
}
fn default_confirmation_timeout() -> u64 {
    60
}
fn default_poll_interval() -> u64 {
    2
}

/// Decision service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Enable automated resolution
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// OpenAI-compatible base URL
    #[serde(default = "default_oracle_url")]
    pub base_url: String,

    /// Model identifier
    #[serde(default = "default_oracle_model")]
    pub model: String,

    /// Single-call timeout
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,

    /// API key; leave empty to read ORACLE_API_KEY from the environment
    #[serde(default)]
    pub api_key: String,
}

fn default_true() -> bool {
    true
}
fn default_oracle_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_oracle_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_oracle_timeout() -> u64 {
    30
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_oracle_url(),
            model: default_oracle_model(),
            timeout_secs: default_oracle_timeout(),
            api_key: String::new(),
        }
    }
}

/// Sweep cadence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Reconciliation sweep interval (seconds)
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Resolution sweep interval (seconds)
    #[serde(default = "default_resolve_interval")]
    pub resolve_interval_secs: u64,

    /// Pause between markets within one resolution sweep (milliseconds)
    #[serde(default = "default_inter_market_delay")]
    pub inter_market_delay_ms: u64,
}

fn default_reconcile_interval() -> u64 {
    30
}
fn default_resolve_interval() -> u64 {
    60
}
fn default_inter_market_delay() -> u64 {
    500
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 30,
            resolve_interval_secs: 60,
            inter_market_delay_ms: 500,
        }
    }
}

/// HTTP surface configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Serve the oracle status/trigger endpoints
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_api_port(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Prometheus exporter port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Default log level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_metrics_port() -> u16 {
    9090
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialize() {
        let toml = r#"
            [ledger]
            http_url = "http://localhost:8545"
            ws_url = "ws://localhost:8546/events"
            confirmation_timeout_secs = 45

            [oracle]
            enabled = true
            model = "gpt-4o"
            timeout_secs = 20

            [scheduler]
            reconcile_interval_secs = 15
            resolve_interval_secs = 120

            [api]
            enabled = true
            port = 3000

            [telemetry]
            metrics_port = 9191
            log_level = "debug"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.ledger.http_url, "http://localhost:8545");
        assert_eq!(config.ledger.confirmation_timeout_secs, 45);
        assert_eq!(config.ledger.request_timeout_secs, 10); // default
        assert_eq!(config.oracle.model, "gpt-4o");
        assert_eq!(config.scheduler.reconcile_interval_secs, 15);
        assert_eq!(config.api.port, 3000);
        assert_eq!(config.telemetry.metrics_port, 9191);
    }

    #[test]
    fn test_config_minimal() {
        let toml = r#"
            [ledger]
            http_url = "http://node:8545"
            ws_url = "ws://node:8546/events"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.oracle.enabled);
        assert_eq!(config.oracle.base_url, "https://api.openai.com/v1");
        assert_eq!(config.scheduler.resolve_interval_secs, 60);
        assert_eq!(config.scheduler.inter_market_delay_ms, 500);
        assert!(config.api.enabled);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_config_missing_ledger_section_fails() {
        let result: Result<Config, _> = toml::from_str("[oracle]\nenabled = false");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_oracle_disabled() {
        let toml = r#"
            [ledger]
            http_url = "http://node:8545"
            ws_url = "ws://node:8546/events"

            [oracle]
            enabled = false
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(!config.oracle.enabled);
    }
}
