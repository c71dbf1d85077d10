//! Configuration management for the risk guard

use crate::baseline::Baseline;
use crate::models::detectors::DetectorThresholds;
use crate::types::assessment::RiskLevelThresholds;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Which explanation provider to use
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationProviderKind {
    /// Local templated explanation only
    #[default]
    Template,
    /// Hosted text-generation endpoint with templated fallback
    Http,
}

/// Log output format
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub monitoring: MonitoringConfig,
    /// Baseline handed to sessions with no history yet
    pub baseline: Baseline,
    pub detection: DetectionConfig,
    pub explanation: ExplanationConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming transactions
    pub transaction_subject: String,
    /// Subject for outgoing risk alerts
    pub alert_subject: String,
    /// Give up on the broker after this long and run simulated
    pub connect_timeout_ms: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            transaction_subject: "financial-transactions".to_string(),
            alert_subject: "risk-alerts".to_string(),
            connect_timeout_ms: 2000,
        }
    }
}

/// Session monitoring configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Sessions monitored from startup
    pub sessions: Vec<String>,
    /// Recent alerts retained per session for the dashboard
    pub alert_history_limit: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            sessions: Vec::new(),
            alert_history_limit: 50,
        }
    }
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DetectionConfig {
    /// Per-detector rule thresholds
    pub detectors: DetectorThresholds,
    /// Risk level classification thresholds
    pub risk_levels: RiskLevelThresholds,
}

/// Explanation provider configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExplanationConfig {
    pub provider: ExplanationProviderKind,
    /// Text-generation endpoint (http provider)
    pub endpoint: String,
    /// Bearer token for the endpoint
    pub api_key: String,
    pub model_id: String,
    pub project_id: String,
    pub max_new_tokens: u32,
    pub temperature: f32,
    /// Fall back to the template after this long
    pub timeout_ms: u64,
    /// Detectors scoring above this are named in the templated explanation
    pub factor_threshold: f64,
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            provider: ExplanationProviderKind::Template,
            endpoint: String::new(),
            api_key: String::new(),
            model_id: "ibm/granite-3-8b-instruct".to_string(),
            project_id: String::new(),
            max_new_tokens: 512,
            temperature: 0.7,
            timeout_ms: 3000,
            factor_threshold: 0.6,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seconds between metrics summaries
    pub metrics_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            metrics_interval_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::build(File::with_name(DEFAULT_CONFIG_PATH).required(false))
    }

    /// Load configuration from a specific path, overlaid with the environment
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::build(File::from(path.as_ref()))
    }

    fn build(file: File<config::FileSourceFile, config::FileFormat>) -> Result<Self> {
        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("RISK_GUARD")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("monitoring.sessions"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
