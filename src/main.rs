//! Risk Guard - Main Entry Point
//!
//! Monitors the configured sessions' transaction streams, scores every
//! transaction and publishes risk alerts. Falls back to a simulated stream
//! when the broker cannot be reached.

use anyhow::Result;
use risk_guard::{
    config::{AppConfig, LogFormat, LoggingConfig},
    metrics::MetricsReporter,
    Alert, RiskGuard, StreamMode,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    // RUST_LOG wins over the configured level
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)?,
    };

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };

    init_logging(&config.logging)?;

    info!("Starting Risk Guard");
    info!(
        "Risk levels: critical>{:.2}, high>{:.2}, medium>{:.2}",
        config.detection.risk_levels.critical,
        config.detection.risk_levels.high,
        config.detection.risk_levels.medium
    );

    let guard = Arc::new(RiskGuard::connect(&config).await);
    if guard.mode() == StreamMode::Simulation {
        warn!("No broker available; transactions can only arrive through the simulated stream");
    }

    guard.register_alert_callback(|alert: Alert| async move {
        info!(
            alert_id = %alert.alert_id,
            transaction_id = %alert.transaction_id(),
            risk_level = %alert.risk_assessment.risk_level,
            recommendation = %alert.risk_assessment.recommendation,
            "{}",
            alert.risk_assessment.explanation
        );
        anyhow::Ok(())
    });

    if config.monitoring.sessions.is_empty() {
        warn!("No sessions configured under [monitoring].sessions; nothing to monitor");
    }

    let started = guard.start_sessions(&config.monitoring.sessions).await;
    if started.len() < config.monitoring.sessions.len() {
        warn!(
            started = started.len(),
            configured = config.monitoring.sessions.len(),
            "Some sessions could not be monitored"
        );
    }

    for (session_id, status) in &started {
        info!(
            session_id = %session_id,
            mode = ?status.mode,
            stream_source = %status.stream_source,
            risk_models = status.risk_models_active.len(),
            "Monitoring active"
        );
    }

    info!("Listening on subject: {}", config.nats.transaction_subject);
    info!("Publishing alerts to: {}", config.nats.alert_subject);

    // Periodic metrics summary
    let reporter = MetricsReporter::new(guard.metrics().clone(), config.pipeline.metrics_interval_secs);
    let reporter = tokio::spawn(reporter.start());

    tokio::signal::ctrl_c().await?;

    info!("Risk Guard shutting down...");
    reporter.abort();
    guard.shutdown().await;
    guard.metrics().print_summary();

    Ok(())
}
