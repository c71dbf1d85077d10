//! Monitoring supervisor
//!
//! [`RiskGuard`] owns everything the consumer loops share: the baseline store,
//! the scoring pipeline, the alert dispatcher and the event source. One
//! instance serves every monitored session.

use crate::baseline::Baseline;
use crate::config::AppConfig;
use crate::consumer::{ConsumerSummary, TransactionConsumer};
use crate::dispatcher::AlertDispatcher;
use crate::error::{Result, RiskGuardError};
use crate::metrics::PipelineMetrics;
use crate::pipeline::RiskPipeline;
use crate::producer::{AlertSink, MemoryAlertSink, NatsAlertProducer};
use crate::source::{EventSource, NatsSource, SimulatedSource, StreamMode};
use crate::types::alert::Alert;
use crate::types::assessment::{RiskAssessment, RiskLevel};
use crate::types::transaction::Transaction;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Response to `start_monitoring`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringStatus {
    pub status: String,
    pub mode: StreamMode,
    pub monitoring_started: DateTime<Utc>,
    pub risk_models_active: Vec<String>,
    pub stream_source: String,
    /// Representative alerts, simulation mode only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_time_alerts: Option<Vec<SimulatedAlert>>,
    /// Representative statistics, simulation mode only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<MonitoringStatistics>,
}

/// Canned alert shown while running without a broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedAlert {
    pub timestamp: DateTime<Utc>,
    pub risk_level: RiskLevel,
    pub transaction: String,
    pub anomaly: String,
    pub action_taken: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStatistics {
    pub transactions_analyzed: u64,
    pub alerts_generated: u64,
    pub critical_alerts: u64,
    /// Percent; only known for the canned payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_positive_rate: Option<f64>,
    pub avg_detection_time_ms: f64,
}

/// Read-only risk summary for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDashboard {
    pub session_id: String,
    pub user_risk_profile: RiskProfile,
    pub baseline: Baseline,
    /// Newest first
    pub recent_alerts: Vec<Alert>,
    pub recommendations: Vec<String>,
    pub protection_status: ProtectionStatus,
    pub statistics: MonitoringStatistics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProfile {
    /// Highest level among recent alerts
    pub overall_risk: RiskLevel,
    /// Mean confidence of recent alerts
    pub risk_score: f64,
    pub recent_alert_count: usize,
    pub factors: RiskFactors,
}

/// Per-dimension reading of the recent alert scores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactors {
    /// `stable` or `volatile`
    pub spending_pattern: String,
    /// `normal`, `expanding` or `unusual`
    pub merchant_diversity: String,
    /// `within_limits` or `elevated`
    pub transaction_velocity: String,
    /// `high`, `moderate` or `low`
    pub location_consistency: String,
}

/// Mean detector score above which a factor reads as risky
const FACTOR_RISKY: f64 = 0.6;
/// Mean detector score above which a factor reads as drifting
const FACTOR_DRIFTING: f64 = 0.3;

const STANDING_RECOMMENDATIONS: [&str; 3] = [
    "Enable two-factor authentication for transactions above ₹10,000",
    "Set up instant alerts for international transactions",
    "Review and update your typical merchant list monthly",
];

impl RiskFactors {
    fn from_alerts(alerts: &[Alert]) -> Self {
        let mean = |detector: &str| {
            if alerts.is_empty() {
                return 0.0;
            }
            alerts
                .iter()
                .map(|a| a.risk_assessment.risk_scores.get(detector).copied().unwrap_or(0.0))
                .sum::<f64>()
                / alerts.len() as f64
        };

        let spending = mean("amount_anomaly");
        let merchants = mean("merchant_risk").max(mean("category_anomaly"));
        let velocity = mean("velocity");
        let location = mean("location_anomaly");

        Self {
            spending_pattern: if spending > FACTOR_RISKY { "volatile" } else { "stable" }.to_string(),
            merchant_diversity: if merchants > FACTOR_RISKY {
                "unusual"
            } else if merchants > FACTOR_DRIFTING {
                "expanding"
            } else {
                "normal"
            }
            .to_string(),
            transaction_velocity: if velocity > FACTOR_RISKY { "elevated" } else { "within_limits" }
                .to_string(),
            location_consistency: if location > FACTOR_RISKY {
                "low"
            } else if location > FACTOR_DRIFTING {
                "moderate"
            } else {
                "high"
            }
            .to_string(),
        }
    }
}

/// Latest alert's advice first, then the standing advice
fn recommendations(recent_alerts: &[Alert]) -> Vec<String> {
    recent_alerts
        .first()
        .map(|a| a.risk_assessment.recommendation.clone())
        .into_iter()
        .chain(STANDING_RECOMMENDATIONS.iter().map(|r| r.to_string()))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionStatus {
    pub real_time_monitoring: bool,
    pub risk_models: usize,
    pub stream_mode: StreamMode,
    pub stream_source: String,
    pub last_scan: DateTime<Utc>,
}

struct MonitorHandle {
    started: DateTime<Utc>,
    consumer: JoinHandle<ConsumerSummary>,
    dispatcher: JoinHandle<()>,
}

/// Supervisor for all monitored sessions
pub struct RiskGuard {
    pipeline: Arc<RiskPipeline>,
    dispatcher: Arc<AlertDispatcher>,
    source: Arc<dyn EventSource>,
    simulated: Option<Arc<SimulatedSource>>,
    metrics: Arc<PipelineMetrics>,
    monitors: Mutex<HashMap<String, MonitorHandle>>,
}

impl RiskGuard {
    /// Build a guard over explicit source and sink implementations
    pub fn new(config: &AppConfig, source: Arc<dyn EventSource>, sink: Arc<dyn AlertSink>) -> Self {
        let metrics = Arc::new(PipelineMetrics::new());
        let pipeline = Arc::new(RiskPipeline::from_config(config, metrics.clone()));
        let dispatcher = Arc::new(AlertDispatcher::new(
            sink,
            config.monitoring.alert_history_limit,
        ));

        Self {
            pipeline,
            dispatcher,
            source,
            simulated: None,
            metrics,
            monitors: Mutex::new(HashMap::new()),
        }
    }

    /// Guard fed by an in-process simulated stream
    pub fn simulated(config: &AppConfig) -> Self {
        let source = Arc::new(SimulatedSource::default());
        let mut guard = Self::new(config, source.clone(), Arc::new(MemoryAlertSink::default()));
        guard.simulated = Some(source);
        guard
    }

    /// Connect to the configured broker, falling back to simulation if it is unreachable
    pub async fn connect(config: &AppConfig) -> Self {
        let timeout = Duration::from_millis(config.nats.connect_timeout_ms);

        match tokio::time::timeout(timeout, async_nats::connect(config.nats.url.as_str())).await {
            Ok(Ok(client)) => {
                info!(url = %config.nats.url, "Connected to NATS");
                let source = Arc::new(NatsSource::new(
                    client.clone(),
                    &config.nats.transaction_subject,
                ));
                let sink = Arc::new(NatsAlertProducer::new(client, &config.nats.alert_subject));
                Self::new(config, source, sink)
            }
            Ok(Err(e)) => {
                let error = RiskGuardError::Connect {
                    url: config.nats.url.clone(),
                    message: e.to_string(),
                };
                warn!(error = %error, "NATS unavailable, running in simulation mode");
                Self::simulated(config)
            }
            Err(_) => {
                warn!(
                    url = %config.nats.url,
                    timeout_ms = config.nats.connect_timeout_ms,
                    "NATS connection timed out, running in simulation mode"
                );
                Self::simulated(config)
            }
        }
    }

    pub fn mode(&self) -> StreamMode {
        self.source.mode()
    }

    /// The simulated stream, when not connected to a broker
    pub fn simulated_source(&self) -> Option<&Arc<SimulatedSource>> {
        self.simulated.as_ref()
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Start the consumer loop for a session.
    ///
    /// At most one loop runs per session; calling again while it is running
    /// returns the current status.
    pub async fn start_monitoring(&self, session_id: &str) -> Result<MonitoringStatus> {
        let mut monitors = self.monitors.lock().await;

        if let Some(existing) = monitors.get(session_id) {
            if !existing.consumer.is_finished() {
                return Ok(self.status(existing.started));
            }
        }

        self.pipeline.baselines().get_or_create(session_id);
        let transactions = self.source.subscribe().await?;

        let (sender, mut receiver) = mpsc::unbounded_channel::<RiskAssessment>();
        let consumer = TransactionConsumer::new(session_id, self.pipeline.clone(), sender);
        let consumer = tokio::spawn(consumer.run(transactions));

        let dispatcher = self.dispatcher.clone();
        let session = session_id.to_string();
        let dispatch = tokio::spawn(async move {
            while let Some(assessment) = receiver.recv().await {
                dispatcher.dispatch(&session, assessment).await;
            }
        });

        let started = Utc::now();
        monitors.insert(
            session_id.to_string(),
            MonitorHandle {
                started,
                consumer,
                dispatcher: dispatch,
            },
        );

        info!(
            session_id = %session_id,
            mode = ?self.mode(),
            source = %self.source.describe(),
            "Started real-time risk monitoring"
        );

        Ok(self.status(started))
    }

    /// Start every listed session.
    ///
    /// A session that fails to start is logged and skipped; the rest still start.
    /// Returns the sessions that are now monitored.
    pub async fn start_sessions<S: AsRef<str>>(&self, session_ids: &[S]) -> Vec<(String, MonitoringStatus)> {
        let mut started = Vec::with_capacity(session_ids.len());

        for session_id in session_ids.iter().map(AsRef::as_ref) {
            match self.start_monitoring(session_id).await {
                Ok(status) => started.push((session_id.to_string(), status)),
                Err(e) => {
                    error!(session_id = %session_id, error = %e, "Failed to start monitoring, skipping session");
                }
            }
        }

        started
    }

    /// Register a callback invoked for every alert, in registration order
    pub fn register_alert_callback<F, Fut>(&self, callback: F)
    where
        F: Fn(Alert) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.dispatcher.register_callback(callback);
    }

    /// Assess a single transaction for a session without dispatching
    pub async fn analyze_transaction(&self, session_id: &str, tx: Transaction) -> RiskAssessment {
        self.pipeline.assess(session_id, tx).await
    }

    /// Whether a consumer loop is running for the session
    pub async fn is_monitoring(&self, session_id: &str) -> bool {
        self.monitors
            .lock()
            .await
            .get(session_id)
            .is_some_and(|m| !m.consumer.is_finished())
    }

    /// Risk summary composed from the session baseline and its recent alerts
    pub async fn get_risk_dashboard(&self, session_id: &str) -> RiskDashboard {
        let baselines = self.pipeline.baselines();
        let baseline = baselines
            .get(session_id)
            .map(|b| (*b).clone())
            .unwrap_or_else(|| baselines.template().clone());

        let recent_alerts = self.dispatcher.recent_alerts(session_id);
        let overall_risk = recent_alerts
            .iter()
            .map(|a| a.risk_assessment.risk_level)
            .max()
            .unwrap_or(RiskLevel::Low);
        let risk_score = if recent_alerts.is_empty() {
            0.0
        } else {
            recent_alerts
                .iter()
                .map(|a| a.risk_assessment.confidence)
                .sum::<f64>()
                / recent_alerts.len() as f64
        };

        RiskDashboard {
            session_id: session_id.to_string(),
            user_risk_profile: RiskProfile {
                overall_risk,
                risk_score,
                recent_alert_count: recent_alerts.len(),
                factors: RiskFactors::from_alerts(&recent_alerts),
            },
            baseline,
            recommendations: recommendations(&recent_alerts),
            recent_alerts,
            protection_status: ProtectionStatus {
                real_time_monitoring: self.is_monitoring(session_id).await,
                risk_models: self.pipeline.registry().detector_count(),
                stream_mode: self.mode(),
                stream_source: self.source.describe(),
                last_scan: Utc::now(),
            },
            statistics: self.live_statistics(),
        }
    }

    /// Wait for every consumer loop to finish (after the stream closes) and
    /// for its pending alerts to be dispatched
    pub async fn drain(&self) -> HashMap<String, ConsumerSummary> {
        let monitors: Vec<(String, MonitorHandle)> =
            self.monitors.lock().await.drain().collect();
        let mut summaries = HashMap::with_capacity(monitors.len());

        for (session_id, monitor) in monitors {
            match monitor.consumer.await {
                Ok(summary) => {
                    summaries.insert(session_id.clone(), summary);
                }
                Err(e) => error!(session_id = %session_id, error = %e, "Consumer loop aborted"),
            }
            if let Err(e) = monitor.dispatcher.await {
                error!(session_id = %session_id, error = %e, "Alert dispatch loop aborted");
            }
        }

        summaries
    }

    /// Stop every loop immediately
    pub async fn shutdown(&self) {
        let mut monitors = self.monitors.lock().await;
        for (session_id, monitor) in monitors.drain() {
            monitor.consumer.abort();
            monitor.dispatcher.abort();
            info!(session_id = %session_id, "Stopped risk monitoring");
        }
    }

    fn status(&self, started: DateTime<Utc>) -> MonitoringStatus {
        let simulation = self.mode() == StreamMode::Simulation;

        MonitoringStatus {
            status: "active".to_string(),
            mode: self.mode(),
            monitoring_started: started,
            risk_models_active: self
                .pipeline
                .registry()
                .detector_names()
                .into_iter()
                .map(String::from)
                .collect(),
            stream_source: self.source.describe(),
            real_time_alerts: simulation.then(simulated_alerts),
            statistics: simulation.then(simulated_statistics),
        }
    }

    fn live_statistics(&self) -> MonitoringStatistics {
        MonitoringStatistics {
            transactions_analyzed: self.metrics.transactions_processed.load(Ordering::Relaxed),
            alerts_generated: self.metrics.alerts_generated.load(Ordering::Relaxed),
            critical_alerts: self.metrics.alerts_at(RiskLevel::Critical),
            false_positive_rate: None,
            avg_detection_time_ms: self.metrics.latency().mean_us as f64 / 1000.0,
        }
    }
}

fn simulated_alerts() -> Vec<SimulatedAlert> {
    let now = Utc::now();
    vec![
        SimulatedAlert {
            timestamp: now - ChronoDuration::minutes(5),
            risk_level: RiskLevel::Medium,
            transaction: "₹15,000 at Unknown Merchant".to_string(),
            anomaly: "Unusual merchant and high amount".to_string(),
            action_taken: "SMS alert sent".to_string(),
        },
        SimulatedAlert {
            timestamp: now - ChronoDuration::hours(2),
            risk_level: RiskLevel::Low,
            transaction: "₹500 at Swiggy".to_string(),
            anomaly: "Late night order".to_string(),
            action_taken: "Logged for pattern analysis".to_string(),
        },
    ]
}

fn simulated_statistics() -> MonitoringStatistics {
    MonitoringStatistics {
        transactions_analyzed: 1247,
        alerts_generated: 23,
        critical_alerts: 2,
        false_positive_rate: Some(3.2),
        avg_detection_time_ms: 47.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NatsConfig;

    #[tokio::test]
    async fn test_unreachable_broker_degrades_to_simulation() {
        let config = AppConfig {
            nats: NatsConfig {
                url: "nats://127.0.0.1:1".to_string(),
                connect_timeout_ms: 500,
                ..NatsConfig::default()
            },
            ..AppConfig::default()
        };

        let guard = RiskGuard::connect(&config).await;
        assert_eq!(guard.mode(), StreamMode::Simulation);
        assert!(guard.simulated_source().is_some());

        let status = guard.start_monitoring("s1").await.unwrap();

        assert_eq!(status.status, "active");
        assert_eq!(status.mode, StreamMode::Simulation);
        assert_eq!(status.stream_source, "NATS (Simulated)");
        assert_eq!(status.risk_models_active.len(), 7);
        assert!(!status.real_time_alerts.as_ref().unwrap().is_empty());
        assert_eq!(status.statistics.as_ref().unwrap().transactions_analyzed, 1247);

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["mode"], "simulation");

        guard.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_monitoring_twice_keeps_one_loop() {
        let guard = RiskGuard::simulated(&AppConfig::default());

        let first = guard.start_monitoring("s1").await.unwrap();
        let second = guard.start_monitoring("s1").await.unwrap();

        assert_eq!(first.monitoring_started, second.monitoring_started);
        assert!(guard.is_monitoring("s1").await);
        assert!(!guard.is_monitoring("s2").await);
        assert!(guard.pipeline.baselines().get("s1").is_some());

        guard.shutdown().await;
        assert!(!guard.is_monitoring("s1").await);
    }

    struct BrokenSource;

    #[async_trait::async_trait]
    impl EventSource for BrokenSource {
        async fn subscribe(&self) -> Result<crate::source::TransactionStream> {
            Err(RiskGuardError::Subscribe {
                subject: "financial-transactions".to_string(),
                message: "permissions violation".to_string(),
            })
        }

        fn mode(&self) -> StreamMode {
            StreamMode::Live
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_reported() {
        let guard = RiskGuard::new(
            &AppConfig::default(),
            Arc::new(BrokenSource),
            Arc::new(MemoryAlertSink::default()),
        );

        let result = guard.start_monitoring("s1").await;

        assert!(matches!(result, Err(RiskGuardError::Subscribe { .. })));
        assert!(!guard.is_monitoring("s1").await);
    }

    #[tokio::test]
    async fn test_start_sessions_skips_failures() {
        let broken = RiskGuard::new(
            &AppConfig::default(),
            Arc::new(BrokenSource),
            Arc::new(MemoryAlertSink::default()),
        );
        assert!(broken.start_sessions(&["a", "b"]).await.is_empty());

        let guard = RiskGuard::simulated(&AppConfig::default());
        let started = guard.start_sessions(&["a".to_string(), "b".to_string()]).await;

        let ids: Vec<&str> = started.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(guard.is_monitoring("a").await);
        assert!(guard.is_monitoring("b").await);
        guard.shutdown().await;
    }

    #[test]
    fn test_factors_follow_recent_scores() {
        use crate::types::assessment::RiskScores;

        let scores: RiskScores = [
            ("amount_anomaly", 0.95),
            ("merchant_risk", 0.4),
            ("category_anomaly", 0.1),
            ("velocity", 0.9),
            ("location_anomaly", 0.8),
        ]
        .into_iter()
        .map(|(name, score)| (name.to_string(), score))
        .collect();
        let alert = Alert::new(RiskAssessment::new("t1", RiskLevel::Critical, scores, 0.95, ""));

        let factors = RiskFactors::from_alerts(std::slice::from_ref(&alert));

        assert_eq!(factors.spending_pattern, "volatile");
        assert_eq!(factors.merchant_diversity, "expanding");
        assert_eq!(factors.transaction_velocity, "elevated");
        assert_eq!(factors.location_consistency, "low");

        let advice = recommendations(&[alert]);
        assert_eq!(advice.len(), 4);
        assert_eq!(advice[0], RiskLevel::Critical.recommendation());
    }

    #[tokio::test]
    async fn test_dashboard_without_history() {
        let guard = RiskGuard::simulated(&AppConfig::default());

        let dashboard = guard.get_risk_dashboard("nobody").await;

        assert_eq!(dashboard.user_risk_profile.overall_risk, RiskLevel::Low);
        assert_eq!(dashboard.user_risk_profile.risk_score, 0.0);
        assert!(dashboard.recent_alerts.is_empty());
        assert_eq!(dashboard.baseline, Baseline::default());
        assert!(!dashboard.protection_status.real_time_monitoring);
        assert_eq!(dashboard.protection_status.risk_models, 7);
        assert_eq!(
            dashboard.user_risk_profile.factors,
            RiskFactors {
                spending_pattern: "stable".to_string(),
                merchant_diversity: "normal".to_string(),
                transaction_velocity: "within_limits".to_string(),
                location_consistency: "high".to_string(),
            }
        );
        assert_eq!(dashboard.recommendations, STANDING_RECOMMENDATIONS.map(String::from).to_vec());
        // read-only: no baseline is stored for the session
        assert!(guard.pipeline.baselines().get("nobody").is_none());
    }
}
