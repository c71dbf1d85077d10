//! Alert dispatch to the outbound sink and in-process callbacks

use crate::producer::AlertSink;
use crate::types::alert::Alert;
use crate::types::assessment::{RiskAssessment, RiskLevel};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info};

/// Registered alert handler
pub type AlertCallback = Arc<dyn Fn(Alert) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Publishes alerts and fans them out to registered callbacks.
///
/// Callbacks are append-only and run in registration order. A callback that
/// errors or panics is logged and skipped; the rest still run.
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
    callbacks: RwLock<Vec<AlertCallback>>,
    history: RwLock<HashMap<String, VecDeque<Alert>>>,
    history_limit: usize,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>, history_limit: usize) -> Self {
        Self {
            sink,
            callbacks: RwLock::new(Vec::new()),
            history: RwLock::new(HashMap::new()),
            history_limit,
        }
    }

    /// Register a callback invoked for every dispatched alert
    pub fn register_callback<F, Fut>(&self, callback: F)
    where
        F: Fn(Alert) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback: AlertCallback = Arc::new(move |alert| callback(alert).boxed());
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Dispatch an alert for a non-LOW assessment.
    ///
    /// LOW assessments are ignored and yield `None`. Nothing here fails the caller.
    pub async fn dispatch(&self, session_id: &str, assessment: RiskAssessment) -> Option<Alert> {
        if assessment.risk_level == RiskLevel::Low {
            return None;
        }

        let alert = Alert::new(assessment);
        self.record(session_id, &alert);

        // the sink never holds up callbacks; both finish before the next alert
        tokio::join!(self.publish(&alert), self.notify(&alert));

        info!(
            session_id = %session_id,
            alert_id = %alert.alert_id,
            transaction_id = %alert.transaction_id(),
            risk_level = %alert.risk_assessment.risk_level,
            confidence = alert.risk_assessment.confidence,
            "Risk alert dispatched"
        );

        Some(alert)
    }

    async fn publish(&self, alert: &Alert) {
        if let Err(e) = self.sink.publish(alert).await {
            error!(
                alert_id = %alert.alert_id,
                transaction_id = %alert.transaction_id(),
                error = %e,
                "Failed to publish risk alert"
            );
        }
    }

    async fn notify(&self, alert: &Alert) {
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (index, callback) in callbacks.iter().enumerate() {
            let outcome = AssertUnwindSafe(async { callback(alert.clone()).await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(alert_id = %alert.alert_id, callback = index, error = %e, "Alert callback failed");
                }
                Err(_) => {
                    error!(alert_id = %alert.alert_id, callback = index, "Alert callback panicked");
                }
            }
        }
    }

    /// Most recent alerts for a session, newest first
    pub fn recent_alerts(&self, session_id: &str) -> Vec<Alert> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .map(|alerts| alerts.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, session_id: &str, alert: &Alert) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        let alerts = history.entry(session_id.to_string()).or_default();
        if alerts.len() >= self.history_limit {
            alerts.pop_front();
        }
        alerts.push_back(alert.clone());
    }
}
