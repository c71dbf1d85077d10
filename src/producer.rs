//! Outbound alert publishing

use crate::error::{Result, RiskGuardError};
use crate::types::alert::Alert;
use async_nats::Client;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Destination for published alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn publish(&self, alert: &Alert) -> Result<()>;
}

/// Producer for publishing risk alerts to NATS
#[derive(Clone)]
pub struct NatsAlertProducer {
    client: Client,
    subject: String,
}

impl NatsAlertProducer {
    /// Create a new alert producer
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[async_trait]
impl AlertSink for NatsAlertProducer {
    async fn publish(&self, alert: &Alert) -> Result<()> {
        let payload = serde_json::to_vec(alert)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| RiskGuardError::Publish {
                subject: self.subject.clone(),
                message: e.to_string(),
            })?;

        debug!(
            alert_id = %alert.alert_id,
            transaction_id = %alert.transaction_id(),
            risk_level = %alert.risk_assessment.risk_level,
            "Published risk alert"
        );

        Ok(())
    }
}

/// Keeps the most recent published alerts in memory
pub struct MemoryAlertSink {
    alerts: Mutex<VecDeque<Alert>>,
    capacity: usize,
}

impl MemoryAlertSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Published alerts, oldest first
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryAlertSink {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl AlertSink for MemoryAlertSink {
    async fn publish(&self, alert: &Alert) -> Result<()> {
        let mut alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
        if alerts.len() == self.capacity {
            alerts.pop_front();
        }
        alerts.push_back(alert.clone());
        Ok(())
    }
}
