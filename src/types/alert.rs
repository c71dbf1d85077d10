//! Outbound alert records

use crate::types::assessment::RiskAssessment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert published when an assessment is above LOW
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert generation timestamp
    pub timestamp: DateTime<Utc>,

    /// Unique alert identifier
    pub alert_id: String,

    /// The assessment that raised the alert
    pub risk_assessment: RiskAssessment,
}

impl Alert {
    /// Wrap an assessment in a new alert
    pub fn new(risk_assessment: RiskAssessment) -> Self {
        Self {
            timestamp: Utc::now(),
            alert_id: format!("alert_{}", uuid::Uuid::new_v4().simple()),
            risk_assessment,
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.risk_assessment.transaction_id
    }
}
