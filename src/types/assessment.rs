//! Risk levels and per-transaction risk assessments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Detector name → score in [0, 1]
pub type RiskScores = HashMap<String, f64>;

/// Risk level classification, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Classify from the maximum and mean detector score.
    ///
    /// Rules are evaluated in order and all comparisons are strict, so a single
    /// extreme detector forces CRITICAL whatever the mean is.
    pub fn classify(max: f64, mean: f64, thresholds: &RiskLevelThresholds) -> Self {
        if max > thresholds.critical {
            RiskLevel::Critical
        } else if max > thresholds.high {
            RiskLevel::High
        } else if mean > thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Customer-facing recommendation for this level
    pub fn recommendation(self) -> &'static str {
        match self {
            RiskLevel::Critical => {
                "IMMEDIATE ACTION: Verify this transaction immediately. Consider blocking the card if not recognized."
            }
            RiskLevel::High => {
                "HIGH ALERT: Please confirm if you made this transaction. Enable additional security if needed."
            }
            RiskLevel::Medium => {
                "CAUTION: This transaction seems unusual. Review your recent activity for any concerns."
            }
            RiskLevel::Low => "Transaction appears normal. No action needed.",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configurable risk level thresholds.
///
/// `critical` and `high` apply to the maximum detector score, `medium` to the mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLevelThresholds {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for RiskLevelThresholds {
    fn default() -> Self {
        Self {
            critical: 0.8,
            high: 0.6,
            medium: 0.4,
        }
    }
}

/// Outcome of scoring one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    pub risk_level: RiskLevel,
    pub risk_scores: RiskScores,
    pub anomaly_detected: bool,
    pub explanation: String,
    pub recommendation: String,
    /// Highest detector score
    pub confidence: f64,
}

impl RiskAssessment {
    /// Build an assessment; the anomaly flag and recommendation follow from the level
    pub fn new(
        transaction_id: impl Into<String>,
        risk_level: RiskLevel,
        risk_scores: RiskScores,
        confidence: f64,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            timestamp: Utc::now(),
            risk_level,
            risk_scores,
            anomaly_detected: risk_level != RiskLevel::Low,
            explanation: explanation.into(),
            recommendation: risk_level.recommendation().to_string(),
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_order() {
        let t = RiskLevelThresholds::default();

        assert_eq!(RiskLevel::classify(0.9, 0.1, &t), RiskLevel::Critical);
        assert_eq!(RiskLevel::classify(0.7, 0.1, &t), RiskLevel::High);
        assert_eq!(RiskLevel::classify(0.5, 0.45, &t), RiskLevel::Medium);
        assert_eq!(RiskLevel::classify(0.5, 0.3, &t), RiskLevel::Low);
    }

    #[test]
    fn test_classify_boundaries_are_strict() {
        let t = RiskLevelThresholds::default();

        assert_eq!(RiskLevel::classify(0.8, 0.8, &t), RiskLevel::High);
        assert_eq!(RiskLevel::classify(0.6, 0.6, &t), RiskLevel::Medium);
        assert_eq!(RiskLevel::classify(0.4, 0.4, &t), RiskLevel::Low);
    }

    #[test]
    fn test_level_ordering() {
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Medium > RiskLevel::Low);
    }

    #[test]
    fn test_assessment_wire_shape() {
        let mut scores = RiskScores::new();
        scores.insert("velocity".to_string(), 0.9);

        let assessment = RiskAssessment::new("tx_1", RiskLevel::Critical, scores, 0.9, "why");
        let value = serde_json::to_value(&assessment).unwrap();

        assert_eq!(value["risk_level"], "critical");
        assert_eq!(value["anomaly_detected"], true);
        assert_eq!(value["risk_scores"]["velocity"], 0.9);
        assert!(value["recommendation"]
            .as_str()
            .unwrap()
            .starts_with("IMMEDIATE ACTION"));
    }

    #[test]
    fn test_low_assessment_is_not_anomalous() {
        let assessment =
            RiskAssessment::new("tx_2", RiskLevel::Low, RiskScores::new(), 0.1, "fine");
        assert!(!assessment.anomaly_detected);
    }
}
