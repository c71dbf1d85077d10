//! Heuristic anomaly detectors
//!
//! Each detector maps a (transaction, baseline) pair to a risk contribution in
//! [0, 1]. The set is closed: adding a detector means adding a variant here.

use crate::baseline::Baseline;
use crate::error::DetectorError;
use crate::types::transaction::Transaction;
use serde::{Deserialize, Serialize};

const VELOCITY_CRITICAL: f64 = 0.9;
const VELOCITY_ELEVATED: f64 = 0.6;
const VELOCITY_NORMAL: f64 = 0.2;

const AMOUNT_FAR_ABOVE_MAX: f64 = 0.95;
const AMOUNT_ABOVE_MAX: f64 = 0.7;
const AMOUNT_ABOVE_AVERAGE: f64 = 0.5;
const AMOUNT_NORMAL: f64 = 0.1;

const CATEGORY_HIGH_RISK: f64 = 0.9;
const CATEGORY_UNSEEN: f64 = 0.4;
const CATEGORY_KNOWN: f64 = 0.1;

const MERCHANT_RISKY: f64 = 0.8;
const MERCHANT_UNSEEN: f64 = 0.4;
const MERCHANT_KNOWN: f64 = 0.1;

const TIME_NIGHT: f64 = 0.7;
const TIME_OFF_HOURS: f64 = 0.4;
const TIME_TYPICAL: f64 = 0.1;

const LOCATION_UNKNOWN: f64 = 0.5;
const LOCATION_NEW_INTERNATIONAL: f64 = 0.8;
const LOCATION_NEW_DOMESTIC: f64 = 0.3;
const LOCATION_KNOWN: f64 = 0.1;

const SEQUENCE_DUPLICATE: f64 = 0.9;
const SEQUENCE_RAPID: f64 = 0.6;
const SEQUENCE_NORMAL: f64 = 0.1;

/// Rule thresholds for the detectors.
///
/// These are documented heuristics, not calibrated values; they are exposed so
/// deployments can tune them without a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorThresholds {
    /// Daily count above `velocity × this` is critical
    pub velocity_critical_multiplier: f64,
    /// Daily count above `velocity × this` is elevated
    pub velocity_elevated_multiplier: f64,
    /// Amount above `max × this` is far beyond history
    pub amount_critical_multiplier: f64,
    /// Amount above `max × this` exceeds history
    pub amount_high_multiplier: f64,
    /// Amount above `avg × this` is unusually large
    pub amount_average_multiplier: f64,
    pub high_risk_categories: Vec<String>,
    pub risky_merchants: Vec<String>,
    /// Hours strictly before this are night-time
    pub night_start_hour: u32,
    /// Hours strictly after this are night-time
    pub night_end_hour: u32,
    /// Location label meaning "not known"
    pub unknown_location: String,
    /// Substring marking a location as international
    pub international_marker: String,
}

impl Default for DetectorThresholds {
    fn default() -> Self {
        Self {
            velocity_critical_multiplier: 3.0,
            velocity_elevated_multiplier: 2.0,
            amount_critical_multiplier: 1.5,
            amount_high_multiplier: 1.0,
            amount_average_multiplier: 5.0,
            high_risk_categories: vec![
                "Gambling".to_string(),
                "Crypto".to_string(),
                "High-Risk".to_string(),
            ],
            risky_merchants: vec![
                "Unknown".to_string(),
                "International Transfer".to_string(),
                "Crypto Exchange".to_string(),
            ],
            night_start_hour: 6,
            night_end_hour: 23,
            unknown_location: "Unknown".to_string(),
            international_marker: "International".to_string(),
        }
    }
}

/// The closed set of anomaly detectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Detector {
    Velocity,
    AmountAnomaly,
    CategoryAnomaly,
    MerchantRisk,
    TimeAnomaly,
    LocationAnomaly,
    SequenceAnomaly,
}

impl Detector {
    /// Every detector, in registry order
    pub const ALL: [Detector; 7] = [
        Detector::Velocity,
        Detector::AmountAnomaly,
        Detector::CategoryAnomaly,
        Detector::MerchantRisk,
        Detector::TimeAnomaly,
        Detector::LocationAnomaly,
        Detector::SequenceAnomaly,
    ];

    /// Name used as the key in score vectors
    pub fn name(self) -> &'static str {
        match self {
            Detector::Velocity => "velocity",
            Detector::AmountAnomaly => "amount_anomaly",
            Detector::CategoryAnomaly => "category_anomaly",
            Detector::MerchantRisk => "merchant_risk",
            Detector::TimeAnomaly => "time_anomaly",
            Detector::LocationAnomaly => "location_anomaly",
            Detector::SequenceAnomaly => "sequence_anomaly",
        }
    }

    /// Evaluate this detector's rule.
    ///
    /// Pure: reads the transaction and baseline, never mutates either.
    pub fn score(
        self,
        tx: &Transaction,
        baseline: &Baseline,
        thresholds: &DetectorThresholds,
    ) -> Result<f64, DetectorError> {
        let score = match self {
            Detector::Velocity => velocity(tx, baseline, thresholds),
            Detector::AmountAnomaly => amount_anomaly(tx, baseline, thresholds),
            Detector::CategoryAnomaly => category_anomaly(tx, baseline, thresholds),
            Detector::MerchantRisk => merchant_risk(tx, baseline, thresholds),
            Detector::TimeAnomaly => time_anomaly(tx, baseline, thresholds)?,
            Detector::LocationAnomaly => location_anomaly(tx, baseline, thresholds),
            Detector::SequenceAnomaly => sequence_anomaly(tx),
        };
        Ok(score)
    }
}

fn velocity(tx: &Transaction, baseline: &Baseline, t: &DetectorThresholds) -> f64 {
    let current = tx.daily_count.unwrap_or(1.0);
    let typical = baseline.transaction_velocity;

    if !current.is_finite() {
        VELOCITY_NORMAL
    } else if current > typical * t.velocity_critical_multiplier {
        VELOCITY_CRITICAL
    } else if current > typical * t.velocity_elevated_multiplier {
        VELOCITY_ELEVATED
    } else {
        VELOCITY_NORMAL
    }
}

fn amount_anomaly(tx: &Transaction, baseline: &Baseline, t: &DetectorThresholds) -> f64 {
    let max = baseline.max_transaction_amount;
    let avg = baseline.avg_transaction_amount;

    if tx.amount > max * t.amount_critical_multiplier {
        AMOUNT_FAR_ABOVE_MAX
    } else if tx.amount > max * t.amount_high_multiplier {
        AMOUNT_ABOVE_MAX
    } else if tx.amount > avg * t.amount_average_multiplier {
        AMOUNT_ABOVE_AVERAGE
    } else {
        AMOUNT_NORMAL
    }
}

fn category_anomaly(tx: &Transaction, baseline: &Baseline, t: &DetectorThresholds) -> f64 {
    if baseline.typical_categories.contains(&tx.category) {
        CATEGORY_KNOWN
    } else if t.high_risk_categories.iter().any(|c| *c == tx.category) {
        CATEGORY_HIGH_RISK
    } else {
        CATEGORY_UNSEEN
    }
}

fn merchant_risk(tx: &Transaction, baseline: &Baseline, t: &DetectorThresholds) -> f64 {
    if t.risky_merchants.iter().any(|m| *m == tx.merchant) {
        MERCHANT_RISKY
    } else if baseline.typical_merchants.contains(&tx.merchant) {
        MERCHANT_KNOWN
    } else {
        MERCHANT_UNSEEN
    }
}

fn time_anomaly(
    tx: &Transaction,
    baseline: &Baseline,
    t: &DetectorThresholds,
) -> Result<f64, DetectorError> {
    let hour = tx
        .hour()
        .map_err(|_| DetectorError::InvalidTimestamp(tx.timestamp.clone()))?;

    let score = if baseline.typical_hours.contains(&hour) {
        TIME_TYPICAL
    } else if hour < t.night_start_hour || hour > t.night_end_hour {
        TIME_NIGHT
    } else {
        TIME_OFF_HOURS
    };
    Ok(score)
}

fn location_anomaly(tx: &Transaction, baseline: &Baseline, t: &DetectorThresholds) -> f64 {
    let location = match tx.location.as_deref() {
        None => return LOCATION_UNKNOWN,
        Some(loc) if loc == t.unknown_location => return LOCATION_UNKNOWN,
        Some(loc) => loc,
    };

    if baseline.location_history.contains(location) {
        LOCATION_KNOWN
    } else if location.contains(t.international_marker.as_str()) {
        LOCATION_NEW_INTERNATIONAL
    } else {
        LOCATION_NEW_DOMESTIC
    }
}

fn sequence_anomaly(tx: &Transaction) -> f64 {
    if tx.is_duplicate {
        SEQUENCE_DUPLICATE
    } else if tx.rapid_sequence {
        SEQUENCE_RAPID
    } else {
        SEQUENCE_NORMAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx() -> Transaction {
        Transaction::new("tx_1", "s1", 100.0, "Food", "Swiggy")
            .with_timestamp("2024-05-01T12:00:00")
            .with_location("Mumbai")
    }

    fn score(detector: Detector, tx: &Transaction) -> f64 {
        detector
            .score(tx, &Baseline::default(), &DetectorThresholds::default())
            .unwrap()
    }

    #[test]
    fn test_names_are_unique() {
        let names: std::collections::HashSet<_> = Detector::ALL.iter().map(|d| d.name()).collect();
        assert_eq!(names.len(), Detector::ALL.len());
    }

    #[test]
    fn test_typical_transaction_scores_low() {
        let tx = tx();
        assert_eq!(score(Detector::Velocity, &tx), 0.2);
        assert_eq!(score(Detector::AmountAnomaly, &tx), 0.1);
        assert_eq!(score(Detector::CategoryAnomaly, &tx), 0.1);
        assert_eq!(score(Detector::MerchantRisk, &tx), 0.1);
        assert_eq!(score(Detector::TimeAnomaly, &tx), 0.1);
        assert_eq!(score(Detector::LocationAnomaly, &tx), 0.1);
        assert_eq!(score(Detector::SequenceAnomaly, &tx), 0.1);
    }

    #[test]
    fn test_velocity() {
        // baseline velocity is 3/day
        assert_eq!(score(Detector::Velocity, &tx().with_daily_count(10)), 0.9);
        assert_eq!(score(Detector::Velocity, &tx().with_daily_count(9)), 0.6);
        assert_eq!(score(Detector::Velocity, &tx().with_daily_count(7)), 0.6);
        assert_eq!(score(Detector::Velocity, &tx().with_daily_count(6)), 0.2);
    }

    #[test]
    fn test_velocity_odd_counts_score_normal() {
        assert_eq!(score(Detector::Velocity, &tx().with_daily_count(-1)), 0.2);
        assert_eq!(score(Detector::Velocity, &tx().with_daily_count(2.5)), 0.2);
        assert_eq!(score(Detector::Velocity, &tx().with_daily_count(f64::NAN)), 0.2);
        assert_eq!(score(Detector::Velocity, &tx().with_daily_count(f64::INFINITY)), 0.2);
    }

    #[test]
    fn test_amount_anomaly() {
        let max = Baseline::default().max_transaction_amount;
        let mut t = tx();

        t.amount = 1.6 * max;
        assert_eq!(score(Detector::AmountAnomaly, &t), 0.95);
        t.amount = 1.2 * max;
        assert_eq!(score(Detector::AmountAnomaly, &t), 0.7);
        t.amount = 20000.0; // > 5 × 2500
        assert_eq!(score(Detector::AmountAnomaly, &t), 0.5);
        t.amount = 12500.0;
        assert_eq!(score(Detector::AmountAnomaly, &t), 0.1);
    }

    #[test]
    fn test_amount_out_of_range_inputs() {
        let mut t = tx();

        t.amount = -500.0;
        assert_eq!(score(Detector::AmountAnomaly, &t), 0.1);
        t.amount = f64::NAN;
        assert_eq!(score(Detector::AmountAnomaly, &t), 0.1);
        t.amount = f64::INFINITY;
        assert_eq!(score(Detector::AmountAnomaly, &t), 0.95);
    }

    #[test]
    fn test_category_anomaly() {
        let mut t = tx();

        t.category = "Gambling".to_string();
        assert_eq!(score(Detector::CategoryAnomaly, &t), 0.9);
        t.category = "High-Risk".to_string();
        assert_eq!(score(Detector::CategoryAnomaly, &t), 0.9);
        t.category = "Travel".to_string();
        assert_eq!(score(Detector::CategoryAnomaly, &t), 0.4);
    }

    #[test]
    fn test_high_risk_category_already_typical() {
        let mut baseline = Baseline::default();
        baseline.typical_categories.insert("Crypto".to_string());
        let mut t = tx();
        t.category = "Crypto".to_string();

        let s = Detector::CategoryAnomaly
            .score(&t, &baseline, &DetectorThresholds::default())
            .unwrap();
        assert_eq!(s, 0.1);
    }

    #[test]
    fn test_merchant_risk() {
        let mut t = tx();

        t.merchant = "Crypto Exchange".to_string();
        assert_eq!(score(Detector::MerchantRisk, &t), 0.8);
        t.merchant = "Unknown".to_string();
        assert_eq!(score(Detector::MerchantRisk, &t), 0.8);
        t.merchant = "Zomato".to_string();
        assert_eq!(score(Detector::MerchantRisk, &t), 0.4);
    }

    #[test]
    fn test_time_anomaly() {
        let at = |ts: &str| score(Detector::TimeAnomaly, &tx().with_timestamp(ts));

        assert_eq!(at("2024-05-01T03:00:00"), 0.7);
        assert_eq!(at("2024-05-01T07:30:00"), 0.4);
        assert_eq!(at("2024-05-01T22:10:00"), 0.4);
        assert_eq!(at("2024-05-01T23:59:00"), 0.4);
        assert_eq!(at("2024-05-01T09:00:00Z"), 0.1);
    }

    #[test]
    fn test_time_anomaly_rejects_bad_timestamp() {
        let t = tx().with_timestamp("not-a-time");
        let result =
            Detector::TimeAnomaly.score(&t, &Baseline::default(), &DetectorThresholds::default());

        assert_eq!(
            result,
            Err(DetectorError::InvalidTimestamp("not-a-time".to_string()))
        );
    }

    #[test]
    fn test_location_anomaly() {
        let mut t = tx();

        t.location = None;
        assert_eq!(score(Detector::LocationAnomaly, &t), 0.5);
        t.location = Some("Unknown".to_string());
        assert_eq!(score(Detector::LocationAnomaly, &t), 0.5);
        t.location = Some("International - London".to_string());
        assert_eq!(score(Detector::LocationAnomaly, &t), 0.8);
        t.location = Some("Chennai".to_string());
        assert_eq!(score(Detector::LocationAnomaly, &t), 0.3);
    }

    #[test]
    fn test_sequence_anomaly() {
        assert_eq!(score(Detector::SequenceAnomaly, &tx().with_flags(true, true)), 0.9);
        assert_eq!(score(Detector::SequenceAnomaly, &tx().with_flags(false, true)), 0.6);
    }

    #[test]
    fn test_all_scores_in_unit_interval() {
        let samples = vec![
            tx(),
            tx().with_daily_count(u32::MAX).with_flags(true, true),
            Transaction::new("x", "s", f64::MAX, "", "").with_timestamp("2024-01-01T00:00:00"),
            Transaction::new("y", "s", f64::MIN, "Crypto", "Unknown")
                .with_location("International"),
        ];

        for t in &samples {
            for detector in Detector::ALL {
                let s = score(detector, t);
                assert!((0.0..=1.0).contains(&s), "{} scored {}", detector.name(), s);
            }
        }
    }
}
