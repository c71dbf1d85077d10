//! Score aggregation into a single risk classification

use crate::types::assessment::{RiskLevel, RiskLevelThresholds, RiskScores};

/// Combines per-detector scores into a risk level and a confidence value.
///
/// Order-independent over the score mapping, so detector completion order
/// never matters.
pub struct RiskAggregator {
    thresholds: RiskLevelThresholds,
}

impl RiskAggregator {
    pub fn new(thresholds: RiskLevelThresholds) -> Self {
        Self { thresholds }
    }

    /// Classify a score vector; confidence is the maximum score.
    ///
    /// An empty vector carries no signal and classifies as LOW with confidence 0.
    pub fn aggregate(&self, scores: &RiskScores) -> (RiskLevel, f64) {
        let max = Self::max_score(scores);
        let mean = Self::mean_score(scores);
        (RiskLevel::classify(max, mean, &self.thresholds), max)
    }

    /// Get the maximum score among all detectors.
    pub fn max_score(scores: &RiskScores) -> f64 {
        scores.values().copied().fold(0.0, f64::max)
    }

    /// Get the arithmetic mean of all detector scores.
    pub fn mean_score(scores: &RiskScores) -> f64 {
        if scores.is_empty() {
            return 0.0;
        }
        scores.values().sum::<f64>() / scores.len() as f64
    }

    pub fn thresholds(&self) -> &RiskLevelThresholds {
        &self.thresholds
    }
}

impl Default for RiskAggregator {
    fn default() -> Self {
        Self::new(RiskLevelThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::detectors::Detector;

    fn uniform(value: f64) -> RiskScores {
        Detector::ALL
            .iter()
            .map(|d| (d.name().to_string(), value))
            .collect()
    }

    #[test]
    fn test_single_extreme_detector_is_critical() {
        let mut scores = uniform(0.1);
        scores.insert("velocity".to_string(), 0.9);

        let (level, confidence) = RiskAggregator::default().aggregate(&scores);

        assert_eq!(level, RiskLevel::Critical);
        assert_eq!(confidence, 0.9);
    }

    #[test]
    fn test_all_low() {
        let (level, confidence) = RiskAggregator::default().aggregate(&uniform(0.1));

        assert_eq!(level, RiskLevel::Low);
        assert_eq!(confidence, 0.1);
    }

    #[test]
    fn test_high_from_max() {
        let mut scores = uniform(0.1);
        scores.insert("sequence_anomaly".to_string(), 0.7);

        let (level, _) = RiskAggregator::default().aggregate(&scores);
        assert_eq!(level, RiskLevel::High);
    }

    #[test]
    fn test_medium_from_mean() {
        let (level, confidence) = RiskAggregator::default().aggregate(&uniform(0.5));

        assert_eq!(level, RiskLevel::Medium);
        assert_eq!(confidence, 0.5);
    }

    #[test]
    fn test_empty_scores() {
        let (level, confidence) = RiskAggregator::default().aggregate(&RiskScores::new());

        assert_eq!(level, RiskLevel::Low);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn test_custom_thresholds() {
        let aggregator = RiskAggregator::new(RiskLevelThresholds {
            critical: 0.95,
            high: 0.85,
            medium: 0.4,
        });
        let mut scores = uniform(0.1);
        scores.insert("velocity".to_string(), 0.9);

        assert_eq!(aggregator.aggregate(&scores).0, RiskLevel::High);
    }

    #[test]
    fn test_mean_score() {
        let mut scores = RiskScores::new();
        scores.insert("a".to_string(), 0.2);
        scores.insert("b".to_string(), 0.6);

        assert!((RiskAggregator::mean_score(&scores) - 0.4).abs() < 1e-9);
    }
}
