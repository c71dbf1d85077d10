//! Parallel detector execution

use crate::baseline::Baseline;
use crate::models::detectors::{Detector, DetectorThresholds};
use crate::types::assessment::RiskScores;
use crate::types::transaction::Transaction;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of running every detector against one transaction
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// Score per detector name
    pub scores: RiskScores,
    /// Detectors that failed and were scored 0.0
    pub failed: Vec<&'static str>,
}

/// Runs the fixed detector set concurrently and collects a score vector.
///
/// Detectors fail open: an error or a panic contributes 0.0 instead of
/// aborting the assessment.
pub struct DetectorRegistry {
    detectors: Vec<Detector>,
    thresholds: Arc<DetectorThresholds>,
}

impl DetectorRegistry {
    /// Registry containing every detector
    pub fn new(thresholds: DetectorThresholds) -> Self {
        Self {
            detectors: Detector::ALL.to_vec(),
            thresholds: Arc::new(thresholds),
        }
    }

    /// Number of active detectors
    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// Active detector names in registry order
    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn thresholds(&self) -> &DetectorThresholds {
        &self.thresholds
    }

    /// Fan out one task per detector over a shared snapshot, then wait for all of them
    pub async fn evaluate(&self, tx: Arc<Transaction>, baseline: Arc<Baseline>) -> DetectionResult {
        let handles: Vec<_> = self
            .detectors
            .iter()
            .map(|&detector| {
                let tx = tx.clone();
                let baseline = baseline.clone();
                let thresholds = self.thresholds.clone();
                let handle =
                    tokio::spawn(async move { detector.score(&tx, &baseline, &thresholds) });
                (detector, handle)
            })
            .collect();

        let mut scores = RiskScores::with_capacity(handles.len());
        let mut failed = Vec::new();

        for (detector, handle) in handles {
            let score = match handle.await {
                Ok(Ok(score)) => sanitize(score),
                Ok(Err(e)) => {
                    warn!(
                        transaction_id = %tx.id,
                        detector = detector.name(),
                        error = %e,
                        "Detector failed, scoring 0.0"
                    );
                    failed.push(detector.name());
                    0.0
                }
                Err(e) => {
                    warn!(
                        transaction_id = %tx.id,
                        detector = detector.name(),
                        error = %e,
                        "Detector task aborted, scoring 0.0"
                    );
                    failed.push(detector.name());
                    0.0
                }
            };
            scores.insert(detector.name().to_string(), score);
        }

        debug!(transaction_id = %tx.id, scores = ?scores, "Detectors complete");

        DetectionResult { scores, failed }
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new(DetectorThresholds::default())
    }
}

/// Clamp into [0, 1]; NaN carries no signal
fn sanitize(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}
