//! Per-session stream consumer loop

use crate::pipeline::RiskPipeline;
use crate::source::TransactionStream;
use crate::types::assessment::RiskAssessment;
use futures::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Counters reported when a consumer loop ends
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSummary {
    pub received: u64,
    pub skipped: u64,
    pub assessed: u64,
    pub flagged: u64,
    pub failed: u64,
}

/// Drives the pipeline for every transaction of one session
pub struct TransactionConsumer {
    session_id: String,
    pipeline: Arc<RiskPipeline>,
    alerts: mpsc::UnboundedSender<RiskAssessment>,
}

impl TransactionConsumer {
    /// Create a consumer handing non-LOW assessments to `alerts`
    pub fn new(
        session_id: &str,
        pipeline: Arc<RiskPipeline>,
        alerts: mpsc::UnboundedSender<RiskAssessment>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            pipeline,
            alerts,
        }
    }

    /// Get the monitored session
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Consume until the stream ends.
    ///
    /// Transactions for other sessions are skipped. A failure while assessing
    /// one transaction is logged and the loop moves on.
    pub async fn run(self, mut transactions: TransactionStream) -> ConsumerSummary {
        let mut summary = ConsumerSummary::default();
        info!(session_id = %self.session_id, "Transaction consumer started");

        while let Some(tx) = transactions.next().await {
            summary.received += 1;

            if tx.session_id != self.session_id {
                summary.skipped += 1;
                continue;
            }

            let tx_id = tx.id.clone();
            let assessment = AssertUnwindSafe(self.pipeline.assess(&self.session_id, tx))
                .catch_unwind()
                .await;

            let assessment = match assessment {
                Ok(assessment) => assessment,
                Err(_) => {
                    summary.failed += 1;
                    error!(
                        session_id = %self.session_id,
                        transaction_id = %tx_id,
                        "Transaction processing panicked, skipping"
                    );
                    continue;
                }
            };
            summary.assessed += 1;

            if summary.assessed % 100 == 0 {
                info!(
                    session_id = %self.session_id,
                    assessed = summary.assessed,
                    flagged = summary.flagged,
                    "Processing milestone"
                );
            }

            if !assessment.anomaly_detected {
                debug!(
                    transaction_id = %tx_id,
                    confidence = assessment.confidence,
                    "Transaction processed (low risk)"
                );
                continue;
            }

            summary.flagged += 1;
            self.pipeline.metrics().record_alert(assessment.risk_level);
            if self.alerts.send(assessment).is_err() {
                warn!(
                    session_id = %self.session_id,
                    transaction_id = %tx_id,
                    "Alert dispatcher stopped, alert dropped"
                );
            }
        }

        info!(
            session_id = %self.session_id,
            received = summary.received,
            assessed = summary.assessed,
            flagged = summary.flagged,
            failed = summary.failed,
            "Transaction stream closed, consumer stopped"
        );

        summary
    }
}
