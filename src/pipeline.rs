//! Per-transaction risk assessment

use crate::baseline::BaselineStore;
use crate::config::AppConfig;
use crate::explanation::ExplanationService;
use crate::metrics::PipelineMetrics;
use crate::models::aggregator::RiskAggregator;
use crate::models::registry::DetectorRegistry;
use crate::types::assessment::RiskAssessment;
use crate::types::transaction::Transaction;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Baseline lookup → detectors → aggregation → explanation
pub struct RiskPipeline {
    baselines: Arc<BaselineStore>,
    registry: DetectorRegistry,
    aggregator: RiskAggregator,
    explainer: ExplanationService,
    metrics: Arc<PipelineMetrics>,
}

impl RiskPipeline {
    pub fn new(
        baselines: Arc<BaselineStore>,
        registry: DetectorRegistry,
        aggregator: RiskAggregator,
        explainer: ExplanationService,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            baselines,
            registry,
            aggregator,
            explainer,
            metrics,
        }
    }

    /// Wire a pipeline from configuration
    pub fn from_config(config: &AppConfig, metrics: Arc<PipelineMetrics>) -> Self {
        Self::new(
            Arc::new(BaselineStore::new(config.baseline.clone())),
            DetectorRegistry::new(config.detection.detectors.clone()),
            RiskAggregator::new(config.detection.risk_levels.clone()),
            ExplanationService::from_config(&config.explanation),
            metrics,
        )
    }

    pub fn baselines(&self) -> &Arc<BaselineStore> {
        &self.baselines
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Assess one transaction for a session. Never fails; failing parts degrade.
    pub async fn assess(&self, session_id: &str, tx: Transaction) -> RiskAssessment {
        let start_time = Instant::now();
        let baseline = self.baselines.get_or_create(session_id);
        let tx = Arc::new(tx);

        let detection = self.registry.evaluate(tx.clone(), baseline).await;
        self.metrics.record_detector_failures(detection.failed.len());

        let (level, confidence) = self.aggregator.aggregate(&detection.scores);

        let explanation = self.explainer.explain(&tx, &detection.scores, level).await;
        if explanation.fallback {
            self.metrics.record_explanation_fallback();
        }

        let assessment = RiskAssessment::new(
            tx.id.clone(),
            level,
            detection.scores,
            confidence,
            explanation.text,
        );

        let processing_time = start_time.elapsed();
        self.metrics.record_transaction(processing_time, confidence);

        debug!(
            session_id = %session_id,
            transaction_id = %tx.id,
            risk_level = %level,
            confidence = confidence,
            processing_time_us = processing_time.as_micros(),
            "Transaction assessed"
        );

        assessment
    }
}
