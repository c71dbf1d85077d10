//! Natural-language explanations for risk assessments
//!
//! The core only knows the [`ExplanationProvider`] contract. Whatever a hosted
//! model returns is normalised by its adapter; anything that goes wrong ends in
//! the local templated explanation.

pub mod http;

use crate::config::{ExplanationConfig, ExplanationProviderKind};
use crate::error::ExplanationError;
use crate::models::detectors::Detector;
use crate::types::assessment::{RiskLevel, RiskScores};
use crate::types::transaction::Transaction;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use http::HttpExplainer;

/// The parts of a transaction an explanation may mention
#[derive(Debug, Clone, Serialize)]
pub struct TransactionSummary {
    pub id: String,
    pub amount: f64,
    pub category: String,
    pub merchant: String,
}

impl From<&Transaction> for TransactionSummary {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.clone(),
            amount: tx.amount,
            category: tx.category.clone(),
            merchant: tx.merchant.clone(),
        }
    }
}

/// Request handed to an explanation provider
#[derive(Debug, Clone, Serialize)]
pub struct ExplanationRequest {
    pub transaction: TransactionSummary,
    pub scores: RiskScores,
    pub level: RiskLevel,
}

/// External collaborator turning a score vector into prose
#[async_trait]
pub trait ExplanationProvider: Send + Sync {
    /// Produce a short justification, or an error meaning "use the fallback"
    async fn explain(&self, request: &ExplanationRequest) -> Result<String, ExplanationError>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

/// An explanation; `fallback` marks a template served in place of a failed provider
#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    pub text: String,
    pub fallback: bool,
}

/// Templated explanation naming every detector above `factor_threshold`
pub fn template_explanation(scores: &RiskScores, factor_threshold: f64) -> String {
    let factors: Vec<&str> = Detector::ALL
        .iter()
        .map(|d| d.name())
        .filter(|name| scores.get(*name).is_some_and(|&s| s > factor_threshold))
        .collect();

    if factors.is_empty() {
        "Transaction shows minor deviations from normal spending patterns".to_string()
    } else {
        format!(
            "Transaction flagged due to unusual patterns in: {}",
            factors.join(", ")
        )
    }
}

/// Calls the configured provider under a timeout, degrading to the template
pub struct ExplanationService {
    provider: Option<Arc<dyn ExplanationProvider>>,
    timeout: Duration,
    factor_threshold: f64,
}

impl ExplanationService {
    pub fn new(
        provider: Option<Arc<dyn ExplanationProvider>>,
        timeout: Duration,
        factor_threshold: f64,
    ) -> Self {
        Self {
            provider,
            timeout,
            factor_threshold,
        }
    }

    /// Template-only service
    pub fn template(factor_threshold: f64) -> Self {
        Self::new(None, Duration::ZERO, factor_threshold)
    }

    /// Build from configuration
    pub fn from_config(config: &ExplanationConfig) -> Self {
        let provider: Option<Arc<dyn ExplanationProvider>> = match config.provider {
            ExplanationProviderKind::Template => None,
            ExplanationProviderKind::Http => match HttpExplainer::from_config(config) {
                Ok(explainer) => Some(Arc::new(explainer)),
                Err(e) => {
                    warn!(error = %e, "Explanation provider unavailable, using template explanations");
                    None
                }
            },
        };

        Self::new(
            provider,
            Duration::from_millis(config.timeout_ms),
            config.factor_threshold,
        )
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Explain an assessment. Never fails.
    pub async fn explain(&self, tx: &Transaction, scores: &RiskScores, level: RiskLevel) -> Explanation {
        let Some(provider) = &self.provider else {
            return Explanation {
                text: template_explanation(scores, self.factor_threshold),
                fallback: false,
            };
        };

        let request = ExplanationRequest {
            transaction: TransactionSummary::from(tx),
            scores: scores.clone(),
            level,
        };

        let outcome = match tokio::time::timeout(self.timeout, provider.explain(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ExplanationError::Timeout(self.timeout.as_millis() as u64)),
        };

        match outcome {
            Ok(text) => {
                debug!(transaction_id = %tx.id, provider = provider.name(), "Explanation generated");
                Explanation {
                    text,
                    fallback: false,
                }
            }
            Err(e) => {
                warn!(
                    transaction_id = %tx.id,
                    provider = provider.name(),
                    error = %e,
                    "Explanation provider failed, using template"
                );
                self.fallback(scores)
            }
        }
    }

    fn fallback(&self, scores: &RiskScores) -> Explanation {
        Explanation {
            text: template_explanation(scores, self.factor_threshold),
            fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider(Result<&'static str, ()>);

    #[async_trait]
    impl ExplanationProvider for FixedProvider {
        async fn explain(&self, _request: &ExplanationRequest) -> Result<String, ExplanationError> {
            self.0
                .map(str::to_string)
                .map_err(|_| ExplanationError::Unavailable("down".to_string()))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl ExplanationProvider for SlowProvider {
        async fn explain(&self, _request: &ExplanationRequest) -> Result<String, ExplanationError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("too late".to_string())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn scores() -> RiskScores {
        let mut scores: RiskScores = Detector::ALL
            .iter()
            .map(|d| (d.name().to_string(), 0.1))
            .collect();
        scores.insert("merchant_risk".to_string(), 0.8);
        scores.insert("velocity".to_string(), 0.9);
        scores
    }

    fn tx() -> Transaction {
        Transaction::new("tx_9", "s", 10.0, "Food", "Unknown")
    }

    #[test]
    fn test_template_lists_factors_in_registry_order() {
        assert_eq!(
            template_explanation(&scores(), 0.6),
            "Transaction flagged due to unusual patterns in: velocity, merchant_risk"
        );
    }

    #[test]
    fn test_template_minor_deviation() {
        let mut scores = scores();
        scores.insert("merchant_risk".to_string(), 0.6);
        scores.insert("velocity".to_string(), 0.2);

        assert_eq!(
            template_explanation(&scores, 0.6),
            "Transaction shows minor deviations from normal spending patterns"
        );
    }

    #[tokio::test]
    async fn test_provider_text_is_used() {
        let service = ExplanationService::new(
            Some(Arc::new(FixedProvider(Ok("Looks like card testing")))),
            Duration::from_secs(1),
            0.6,
        );

        let explanation = service.explain(&tx(), &scores(), RiskLevel::Critical).await;

        assert_eq!(explanation.text, "Looks like card testing");
        assert!(!explanation.fallback);
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back() {
        let service = ExplanationService::new(
            Some(Arc::new(FixedProvider(Err(())))),
            Duration::from_secs(1),
            0.6,
        );

        let explanation = service.explain(&tx(), &scores(), RiskLevel::Critical).await;

        assert!(explanation.fallback);
        assert!(explanation.text.contains("velocity"));
    }

    #[tokio::test]
    async fn test_provider_timeout_falls_back() {
        let service =
            ExplanationService::new(Some(Arc::new(SlowProvider)), Duration::from_millis(20), 0.6);

        let explanation = service.explain(&tx(), &scores(), RiskLevel::High).await;

        assert!(explanation.fallback);
    }

    #[tokio::test]
    async fn test_template_only_service() {
        let service = ExplanationService::template(0.6);
        assert!(!service.has_provider());

        let explanation = service.explain(&tx(), &scores(), RiskLevel::High).await;
        assert!(!explanation.fallback);
        assert!(explanation.text.contains("merchant_risk"));
    }

    #[test]
    fn test_http_provider_without_endpoint_degrades_to_template() {
        let config = ExplanationConfig {
            provider: ExplanationProviderKind::Http,
            ..ExplanationConfig::default()
        };

        assert!(!ExplanationService::from_config(&config).has_provider());
    }
}
