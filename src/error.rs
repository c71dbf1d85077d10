//! Error types for the risk guard

use thiserror::Error;

/// Errors surfaced by the monitoring supervisor and its adapters
#[derive(Debug, Error)]
pub enum RiskGuardError {
    /// Could not reach the event broker
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    /// Could not subscribe to the inbound subject
    #[error("Failed to subscribe to '{subject}': {message}")]
    Subscribe { subject: String, message: String },

    /// Could not publish to the outbound subject
    #[error("Failed to publish to '{subject}': {message}")]
    Publish { subject: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A detector could not evaluate its rule; it scores 0.0
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectorError {
    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// The explanation provider produced nothing usable
#[derive(Debug, Error)]
pub enum ExplanationError {
    #[error("Explanation provider unavailable: {0}")]
    Unavailable(String),

    #[error("Explanation provider timed out after {0}ms")]
    Timeout(u64),

    #[error("Explanation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Explanation provider returned no text")]
    EmptyResponse,
}

pub type Result<T> = std::result::Result<T, RiskGuardError>;
