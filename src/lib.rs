//! Risk Guard Library
//!
//! Real-time risk monitoring for payment streams: per-session behavioural
//! baselines, a fixed set of rule-based anomaly detectors, score aggregation,
//! human-readable explanations and alert fan-out.

pub mod baseline;
pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod explanation;
pub mod guard;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod producer;
pub mod source;
pub mod types;

pub use baseline::{Baseline, BaselineStore};
pub use config::AppConfig;
pub use error::{Result, RiskGuardError};
pub use guard::{MonitoringStatus, RiskDashboard, RiskGuard};
pub use pipeline::RiskPipeline;
pub use source::StreamMode;
pub use types::{Alert, RiskAssessment, RiskLevel, Transaction};
