//! Anomaly detectors and risk aggregation

pub mod aggregator;
pub mod detectors;
pub mod registry;

pub use aggregator::RiskAggregator;
pub use detectors::{Detector, DetectorThresholds};
pub use registry::{DetectionResult, DetectorRegistry};
