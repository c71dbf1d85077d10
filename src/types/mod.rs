//! Type definitions for the risk guard

pub mod alert;
pub mod assessment;
pub mod transaction;

pub use alert::Alert;
pub use assessment::{RiskAssessment, RiskLevel, RiskLevelThresholds, RiskScores};
pub use transaction::{Transaction, TransactionType};
