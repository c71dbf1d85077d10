//! Transaction records consumed from the inbound event stream

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Direction of funds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Credit,
    #[default]
    Debit,
}

/// A single financial transaction belonging to a monitored session.
///
/// Immutable once received; detectors only ever see it by shared reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction identifier
    #[serde(default = "unknown_id")]
    pub id: String,

    /// Owning session identifier
    #[serde(rename = "sessionid", alias = "session_id", default)]
    pub session_id: String,

    /// Transaction amount; `null` reads as 0
    #[serde(default, deserialize_with = "zero_if_null")]
    pub amount: f64,

    /// Spending category (e.g. "Food", "Gambling")
    #[serde(default = "unknown_label")]
    pub category: String,

    /// Merchant name
    #[serde(default = "unknown_label")]
    pub merchant: String,

    /// ISO-8601 timestamp as sent by the producer
    #[serde(default = "now_iso")]
    pub timestamp: String,

    /// CREDIT or DEBIT
    #[serde(rename = "type", default)]
    pub kind: TransactionType,

    /// Free-form location, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Producer flagged this as a duplicate submission
    #[serde(default)]
    pub is_duplicate: bool,

    /// Producer flagged this as part of a rapid burst
    #[serde(default)]
    pub rapid_sequence: bool,

    /// Number of transactions seen for this user today.
    ///
    /// Kept as sent: fractional or negative counts reach the velocity detector unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_count: Option<f64>,
}

fn unknown_id() -> String {
    "unknown".to_string()
}

fn unknown_label() -> String {
    "Unknown".to_string()
}

fn zero_if_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Transaction {
    /// Create a transaction with the required fields; optional fields take their defaults
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        amount: f64,
        category: impl Into<String>,
        merchant: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            amount,
            category: category.into(),
            merchant: merchant.into(),
            timestamp: now_iso(),
            kind: TransactionType::Debit,
            location: None,
            is_duplicate: false,
            rapid_sequence: false,
            daily_count: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_daily_count(mut self, daily_count: impl Into<f64>) -> Self {
        self.daily_count = Some(daily_count.into());
        self
    }

    pub fn with_flags(mut self, is_duplicate: bool, rapid_sequence: bool) -> Self {
        self.is_duplicate = is_duplicate;
        self.rapid_sequence = rapid_sequence;
        self
    }

    pub fn with_kind(mut self, kind: TransactionType) -> Self {
        self.kind = kind;
        self
    }

    /// Wall-clock hour (0-23) as written in the timestamp.
    ///
    /// Accepts RFC 3339 (`2024-03-01T14:05:00+05:30`) and naive ISO-8601
    /// (`2024-03-01T14:05:00`). Offsets are not normalised to UTC.
    pub fn hour(&self) -> Result<u32, chrono::ParseError> {
        let raw = self.timestamp.trim();
        match DateTime::<FixedOffset>::parse_from_rfc3339(raw) {
            Ok(ts) => Ok(ts.hour()),
            Err(rfc_err) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
                .map(|ts| ts.hour())
                .map_err(|_| rfc_err),
        }
    }
}
