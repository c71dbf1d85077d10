//! Inbound transaction sources
//!
//! The pipeline depends only on [`EventSource`]. `NatsSource` reads the live
//! broker; `SimulatedSource` is an in-process stand-in used when the broker is
//! unreachable and in tests.

use crate::error::{Result, RiskGuardError};
use crate::types::transaction::Transaction;
use async_nats::Client;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Whether the guard is wired to a real broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    Live,
    Simulation,
}

/// Stream of decoded transactions; ends when the source is closed
pub type TransactionStream = BoxStream<'static, Transaction>;

/// Capability interface over the inbound event stream
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a new subscription. Every subscription sees every transaction.
    async fn subscribe(&self) -> Result<TransactionStream>;

    fn mode(&self) -> StreamMode;

    /// Human-readable description of where transactions come from
    fn describe(&self) -> String;
}

/// Live source reading JSON transaction records from a NATS subject
pub struct NatsSource {
    client: Client,
    subject: String,
}

impl NatsSource {
    /// Create a new NATS transaction source
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[async_trait]
impl EventSource for NatsSource {
    async fn subscribe(&self) -> Result<TransactionStream> {
        let subscriber = self
            .client
            .subscribe(self.subject.clone())
            .await
            .map_err(|e| RiskGuardError::Subscribe {
                subject: self.subject.clone(),
                message: e.to_string(),
            })?;
        info!(subject = %self.subject, "Subscribed to transaction subject");

        let transactions = subscriber.filter_map(|message| async move {
            match decode(&message.payload) {
                Ok(tx) => Some(tx),
                Err(e) => {
                    warn!(error = %e, "Failed to deserialize transaction");
                    None
                }
            }
        });

        Ok(transactions.boxed())
    }

    fn mode(&self) -> StreamMode {
        StreamMode::Live
    }

    fn describe(&self) -> String {
        format!("NATS subject '{}'", self.subject)
    }
}

/// Decode one inbound record
pub fn decode(payload: &[u8]) -> Result<Transaction> {
    Ok(serde_json::from_slice(payload)?)
}

/// In-process source fed through [`SimulatedSource::inject`]
pub struct SimulatedSource {
    sender: Mutex<Option<broadcast::Sender<Transaction>>>,
}

impl SimulatedSource {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    /// Push a transaction to every open subscription.
    ///
    /// Returns how many subscriptions received it; zero once the source is closed.
    pub fn inject(&self, tx: Transaction) -> usize {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => sender.send(tx).unwrap_or(0),
            None => 0,
        }
    }

    /// End every subscription once buffered transactions are drained
    pub fn close(&self) {
        let closed = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if closed.is_some() {
            debug!("Simulated transaction source closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventSource for SimulatedSource {
    async fn subscribe(&self) -> Result<TransactionStream> {
        let receiver = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(broadcast::Sender::subscribe);

        let Some(receiver) = receiver else {
            return Ok(stream::empty().boxed());
        };

        let transactions = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(tx) => return Some((tx, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Simulated subscriber lagged, transactions dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(transactions.boxed())
    }

    fn mode(&self) -> StreamMode {
        StreamMode::Simulation
    }

    fn describe(&self) -> String {
        "NATS (Simulated)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: &str) -> Transaction {
        Transaction::new(id, "s1", 10.0, "Food", "Uber")
    }

    #[tokio::test]
    async fn test_simulated_fan_out_and_close() {
        let source = SimulatedSource::default();
        let mut a = source.subscribe().await.unwrap();
        let mut b = source.subscribe().await.unwrap();

        assert_eq!(source.inject(tx("t1")), 2);
        source.close();

        assert_eq!(a.next().await.unwrap().id, "t1");
        assert!(a.next().await.is_none());
        assert_eq!(b.next().await.unwrap().id, "t1");
        assert!(b.next().await.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_after_close_is_empty() {
        let source = SimulatedSource::default();
        source.close();

        assert!(source.is_closed());
        assert_eq!(source.inject(tx("dropped")), 0);
        let mut stream = source.subscribe().await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_mode_and_description() {
        let source = SimulatedSource::default();
        assert_eq!(source.mode(), StreamMode::Simulation);
        assert_eq!(source.describe(), "NATS (Simulated)");
        assert_eq!(serde_json::to_value(StreamMode::Simulation).unwrap(), "simulation");
    }

    #[test]
    fn test_decode() {
        let tx = decode(br#"{"id":"a","sessionid":"s","amount":5}"#).unwrap();
        assert_eq!(tx.id, "a");
        assert!(decode(b"not json").is_err());
    }

    #[test]
    fn test_decode_keeps_records_with_odd_numbers() {
        let negative = decode(br#"{"id":"a","sessionid":"s","amount":5,"daily_count":-1}"#).unwrap();
        assert_eq!(negative.daily_count, Some(-1.0));

        let fractional = decode(br#"{"id":"b","sessionid":"s","amount":5,"daily_count":2.5}"#).unwrap();
        assert_eq!(fractional.daily_count, Some(2.5));

        let no_amount = decode(br#"{"id":"c","sessionid":"s","amount":null}"#).unwrap();
        assert_eq!(no_amount.amount, 0.0);
    }
}
