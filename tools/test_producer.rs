//! Test Transaction Producer
//!
//! Generates and publishes test transactions to NATS for exercising the risk guard.
//!
//! Usage: test_producer [nats_url] [subject] [session_id] [count] [risk_rate] [delay_ms]

use chrono::{Local, Timelike};
use rand::Rng;
use risk_guard::types::{Transaction, TransactionType};
use std::time::Duration;
use tracing::{info, warn};

/// Transaction generator for testing
struct TransactionGenerator {
    rng: rand::rngs::ThreadRng,
    session_id: String,
    transaction_counter: u64,
}

impl TransactionGenerator {
    fn new(session_id: &str) -> Self {
        Self {
            rng: rand::thread_rng(),
            session_id: session_id.to_string(),
            transaction_counter: 0,
        }
    }

    fn next_id(&mut self) -> String {
        self.transaction_counter += 1;
        format!("tx_{:012}", self.transaction_counter)
    }

    /// Everyday spending that fits the default baseline
    fn generate_typical(&mut self) -> Transaction {
        let id = self.next_id();
        let hour = self.rng.gen_range(9..22);
        let timestamp = Local::now()
            .with_hour(hour)
            .unwrap_or_else(Local::now)
            .naive_local()
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();

        let amount = (self.rng.gen_range(50.0..3000.0_f64) * 100.0).round() / 100.0;
        let category = self.random_choice(&["Food", "Transport", "Shopping", "Utilities"]);
        let merchant = self.random_choice(&["Swiggy", "Uber", "Amazon", "Flipkart"]);
        let location = self.random_choice(&["Mumbai", "Pune", "Delhi"]);
        let daily_count = self.rng.gen_range(1..4_u32);

        Transaction::new(id, &self.session_id, amount, category, merchant)
            .with_timestamp(timestamp)
            .with_location(location)
            .with_daily_count(daily_count)
    }

    /// Spending that trips several detectors
    fn generate_risky(&mut self) -> Transaction {
        let id = self.next_id();
        let hour = self.random_choice(&["02", "03", "04", "23"]).to_string();
        let timestamp = format!("{}T{}:17:00", Local::now().format("%Y-%m-%d"), hour);

        let amount = (self.rng.gen_range(20000.0..60000.0_f64) * 100.0).round() / 100.0;
        let category = self.random_choice(&["Gambling", "Crypto", "High-Risk", "Electronics"]);
        let merchant =
            self.random_choice(&["Unknown", "International Transfer", "Crypto Exchange", "QuickCash"]);
        let location = self.random_choice(&["Unknown", "International - Lagos", "Bangalore"]);
        let daily_count = self.rng.gen_range(5..15_u32);
        let is_duplicate = self.rng.gen_bool(0.3);
        let rapid_sequence = self.rng.gen_bool(0.5);

        Transaction::new(id, &self.session_id, amount, category, merchant)
            .with_timestamp(timestamp)
            .with_location(location)
            .with_daily_count(daily_count)
            .with_flags(is_duplicate, rapid_sequence)
            .with_kind(TransactionType::Debit)
    }

    fn generate(&mut self, risk_rate: f64) -> (Transaction, bool) {
        if self.rng.gen_bool(risk_rate) {
            (self.generate_risky(), true)
        } else {
            (self.generate_typical(), false)
        }
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Transaction Producer");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("financial-transactions");
    let session_id = args.get(3).map(|s| s.as_str()).unwrap_or("demo-session");
    let count: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(100);
    let risk_rate: f64 = args
        .get(5)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.1_f64)
        .clamp(0.0, 1.0);
    let delay_ms: u64 = args.get(6).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        session_id = %session_id,
        count = count,
        risk_rate = risk_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(session_id, count, risk_rate, delay_ms).await;
        }
    };

    let mut generator = TransactionGenerator::new(session_id);
    let mut typical_count = 0;
    let mut risky_count = 0;

    info!("Starting to publish {} transactions...", count);

    for i in 0..count {
        let (transaction, risky) = generator.generate(risk_rate);
        if risky {
            risky_count += 1;
        } else {
            typical_count += 1;
        }

        let payload = serde_json::to_vec(&transaction)?;
        client.publish(subject.to_string(), payload.into()).await?;

        if (i + 1) % 10 == 0 {
            info!(
                "Published {}/{} transactions ({} typical, {} risky)",
                i + 1,
                count,
                typical_count,
                risky_count
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    client.flush().await?;

    info!(
        "Completed! Published {} transactions ({} typical, {} risky)",
        count, typical_count, risky_count
    );

    Ok(())
}

async fn run_dry_mode(session_id: &str, count: u64, risk_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = TransactionGenerator::new(session_id);

    for i in 0..count {
        let (transaction, _) = generator.generate(risk_rate);
        let json = serde_json::to_string_pretty(&transaction)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample transaction {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
