//! In-process counters, latency window and confidence histogram.

use crate::types::assessment::RiskLevel;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Number of recent assessment latencies kept for percentiles
const LATENCY_WINDOW: usize = 4096;

/// Confidence histogram resolution (0.0-0.1, 0.1-0.2, ...)
const CONFIDENCE_BINS: usize = 10;

/// Shared metrics for every consumer loop
pub struct PipelineMetrics {
    pub transactions_processed: AtomicU64,
    pub alerts_generated: AtomicU64,
    /// Detector evaluations that failed open
    pub detector_failures: AtomicU64,
    /// Explanations served by the template after a provider failure
    pub explanation_fallbacks: AtomicU64,
    alerts_by_level: RwLock<HashMap<RiskLevel, u64>>,
    latencies_us: Mutex<VecDeque<u64>>,
    confidence_bins: [AtomicU64; CONFIDENCE_BINS],
    started: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            transactions_processed: AtomicU64::new(0),
            alerts_generated: AtomicU64::new(0),
            detector_failures: AtomicU64::new(0),
            explanation_fallbacks: AtomicU64::new(0),
            alerts_by_level: RwLock::new(HashMap::new()),
            latencies_us: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
            confidence_bins: std::array::from_fn(|_| AtomicU64::new(0)),
            started: Instant::now(),
        }
    }

    /// Record one finished assessment
    pub fn record_transaction(&self, elapsed: Duration, confidence: f64) {
        self.transactions_processed.fetch_add(1, Ordering::Relaxed);

        {
            let mut window = self
                .latencies_us
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if window.len() == LATENCY_WINDOW {
                window.pop_front();
            }
            window.push_back(elapsed.as_micros() as u64);
        }

        let bin = ((confidence.clamp(0.0, 1.0) * CONFIDENCE_BINS as f64) as usize)
            .min(CONFIDENCE_BINS - 1);
        self.confidence_bins[bin].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self, level: RiskLevel) {
        self.alerts_generated.fetch_add(1, Ordering::Relaxed);
        *self
            .alerts_by_level
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(level)
            .or_insert(0) += 1;
    }

    pub fn record_detector_failures(&self, count: usize) {
        if count > 0 {
            self.detector_failures
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn record_explanation_fallback(&self) {
        self.explanation_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Latency statistics over the recent window
    pub fn latency(&self) -> LatencyStats {
        let mut samples: Vec<u64> = self
            .latencies_us
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();
        LatencyStats::from_samples(&mut samples)
    }

    /// Assessments per second since startup
    pub fn throughput(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.transactions_processed.load(Ordering::Relaxed) as f64 / elapsed
    }

    pub fn confidence_histogram(&self) -> [u64; CONFIDENCE_BINS] {
        std::array::from_fn(|i| self.confidence_bins[i].load(Ordering::Relaxed))
    }

    pub fn alerts_by_level(&self) -> HashMap<RiskLevel, u64> {
        self.alerts_by_level
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn alerts_at(&self, level: RiskLevel) -> u64 {
        self.alerts_by_level
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&level)
            .copied()
            .unwrap_or(0)
    }

    /// Point-in-time copy of every metric
    pub fn snapshot(&self) -> MetricsSnapshot {
        let transactions = self.transactions_processed.load(Ordering::Relaxed);
        let alerts = self.alerts_generated.load(Ordering::Relaxed);

        MetricsSnapshot {
            transactions_processed: transactions,
            alerts_generated: alerts,
            alert_rate_pct: percent(alerts, transactions),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
            explanation_fallbacks: self.explanation_fallbacks.load(Ordering::Relaxed),
            throughput_per_sec: self.throughput(),
            latency: self.latency(),
            alerts_by_level: self
                .alerts_by_level()
                .into_iter()
                .map(|(level, count)| (level.as_str().to_string(), count))
                .collect(),
            confidence_histogram: self.confidence_histogram(),
        }
    }

    /// Log a summary of the current snapshot
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();

        info!(
            transactions = snapshot.transactions_processed,
            alerts = snapshot.alerts_generated,
            alert_rate_pct = format!("{:.1}", snapshot.alert_rate_pct),
            throughput = format!("{:.1} tx/s", snapshot.throughput_per_sec),
            detector_failures = snapshot.detector_failures,
            explanation_fallbacks = snapshot.explanation_fallbacks,
            "Risk guard metrics"
        );
        info!(
            samples = snapshot.latency.samples,
            mean_us = snapshot.latency.mean_us,
            p50_us = snapshot.latency.p50_us,
            p95_us = snapshot.latency.p95_us,
            p99_us = snapshot.latency.p99_us,
            max_us = snapshot.latency.max_us,
            "Assessment latency"
        );
        for (level, count) in &snapshot.alerts_by_level {
            info!(
                level = %level,
                count = count,
                share_pct = format!("{:.1}", percent(*count, snapshot.alerts_generated)),
                "Alerts by level"
            );
        }
        info!(histogram = ?snapshot.confidence_histogram, "Confidence distribution");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Latency percentiles in microseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl LatencyStats {
    fn from_samples(samples: &mut [u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable();

        let nearest_rank = |q: f64| samples[((samples.len() - 1) as f64 * q).round() as usize];

        Self {
            samples: samples.len(),
            mean_us: samples.iter().sum::<u64>() / samples.len() as u64,
            p50_us: nearest_rank(0.50),
            p95_us: nearest_rank(0.95),
            p99_us: nearest_rank(0.99),
            max_us: samples[samples.len() - 1],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub transactions_processed: u64,
    pub alerts_generated: u64,
    pub alert_rate_pct: f64,
    pub detector_failures: u64,
    pub explanation_fallbacks: u64,
    pub throughput_per_sec: f64,
    pub latency: LatencyStats,
    /// Keyed by lowercase level name
    pub alerts_by_level: BTreeMap<String, u64>,
    pub confidence_histogram: [u64; CONFIDENCE_BINS],
}

/// Logs a metrics summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    every: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            every: Duration::from_secs(interval_secs.max(1)),
        }
    }

    /// Run until the task is aborted
    pub async fn start(self) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + self.every, self.every);
        loop {
            ticker.tick().await;
            self.metrics.print_summary();
        }
    }
}
