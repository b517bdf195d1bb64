//! Prediction metrics and periodic summaries for the serving loop.

use crate::types::RiskTier;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for served predictions
pub struct PredictionMetrics {
    /// Successful predictions
    pub predictions: AtomicU64,
    /// Refused or failed requests
    pub failures: AtomicU64,
    by_tier: RwLock<HashMap<RiskTier, u64>>,
    failures_by_kind: RwLock<HashMap<&'static str, u64>>,
    /// Latencies in microseconds
    latencies: RwLock<Vec<u64>>,
    probability_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl PredictionMetrics {
    pub fn new() -> Self {
        Self {
            predictions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            by_tier: RwLock::new(HashMap::new()),
            failures_by_kind: RwLock::new(HashMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successful prediction
    pub fn record_prediction(&self, latency: Duration, probability: f64, tier: RiskTier) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);

        if let Ok(mut by_tier) = self.by_tier.write() {
            *by_tier.entry(tier).or_insert(0) += 1;
        }

        let bucket = ((probability * 10.0).max(0.0) as usize).min(9);
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a refused or failed request by error kind
    pub fn record_failure(&self, latency: Duration, kind: &'static str) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);

        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind).or_insert(0) += 1;
        }
    }

    fn record_latency(&self, latency: Duration) {
        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            // Keep only the most recent samples
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    pub fn get_latency_stats(&self) -> LatencyStats {
        let mut sorted = match self.latencies.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return LatencyStats::default(),
        };
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let pick = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: pick(0.50),
            p95_us: pick(0.95),
            p99_us: pick(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Requests per second since start, successes and failures alike
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let total = self.predictions.load(Ordering::Relaxed) + self.failures.load(Ordering::Relaxed);
        if elapsed > 0.0 {
            total as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|b| *b)
            .unwrap_or([0; 10])
    }

    pub fn get_tier_counts(&self) -> HashMap<RiskTier, u64> {
        self.by_tier.read().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn get_failure_counts(&self) -> HashMap<&'static str, u64> {
        self.failures_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let predictions = self.predictions.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let latency = self.get_latency_stats();
        let tiers = self.get_tier_counts();

        info!(
            predictions = predictions,
            failures = failures,
            throughput = format!("{:.1} req/s", self.get_throughput()),
            "Prediction summary"
        );
        info!(
            mean_us = latency.mean_us,
            p50_us = latency.p50_us,
            p95_us = latency.p95_us,
            p99_us = latency.p99_us,
            max_us = latency.max_us,
            "Latency"
        );
        info!(
            low = tiers.get(&RiskTier::Low).copied().unwrap_or(0),
            medium = tiers.get(&RiskTier::Medium).copied().unwrap_or(0),
            high = tiers.get(&RiskTier::High).copied().unwrap_or(0),
            "Risk tiers"
        );
        for (kind, count) in self.get_failure_counts() {
            info!(kind = kind, count = count, "Failures");
        }

        let distribution = self.get_probability_distribution();
        let total: u64 = distribution.iter().sum();
        if total > 0 {
            for (i, &count) in distribution.iter().enumerate() {
                let pct = (count as f64 / total as f64) * 100.0;
                info!(
                    "  p {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                    i as f64 / 10.0,
                    (i + 1) as f64 / 10.0,
                    count,
                    pct,
                    "█".repeat(((pct / 5.0) as usize).min(20))
                );
            }
        }
    }
}

impl Default for PredictionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodically logs a metrics summary
pub struct MetricsReporter {
    metrics: Arc<PredictionMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PredictionMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Prediction, PredictionResponse, RiskPolicy};

    #[test]
    fn test_records_predictions_and_failures() {
        let metrics = PredictionMetrics::new();

        metrics.record_prediction(Duration::from_micros(100), 0.82, RiskTier::High);
        metrics.record_prediction(Duration::from_micros(300), 0.12, RiskTier::Low);
        metrics.record_prediction(Duration::from_micros(200), 1.0, RiskTier::High);
        metrics.record_failure(Duration::from_micros(50), "invalid_request");

        assert_eq!(metrics.predictions.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.get_tier_counts().get(&RiskTier::High), Some(&2));
        assert_eq!(metrics.get_failure_counts().get("invalid_request"), Some(&1));

        let distribution = metrics.get_probability_distribution();
        assert_eq!(distribution[1], 1);
        assert_eq!(distribution[8], 1);
        assert_eq!(distribution[9], 1);
    }

    #[test]
    fn test_latency_stats() {
        let metrics = PredictionMetrics::new();
        assert_eq!(metrics.get_latency_stats(), LatencyStats::default());

        for us in 1..=100 {
            metrics.record_prediction(Duration::from_micros(us), 0.5, RiskTier::Medium);
        }

        let stats = metrics.get_latency_stats();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.mean_us, 50);
        assert_eq!(stats.p50_us, 51);
        assert_eq!(stats.max_us, 100);
    }

    #[test]
    fn test_histogram_uses_unrounded_probability() {
        let metrics = PredictionMetrics::new();
        let response = PredictionResponse::from_prediction(&Prediction {
            probability: 0.69996,
            risk_tier: RiskTier::Medium,
            baseline_used: "chb01_baseline".to_string(),
            policy: RiskPolicy::ThreeTierV1,
        });
        // the rounded percentage lands on the next decile
        assert_eq!(response.risk_percentage, 70.0);

        metrics.record_prediction(Duration::from_micros(10), response.probability, response.risk_tier);

        let distribution = metrics.get_probability_distribution();
        assert_eq!(distribution[6], 1);
        assert_eq!(distribution[7], 0);
    }
}
