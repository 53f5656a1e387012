//! Per-model rolling health and latency statistics.
//!
//! Each model keeps the most recent 100 latency samples (FIFO eviction)
//! plus success/failure counters and a consecutive-failure streak. The
//! derived [`ModelHealth`] snapshot classifies a model as healthy,
//! degraded, or unhealthy for routing diagnostics.
//!
//! Percentiles are nearest-rank (sort ascending, take `floor(n * p)`
//! clamped to `n - 1`), not interpolated, so snapshots are exactly
//! reproducible.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

/// Latency samples kept per model.
const MAX_SAMPLES: usize = 100;

/// Consecutive failures that force a model unhealthy.
const UNHEALTHY_STREAK: u32 = 3;

/// Coarse model health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Recent reliability and latency are fine.
    Healthy,
    /// Success rate below 95% or p95 latency above 5 seconds.
    Degraded,
    /// Three consecutive failures, or success rate below 80%.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Counter and percentile detail backing a [`ModelHealth`] snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ModelMetrics {
    /// Total recorded requests.
    pub total_requests: u64,
    /// Recorded successes.
    pub successful_requests: u64,
    /// Recorded failures.
    pub failed_requests: u64,
    /// Median latency over the sample buffer, milliseconds.
    pub p50_latency_ms: f64,
    /// 95th-percentile latency, milliseconds.
    pub p95_latency_ms: f64,
    /// 99th-percentile latency, milliseconds.
    pub p99_latency_ms: f64,
}

/// Derived health snapshot for one model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelHealth {
    /// The model this snapshot describes.
    pub model: String,
    /// Coarse classification.
    pub status: HealthStatus,
    /// Successes over total requests; 1.0 with no history.
    pub success_rate: f64,
    /// Mean latency over the sample buffer, milliseconds.
    pub avg_latency_ms: f64,
    /// Current consecutive-failure streak.
    pub consecutive_failures: u32,
    /// Counters and percentiles.
    pub metrics: ModelMetrics,
}

/// Thread-safe per-model health monitor.
pub struct HealthMonitor {
    inner: Arc<Mutex<HashMap<String, ModelRecord>>>,
}

#[derive(Default)]
struct ModelRecord {
    /// Most recent latency samples, oldest first.
    latencies: VecDeque<f64>,
    successes: u64,
    failures: u64,
    consecutive_failures: u32,
}

impl HealthMonitor {
    /// Create an empty monitor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record the outcome of one request against `model`.
    pub fn record_request(&self, model: &str, latency_ms: f64, success: bool, error: Option<&str>) {
        let mut inner = self.inner.lock();
        let record = inner.entry(model.to_string()).or_default();

        record.latencies.push_back(latency_ms);
        if record.latencies.len() > MAX_SAMPLES {
            record.latencies.pop_front();
        }

        if success {
            record.successes += 1;
            record.consecutive_failures = 0;
        } else {
            record.failures += 1;
            record.consecutive_failures += 1;
            if let Some(error) = error {
                debug!(model, error, "recorded model failure");
            }
        }
    }

    /// Health snapshot for `model`.
    ///
    /// A model with no history reports success rate 1.0, zero latencies,
    /// and [`HealthStatus::Healthy`].
    #[must_use]
    pub fn health(&self, model: &str) -> ModelHealth {
        let inner = self.inner.lock();
        let Some(record) = inner.get(model) else {
            return ModelHealth {
                model: model.to_string(),
                status: HealthStatus::Healthy,
                success_rate: 1.0,
                avg_latency_ms: 0.0,
                consecutive_failures: 0,
                metrics: ModelMetrics {
                    total_requests: 0,
                    successful_requests: 0,
                    failed_requests: 0,
                    p50_latency_ms: 0.0,
                    p95_latency_ms: 0.0,
                    p99_latency_ms: 0.0,
                },
            };
        };

        let total = record.successes + record.failures;
        let success_rate = if total > 0 {
            record.successes as f64 / total as f64
        } else {
            1.0
        };

        let mut sorted: Vec<f64> = record.latencies.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let avg_latency_ms = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };

        let p50 = nearest_rank(&sorted, 0.5);
        let p95 = nearest_rank(&sorted, 0.95);
        let p99 = nearest_rank(&sorted, 0.99);

        let status = if record.consecutive_failures >= UNHEALTHY_STREAK || success_rate < 0.8 {
            HealthStatus::Unhealthy
        } else if success_rate < 0.95 || p95 > 5000.0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        ModelHealth {
            model: model.to_string(),
            status,
            success_rate,
            avg_latency_ms,
            consecutive_failures: record.consecutive_failures,
            metrics: ModelMetrics {
                total_requests: total,
                successful_requests: record.successes,
                failed_requests: record.failures,
                p50_latency_ms: p50,
                p95_latency_ms: p95,
                p99_latency_ms: p99,
            },
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for HealthMonitor {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Nearest-rank percentile over an ascending-sorted slice: index
/// `floor(n * p)` clamped to `n - 1`. Zero for an empty slice.
fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[idx]
}
