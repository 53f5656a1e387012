//! Property-based tests for the genfall trackers.
//!
//! Uses `proptest` to verify rotation, rate-window, and health invariants
//! under random request patterns.

use proptest::prelude::*;

use genfall_core::health::{HealthMonitor, HealthStatus};
use genfall_core::rate_limit::RateLimitTracker;
use genfall_core::rotation::{CredentialRotator, RotationStrategy};

fn pool(size: usize, strategy: RotationStrategy) -> CredentialRotator {
    let credentials = (0..size).map(|i| format!("secret-{i}")).collect();
    CredentialRotator::new(credentials, strategy).expect("non-empty pool")
}

// ---------------------------------------------------------------------------
// Property: Round-robin selection i returns i mod k
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn round_robin_is_modular(k in 1usize..8, n in 0usize..64) {
        let rotator = pool(k, RotationStrategy::RoundRobin);
        for i in 0..n {
            prop_assert_eq!(rotator.select().index, i % k);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: LeastUsed always selects a credential with minimal totals
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn least_used_selects_minimum(
        k in 1usize..6,
        outcomes in prop::collection::vec((0usize..6, any::<bool>()), 0..64),
    ) {
        let rotator = pool(k, RotationStrategy::LeastUsed);
        for (index, success) in outcomes {
            if success {
                rotator.record_success(index % k);
            } else {
                rotator.record_failure(index % k);
            }
        }

        let min_total = rotator
            .snapshot()
            .iter()
            .map(|s| s.total_requests)
            .min()
            .expect("non-empty pool");

        let selected = rotator.select().index;
        prop_assert_eq!(rotator.snapshot()[selected].total_requests, min_total);
    }
}

// ---------------------------------------------------------------------------
// Property: Credential counters always reconcile
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn credential_counters_reconcile(
        k in 1usize..6,
        outcomes in prop::collection::vec((0usize..6, any::<bool>()), 0..64),
    ) {
        let rotator = pool(k, RotationStrategy::RoundRobin);
        for (index, success) in &outcomes {
            if *success {
                rotator.record_success(index % k);
            } else {
                rotator.record_failure(index % k);
            }
        }

        let stats = rotator.snapshot();
        let total: u64 = stats.iter().map(|s| s.total_requests).sum();
        prop_assert_eq!(total, outcomes.len() as u64);
        for s in &stats {
            prop_assert_eq!(s.total_requests, s.success_count + s.failure_count);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: Rate windows never over-count fresh requests
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn rate_window_counts_match_recorded(n in 0usize..40, limit in 1u32..30) {
        let tracker = RateLimitTracker::new(std::collections::HashMap::new(), limit);
        for _ in 0..n {
            tracker.record_request("model-a");
        }

        // All requests were just recorded, so nothing has aged out.
        let status = tracker.status("model-a");
        prop_assert_eq!(status.current_rpm, n);
        prop_assert_eq!(status.window.requests_last_5_minutes, n);
        prop_assert_eq!(status.max_rpm, limit);
        prop_assert_eq!(
            tracker.would_exceed_limit("model-a"),
            n >= limit as usize
        );
    }
}

// ---------------------------------------------------------------------------
// Property: Health percentiles are ordered and rates bounded
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn health_snapshot_invariants(
        samples in prop::collection::vec((0.0f64..10_000.0, any::<bool>()), 1..200),
    ) {
        let monitor = HealthMonitor::new();
        for (latency, success) in &samples {
            monitor.record_request("model-a", *latency, *success, None);
        }

        let health = monitor.health("model-a");
        prop_assert!(health.success_rate >= 0.0 && health.success_rate <= 1.0);
        prop_assert_eq!(health.metrics.total_requests, samples.len() as u64);
        prop_assert!(health.metrics.p50_latency_ms <= health.metrics.p95_latency_ms);
        prop_assert!(health.metrics.p95_latency_ms <= health.metrics.p99_latency_ms);

        // Average is bounded by the sample buffer extremes.
        let cap = samples.len().min(100);
        let recent = &samples[samples.len() - cap..];
        let lo = recent.iter().map(|(l, _)| *l).fold(f64::INFINITY, f64::min);
        let hi = recent.iter().map(|(l, _)| *l).fold(0.0f64, f64::max);
        prop_assert!(health.avg_latency_ms >= lo - 1e-9);
        prop_assert!(health.avg_latency_ms <= hi + 1e-9);
    }
}

// ---------------------------------------------------------------------------
// Property: A trailing failure streak of 3+ is always unhealthy
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn trailing_streak_forces_unhealthy(
        prefix in prop::collection::vec(any::<bool>(), 0..50),
        streak in 3u32..10,
    ) {
        let monitor = HealthMonitor::new();
        for success in prefix {
            monitor.record_request("model-a", 10.0, success, None);
        }
        for _ in 0..streak {
            monitor.record_request("model-a", 10.0, false, None);
        }

        let health = monitor.health("model-a");
        // The prefix may end in failures, extending the streak.
        prop_assert!(health.consecutive_failures >= streak);
        prop_assert_eq!(health.status, HealthStatus::Unhealthy);
    }
}
