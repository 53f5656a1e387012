//! Per-model sliding-window request tracking and quota prediction.
//!
//! Each model keeps an ordered window of request timestamps, pruned to a
//! trailing 5-minute horizon on every access. Quota checks count the
//! trailing 60 seconds against the model's configured requests-per-minute.
//!
//! Prediction here is advisory: the tracker recommends a wait but never
//! blocks. Whether to honor the recommendation is the orchestrator's
//! policy (`enforce_rate_limit`).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Trailing horizon kept per model.
const WINDOW_HORIZON: Duration = Duration::from_secs(300);

/// The quota measurement window.
const RPM_WINDOW: Duration = Duration::from_secs(60);

/// Request counts over the tracked windows.
#[derive(Debug, Clone, Serialize)]
pub struct WindowStats {
    /// Requests in the trailing 60 seconds.
    pub requests_last_minute: usize,
    /// Requests in the trailing 5 minutes.
    pub requests_last_5_minutes: usize,
    /// Average requests per minute over the 5-minute horizon.
    pub average_rpm: f64,
}

/// Derived, read-only quota snapshot for one model.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    /// The model this status describes.
    pub model: String,
    /// Requests in the trailing 60 seconds.
    pub current_rpm: usize,
    /// Configured maximum requests per minute.
    pub max_rpm: u32,
    /// `current_rpm / max_rpm`, as a percentage.
    pub utilization_percent: f64,
    /// Utilization at or above 80%.
    pub is_near_limit: bool,
    /// Utilization at or above 90%.
    pub will_exceed_soon: bool,
    /// Raw window counts.
    pub window: WindowStats,
}

/// Thread-safe per-model request-rate tracker.
pub struct RateLimitTracker {
    inner: Arc<Mutex<TrackerInner>>,
}

struct TrackerInner {
    /// Per-model RPM limits; models absent here fall back to `default_rpm`.
    limits: HashMap<String, u32>,
    default_rpm: u32,
    /// Per-model request timestamps, insertion order = time order.
    windows: HashMap<String, VecDeque<Instant>>,
}

impl RateLimitTracker {
    /// Create a tracker with per-model RPM limits and a default for
    /// unknown models.
    #[must_use]
    pub fn new(limits: HashMap<String, u32>, default_rpm: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TrackerInner {
                limits,
                default_rpm,
                windows: HashMap::new(),
            })),
        }
    }

    /// Record one request against `model`'s window.
    pub fn record_request(&self, model: &str) {
        self.record_request_at(model, Instant::now());
    }

    /// Whether one more request to `model` right now would exceed its RPM
    /// limit.
    #[must_use]
    pub fn would_exceed_limit(&self, model: &str) -> bool {
        self.would_exceed_limit_at(model, Instant::now())
    }

    /// How long to wait before `model` drops back under its limit.
    ///
    /// Zero when under the limit; otherwise the time until the oldest
    /// request inside the 60-second window ages out. Advisory only.
    #[must_use]
    pub fn recommended_wait(&self, model: &str) -> Duration {
        self.recommended_wait_at(model, Instant::now())
    }

    /// Quota snapshot for `model`.
    #[must_use]
    pub fn status(&self, model: &str) -> RateLimitStatus {
        self.status_at(model, Instant::now())
    }

    fn record_request_at(&self, model: &str, now: Instant) {
        let mut inner = self.inner.lock();
        let window = inner.windows.entry(model.to_string()).or_default();
        window.push_back(now);
        Self::prune(window, now);
    }

    fn would_exceed_limit_at(&self, model: &str, now: Instant) -> bool {
        let status = self.status_at(model, now);
        status.current_rpm >= status.max_rpm as usize
    }

    fn recommended_wait_at(&self, model: &str, now: Instant) -> Duration {
        if !self.would_exceed_limit_at(model, now) {
            return Duration::ZERO;
        }
        let inner = self.inner.lock();
        let Some(window) = inner.windows.get(model) else {
            return Duration::ZERO;
        };
        // Oldest request still inside the 60s window; once it ages out the
        // count drops by one.
        window
            .iter()
            .find(|t| now.duration_since(**t) <= RPM_WINDOW)
            .map_or(Duration::ZERO, |oldest| {
                RPM_WINDOW.saturating_sub(now.duration_since(*oldest))
            })
    }

    fn status_at(&self, model: &str, now: Instant) -> RateLimitStatus {
        let mut inner = self.inner.lock();
        let max_rpm = inner
            .limits
            .get(model)
            .copied()
            .unwrap_or(inner.default_rpm);

        let (current_rpm, in_horizon) = match inner.windows.get_mut(model) {
            Some(window) => {
                Self::prune(window, now);
                let current = window
                    .iter()
                    .filter(|t| now.duration_since(**t) <= RPM_WINDOW)
                    .count();
                (current, window.len())
            }
            None => (0, 0),
        };

        let utilization_percent = if max_rpm > 0 {
            (current_rpm as f64 / f64::from(max_rpm)) * 100.0
        } else {
            0.0
        };

        RateLimitStatus {
            model: model.to_string(),
            current_rpm,
            max_rpm,
            utilization_percent,
            is_near_limit: utilization_percent >= 80.0,
            will_exceed_soon: utilization_percent >= 90.0,
            window: WindowStats {
                requests_last_minute: current_rpm,
                requests_last_5_minutes: in_horizon,
                average_rpm: in_horizon as f64 / 5.0,
            },
        }
    }

    /// Drop timestamps older than the 5-minute horizon. The window is in
    /// time order, so pruning only pops from the front.
    fn prune(window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) > WINDOW_HORIZON {
                window.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Clone for RateLimitTracker {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(limit: u32) -> RateLimitTracker {
        let mut limits = HashMap::new();
        limits.insert("model-a".to_string(), limit);
        RateLimitTracker::new(limits, 15)
    }

    #[test]
    fn unknown_model_uses_default_limit() {
        let tracker = tracker(2);
        assert_eq!(tracker.status("model-unknown").max_rpm, 15);
    }

    #[test]
    fn empty_window_is_under_limit() {
        let tracker = tracker(2);
        assert!(!tracker.would_exceed_limit("model-a"));
        assert_eq!(tracker.recommended_wait("model-a"), Duration::ZERO);

        let status = tracker.status("model-a");
        assert_eq!(status.current_rpm, 0);
        assert!(!status.is_near_limit);
    }

    #[test]
    fn counts_reach_limit() {
        let tracker = tracker(2);
        let base = Instant::now();

        tracker.record_request_at("model-a", base);
        assert!(!tracker.would_exceed_limit_at("model-a", base));

        tracker.record_request_at("model-a", base);
        assert!(tracker.would_exceed_limit_at("model-a", base));

        let status = tracker.status_at("model-a", base);
        assert_eq!(status.current_rpm, 2);
        assert!((status.utilization_percent - 100.0).abs() < f64::EPSILON);
        assert!(status.is_near_limit);
        assert!(status.will_exceed_soon);
    }

    #[test]
    fn request_ages_out_of_rpm_window_but_stays_in_horizon() {
        let tracker = tracker(2);
        let base = Instant::now();
        tracker.record_request_at("model-a", base);

        let after_minute = base + Duration::from_secs(61);
        let status = tracker.status_at("model-a", after_minute);
        assert_eq!(status.current_rpm, 0);
        assert_eq!(status.window.requests_last_5_minutes, 1);

        let after_horizon = base + Duration::from_secs(301);
        let status = tracker.status_at("model-a", after_horizon);
        assert_eq!(status.window.requests_last_5_minutes, 0);
    }

    #[test]
    fn recommended_wait_tracks_oldest_in_window() {
        let tracker = tracker(1);
        let base = Instant::now();
        tracker.record_request_at("model-a", base);

        let now = base + Duration::from_secs(10);
        assert!(tracker.would_exceed_limit_at("model-a", now));
        assert_eq!(
            tracker.recommended_wait_at("model-a", now),
            Duration::from_secs(50)
        );

        // Once the request ages out, no wait is needed.
        let later = base + Duration::from_secs(61);
        assert_eq!(tracker.recommended_wait_at("model-a", later), Duration::ZERO);
    }

    #[test]
    fn recommended_wait_skips_aged_out_entries() {
        let tracker = tracker(1);
        let base = Instant::now();
        // One old request (outside 60s, inside horizon) and one fresh.
        tracker.record_request_at("model-a", base);
        tracker.record_request_at("model-a", base + Duration::from_secs(90));

        let now = base + Duration::from_secs(100);
        // The fresh entry is 10s old; the wait is against it, not the entry
        // that already aged out of the minute window.
        assert_eq!(
            tracker.recommended_wait_at("model-a", now),
            Duration::from_secs(50)
        );
    }

    #[test]
    fn windows_are_per_model() {
        let tracker = tracker(1);
        let base = Instant::now();
        tracker.record_request_at("model-a", base);

        assert!(tracker.would_exceed_limit_at("model-a", base));
        assert!(!tracker.would_exceed_limit_at("model-b", base));
    }

    #[test]
    fn zero_limit_reports_zero_utilization() {
        let tracker = RateLimitTracker::new(HashMap::new(), 0);
        tracker.record_request("model-a");
        let status = tracker.status("model-a");
        assert!((status.utilization_percent - 0.0).abs() < f64::EPSILON);
        assert!(tracker.would_exceed_limit("model-a"));
    }

    #[test]
    fn clone_shares_windows() {
        let tracker1 = tracker(5);
        let tracker2 = tracker1.clone();
        tracker1.record_request("model-a");
        assert_eq!(tracker2.status("model-a").current_rpm, 1);
    }
}
