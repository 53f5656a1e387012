//! Credential rotation — which secret to use for the next call.
//!
//! Credentials live in an arena-style `Vec` whose indices are stable for
//! the process lifetime; all statistics refer to credentials by index.
//! The rotator is cheap to clone and clones share state, so every call in
//! the process rotates through the same cursor and counters.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{GenfallError, Result};

/// Policy for choosing the next credential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationStrategy {
    /// Cycle through credentials in index order with a shared cursor.
    #[default]
    RoundRobin,
    /// Pick the credential with the fewest total requests; ties go to the
    /// lowest index.
    LeastUsed,
}

/// A selected credential: the secret plus its stable index.
#[derive(Debug, Clone)]
pub struct Selection {
    /// The credential secret, ready to pass to the collaborator.
    pub secret: String,
    /// Stable index of the credential, for recording the outcome.
    pub index: usize,
}

/// Usage statistics for one credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialStats {
    /// Stable index of the credential.
    pub index: usize,
    /// Total recorded requests (successes + failures).
    pub total_requests: u64,
    /// Recorded successes.
    pub success_count: u64,
    /// Recorded failures.
    pub failure_count: u64,
    /// Last selection time, milliseconds since the Unix epoch. `None`
    /// until first selected.
    pub last_used_ms: Option<u64>,
}

/// Thread-safe credential rotator.
pub struct CredentialRotator {
    inner: Arc<Mutex<RotatorInner>>,
}

struct RotatorInner {
    credentials: Vec<String>,
    stats: Vec<CredStat>,
    cursor: usize,
    strategy: RotationStrategy,
}

#[derive(Default)]
struct CredStat {
    total: u64,
    success: u64,
    failure: u64,
    last_used: Option<SystemTime>,
}

impl CredentialRotator {
    /// Create a rotator over a non-empty credential set.
    ///
    /// # Errors
    /// Returns `GenfallError::Config` if `credentials` is empty.
    pub fn new(credentials: Vec<String>, strategy: RotationStrategy) -> Result<Self> {
        if credentials.is_empty() {
            return Err(GenfallError::Config(
                "at least one credential is required".into(),
            ));
        }
        let stats = credentials.iter().map(|_| CredStat::default()).collect();
        Ok(Self {
            inner: Arc::new(Mutex::new(RotatorInner {
                credentials,
                stats,
                cursor: 0,
                strategy,
            })),
        })
    }

    /// Select the next credential per the configured strategy.
    ///
    /// Updates the credential's last-used timestamp; request counters only
    /// move on [`record_success`](Self::record_success) /
    /// [`record_failure`](Self::record_failure).
    #[must_use]
    pub fn select(&self) -> Selection {
        let mut inner = self.inner.lock();
        let index = match inner.strategy {
            RotationStrategy::RoundRobin => {
                let len = inner.credentials.len();
                let index = inner.cursor;
                inner.cursor = (index + 1) % len;
                index
            }
            RotationStrategy::LeastUsed => inner
                .stats
                .iter()
                .enumerate()
                .min_by_key(|(index, s)| (s.total, *index))
                .map_or(0, |(index, _)| index),
        };
        inner.stats[index].last_used = Some(SystemTime::now());
        Selection {
            secret: inner.credentials[index].clone(),
            index,
        }
    }

    /// Record a successful call made with the credential at `index`.
    pub fn record_success(&self, index: usize) {
        let mut inner = self.inner.lock();
        if let Some(stat) = inner.stats.get_mut(index) {
            stat.total += 1;
            stat.success += 1;
        }
    }

    /// Record a failed call made with the credential at `index`.
    pub fn record_failure(&self, index: usize) {
        let mut inner = self.inner.lock();
        if let Some(stat) = inner.stats.get_mut(index) {
            stat.total += 1;
            stat.failure += 1;
        }
    }

    /// Number of credentials in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().credentials.len()
    }

    /// Whether the pool is empty. Always false for a constructed rotator.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot per-credential statistics in index order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CredentialStats> {
        let inner = self.inner.lock();
        inner
            .stats
            .iter()
            .enumerate()
            .map(|(index, s)| CredentialStats {
                index,
                total_requests: s.total,
                success_count: s.success,
                failure_count: s.failure,
                last_used_ms: s.last_used.and_then(|t| {
                    t.duration_since(UNIX_EPOCH)
                        .ok()
                        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                }),
            })
            .collect()
    }
}

impl Clone for CredentialRotator {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
