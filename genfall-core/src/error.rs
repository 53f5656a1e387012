//! Error types for the genfall core.
//!
//! Two layers of errors exist. [`CallError`] is what a call collaborator
//! reports for a single invocation; it never surfaces to the caller
//! directly. The orchestrator classifies it (see [`CallError::class`]) and
//! turns it into a routing decision. Only [`GenfallError`] variants are
//! ever user-visible.

use thiserror::Error;

use crate::types::AttemptRecord;

/// Top-level error type for all genfall operations.
#[derive(Error, Debug)]
pub enum GenfallError {
    /// Invalid configuration (no credentials, empty fallback order).
    /// Raised at construction, never mid-call.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote service rejected the credential (HTTP 401/403).
    ///
    /// Fatal: the credential itself is invalid, so retrying or falling back
    /// to another model cannot help. Carries every attempt made so far.
    #[error("Authentication failed for {model} (HTTP {status_code})")]
    Auth {
        /// The HTTP status that triggered the abort (401 or 403).
        status_code: u16,
        /// The model being attempted when authentication failed.
        model: String,
        /// All attempts made during this call, in order.
        attempts: Vec<AttemptRecord>,
    },

    /// Every model in the fallback order failed.
    ///
    /// Carries one [`AttemptRecord`] per failed model, in the order they
    /// were tried, for post-mortem diagnosis without re-running the call.
    #[error("All models failed ({} attempt(s))", attempts.len())]
    AllModelsFailed {
        /// All attempts made during this call, in order.
        attempts: Vec<AttemptRecord>,
    },

    /// A stream failed after at least one fragment had been yielded.
    ///
    /// Falling back at this point would duplicate text the consumer has
    /// already seen, so the error surfaces instead.
    #[error("Stream from {model} was interrupted: {message}")]
    StreamInterrupted {
        /// The model whose stream broke.
        model: String,
        /// HTTP status reported by the collaborator, if any.
        status_code: Option<u16>,
        /// Collaborator error text.
        message: String,
    },
}

impl GenfallError {
    /// The attempt history carried by this error, if any.
    #[must_use]
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            GenfallError::Auth { attempts, .. } | GenfallError::AllModelsFailed { attempts } => {
                attempts
            }
            _ => &[],
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, GenfallError>;

/// Error reported by a call collaborator for one invocation.
///
/// This is the closed boundary type the orchestrator classifies; it never
/// reaches the caller of `generate`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CallError {
    /// HTTP status code, when the failure carried one.
    pub status_code: Option<u16>,
    /// Human-readable error text from the collaborator.
    pub message: String,
}

impl CallError {
    /// Create a call error.
    #[must_use]
    pub fn new(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    /// Classify this error into a routing decision class.
    ///
    /// Pure function over the status code and message text:
    /// - 401/403 → [`ErrorClass::Auth`]
    /// - 429 → [`ErrorClass::RateLimited`]
    /// - 5xx, or text mentioning a timeout or connection problem →
    ///   [`ErrorClass::Transient`]
    /// - anything else → [`ErrorClass::Unclassified`]
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self.status_code {
            Some(401 | 403) => return ErrorClass::Auth,
            Some(429) => return ErrorClass::RateLimited,
            Some(code) if code >= 500 => return ErrorClass::Transient,
            _ => {}
        }
        let lower = self.message.to_lowercase();
        if lower.contains("timeout") || lower.contains("connection") {
            ErrorClass::Transient
        } else {
            ErrorClass::Unclassified
        }
    }
}

/// Routing decision class for a [`CallError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Credential is invalid — abort the whole call, never retry.
    Auth,
    /// Quota exhausted — never retried locally, triggers fallback.
    RateLimited,
    /// Temporary trouble — retried up to the budget, then fallback.
    Transient,
    /// Unknown failure — triggers fallback without retry.
    Unclassified,
}
