//! # genfall-core
//!
//! Leaf components of the genfall resilience engine. A call to a remote
//! generative-text service can fail in several independent ways — bad
//! credential, exhausted quota, transient network trouble, server error —
//! and each failure domain wants a different answer. This crate owns the
//! bookkeeping that informs those answers:
//!
//! - [`CredentialRotator`] — which credential to use next, with
//!   per-credential usage statistics.
//! - [`RateLimitTracker`] — per-model sliding-window request counts and
//!   quota prediction.
//! - [`HealthMonitor`] — per-model rolling latency and success statistics.
//!
//! The decision engine that composes them lives in `genfall-client`. All
//! state here is per-process and in-memory; trackers are cheap to clone and
//! clones share state, so concurrent calls see one consistent view.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod health;
pub mod rate_limit;
pub mod rotation;
pub mod types;

pub use config::{GenfallConfig, RotationGranularity};
pub use error::{CallError, ErrorClass, GenfallError, Result};
pub use health::{HealthMonitor, HealthStatus, ModelHealth, ModelMetrics};
pub use rate_limit::{RateLimitStatus, RateLimitTracker, WindowStats};
pub use rotation::{CredentialRotator, CredentialStats, RotationStrategy, Selection};
pub use types::{
    AttemptRecord, CallResponse, FallbackStats, GenerationConfig, GenerationResult, UsageMetadata,
};
