//! Shared types for requests, responses, and diagnostic snapshots.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::CallError;
use crate::health::ModelHealth;
use crate::rate_limit::RateLimitStatus;
use crate::rotation::CredentialStats;

/// Milliseconds since the Unix epoch, for wall-clock timestamps in
/// diagnostic records.
#[must_use]
pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// One failed attempt at one model during one logical request.
///
/// Accumulated per call and attached to terminal errors so a total failure
/// can be diagnosed without re-running the call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttemptRecord {
    /// The model that was attempted.
    pub model: String,
    /// Error text from the collaborator.
    pub error: String,
    /// HTTP status code, if the failure carried one.
    pub status_code: Option<u16>,
    /// Wall-clock time of the failure, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl AttemptRecord {
    /// Record an attempt timestamped now.
    #[must_use]
    pub fn now(model: impl Into<String>, error: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            model: model.into(),
            error: error.into(),
            status_code,
            timestamp_ms: epoch_millis(),
        }
    }

    /// Record a failed attempt from a collaborator error, timestamped now.
    #[must_use]
    pub fn from_call_error(model: impl Into<String>, err: &CallError) -> Self {
        Self::now(model, err.message.clone(), err.status_code)
    }
}

/// Generation parameters passed through to the call collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature (0.0 = deterministic).
    pub temperature: f32,
    /// Maximum tokens to generate, if capped.
    pub max_output_tokens: Option<u32>,
    /// Nucleus sampling cutoff.
    pub top_p: Option<f32>,
    /// Top-k sampling cutoff.
    pub top_k: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: None,
            top_p: None,
            top_k: None,
        }
    }
}

impl GenerationConfig {
    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cap the number of generated tokens.
    #[must_use]
    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }
}

/// Token usage reported by the remote service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated in the completion.
    pub completion_tokens: u32,
    /// Total billed tokens.
    pub total_tokens: u32,
}

/// Response from one successful collaborator invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResponse {
    /// The generated text.
    pub text: String,
    /// Token usage, when the service reports it.
    pub usage: Option<UsageMetadata>,
    /// Why generation stopped (e.g. `"stop"`, `"length"`), when reported.
    pub finish_reason: Option<String>,
    /// The raw service payload, passed through unmodified.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl CallResponse {
    /// A minimal response carrying only text. Handy for fakes in tests.
    #[must_use]
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
            finish_reason: None,
            raw: serde_json::Value::Null,
        }
    }
}

/// The outcome of a successful `generate` call.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// The generated text.
    pub text: String,
    /// The model that produced it (may differ from the first in the
    /// fallback order).
    pub model: String,
    /// The raw collaborator response, untouched.
    pub raw: CallResponse,
}

/// Read-only diagnostic snapshot across all trackers.
///
/// Eventually consistent: each tracker is snapshotted independently, so a
/// call completing concurrently may appear in some sections and not others.
#[derive(Debug, Clone, Serialize)]
pub struct FallbackStats {
    /// Per-credential usage statistics, in credential-index order.
    pub credentials: Vec<CredentialStats>,
    /// Rate-limit status per model in the fallback order. Empty when
    /// monitoring is disabled.
    pub rate_limits: Vec<RateLimitStatus>,
    /// Health per model in the fallback order. Empty when monitoring is
    /// disabled.
    pub health: Vec<ModelHealth>,
}
