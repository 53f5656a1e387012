//! Configuration for the genfall client.
//!
//! Loadable from TOML; every field has a serde default so a config file
//! only needs to name what it overrides. Credentials are usually injected
//! programmatically rather than checked into a file.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{GenfallError, Result};
use crate::rotation::RotationStrategy;

/// When the rotator picks a fresh credential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationGranularity {
    /// One credential per logical call, shared across the whole fallback
    /// order. The canonical design.
    #[default]
    PerCall,
    /// A fresh credential for every model attempted within a call.
    PerModelAttempt,
}

/// Top-level genfall configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenfallConfig {
    /// Credential secrets, in stable index order. Must be non-empty.
    #[serde(default)]
    pub credentials: Vec<String>,
    /// Models tried in order for a call with no explicit model.
    #[serde(default = "default_fallback_order")]
    pub fallback_order: Vec<String>,
    /// How the next credential is chosen.
    #[serde(default)]
    pub rotation_strategy: RotationStrategy,
    /// When a fresh credential is chosen.
    #[serde(default)]
    pub rotation_granularity: RotationGranularity,
    /// Retry budget for transient failures, per model.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff base: delay before retry `k` is `base * 2^(k-1)`.
    #[serde(default = "default_base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,
    /// Scale each backoff delay by a random factor in [0.5, 1.5).
    /// Off by default; concurrent callers sharing credentials may want it
    /// to avoid synchronized retry storms.
    #[serde(default)]
    pub jitter: bool,
    /// Sleep the recommended wait when a model is over its quota, instead
    /// of just logging it.
    #[serde(default)]
    pub enforce_rate_limit: bool,
    /// Track rate limits and model health. When off, quota prediction and
    /// health snapshots are unavailable.
    #[serde(default = "default_true")]
    pub enable_monitoring: bool,
    /// Per-model requests-per-minute limits.
    #[serde(default)]
    pub rate_limits: HashMap<String, u32>,
    /// RPM limit for models absent from `rate_limits`.
    #[serde(default = "default_rpm")]
    pub default_rpm: u32,
    /// Request timeout owned by the call collaborator, milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Base URL for the HTTP collaborator.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for GenfallConfig {
    fn default() -> Self {
        Self {
            credentials: Vec::new(),
            fallback_order: default_fallback_order(),
            rotation_strategy: RotationStrategy::default(),
            rotation_granularity: RotationGranularity::default(),
            max_retries: default_max_retries(),
            base_retry_delay_ms: default_base_retry_delay_ms(),
            jitter: false,
            enforce_rate_limit: false,
            enable_monitoring: true,
            rate_limits: HashMap::new(),
            default_rpm: default_rpm(),
            request_timeout_ms: default_request_timeout_ms(),
            base_url: default_base_url(),
        }
    }
}

impl GenfallConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `GenfallError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| GenfallError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `GenfallError::Config` if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| GenfallError::Config(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Check the invariants a client construction relies on.
    ///
    /// # Errors
    /// Returns `GenfallError::Config` if no credentials are configured or
    /// the fallback order is empty.
    pub fn validate(&self) -> Result<()> {
        if self.credentials.is_empty() {
            return Err(GenfallError::Config(
                "at least one credential is required".into(),
            ));
        }
        if self.fallback_order.is_empty() {
            return Err(GenfallError::Config(
                "fallback order must name at least one model".into(),
            ));
        }
        Ok(())
    }
}

fn default_fallback_order() -> Vec<String> {
    vec!["gpt-4o-mini".to_string(), "gpt-4o".to_string()]
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_retry_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_rpm() -> u32 {
    15
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
