//! The fallback decision engine.
//!
//! For each call: pick a model from the fallback order, pick a credential
//! from the rotator, invoke the collaborator with retry/backoff, classify
//! what went wrong, feed the trackers, and decide whether to retry, move
//! to the next model, or abort.
//!
//! Failure domains and their routing:
//! - 401/403 — the credential is bad; abort the whole call immediately.
//! - 429 — the quota is spent; a different model beats waiting, so fall
//!   back without local retries.
//! - 5xx / timeout / connection trouble — retry with exponential backoff
//!   up to the budget, then fall back.
//! - anything else — fall back without retry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_stream::stream;
use futures::StreamExt;
use futures::stream::BoxStream;
use rand::Rng;
use tracing::{debug, info, warn};

use genfall_core::config::{GenfallConfig, RotationGranularity};
use genfall_core::error::{CallError, ErrorClass, GenfallError, Result};
use genfall_core::health::HealthMonitor;
use genfall_core::rate_limit::RateLimitTracker;
use genfall_core::rotation::CredentialRotator;
use genfall_core::types::{
    AttemptRecord, CallResponse, FallbackStats, GenerationConfig, GenerationResult,
};

use crate::generator::TextGenerator;

/// Consumer-facing stream: text fragments, then possibly one terminal
/// error.
pub type GenerationStream = BoxStream<'static, Result<String>>;

/// Client that orchestrates credential rotation, retry, and model
/// fallback over an injected [`TextGenerator`].
pub struct FallbackClient {
    config: GenfallConfig,
    generation: GenerationConfig,
    generator: Arc<dyn TextGenerator>,
    rotator: CredentialRotator,
    rate_limits: Option<RateLimitTracker>,
    health: Option<HealthMonitor>,
}

impl FallbackClient {
    /// Create a client from a validated config and a call collaborator.
    ///
    /// # Errors
    /// Returns `GenfallError::Config` if the config has no credentials or
    /// an empty fallback order.
    pub fn new(config: GenfallConfig, generator: Arc<dyn TextGenerator>) -> Result<Self> {
        config.validate()?;

        let rotator = CredentialRotator::new(config.credentials.clone(), config.rotation_strategy)?;
        if config.credentials.len() > 1 {
            info!(count = config.credentials.len(), "multi-credential mode");
        } else {
            info!("single-credential mode");
        }

        let (rate_limits, health) = if config.enable_monitoring {
            info!("monitoring enabled");
            (
                Some(RateLimitTracker::new(
                    config.rate_limits.clone(),
                    config.default_rpm,
                )),
                Some(HealthMonitor::new()),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            config,
            generation: GenerationConfig::default(),
            generator,
            rotator,
            rate_limits,
            health,
        })
    }

    /// Override the generation parameters passed to the collaborator.
    #[must_use]
    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Generate a completion for `prompt`.
    ///
    /// Tries `model` if given, otherwise walks the configured fallback
    /// order. Returns on the first success; no further models are tried.
    ///
    /// # Errors
    /// - `GenfallError::Auth` on 401/403 — immediately, with the attempt
    ///   history so far.
    /// - `GenfallError::AllModelsFailed` when every model is exhausted,
    ///   with one attempt record per failed model in order.
    pub async fn generate(&self, prompt: &str, model: Option<&str>) -> Result<GenerationResult> {
        let models = self.models_to_try(model);
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut selection = self.rotator.select();

        for (i, model) in models.iter().enumerate() {
            if i > 0 && self.config.rotation_granularity == RotationGranularity::PerModelAttempt {
                selection = self.rotator.select();
            }
            debug!(model = %model, credential = selection.index, "attempting model");

            check_rate_limit(
                self.rate_limits.as_ref(),
                self.config.enforce_rate_limit,
                model,
            )
            .await;
            if let Some(tracker) = &self.rate_limits {
                tracker.record_request(model);
            }

            let start = Instant::now();
            match self
                .invoke_with_retry(&selection.secret, model, prompt)
                .await
            {
                Ok(response) => {
                    let latency_ms = elapsed_ms(start);
                    if let Some(health) = &self.health {
                        health.record_request(model, latency_ms, true, None);
                    }
                    self.rotator.record_success(selection.index);
                    info!(model = %model, latency_ms = latency_ms as u64, "generation succeeded");
                    return Ok(GenerationResult {
                        text: response.text.clone(),
                        model: model.clone(),
                        raw: response,
                    });
                }
                Err(err) => {
                    let latency_ms = elapsed_ms(start);
                    if let Some(health) = &self.health {
                        health.record_request(model, latency_ms, false, Some(&err.message));
                    }
                    warn!(model = %model, error = %err, "model attempt failed");
                    attempts.push(AttemptRecord::from_call_error(model.clone(), &err));

                    if err.class() == ErrorClass::Auth {
                        self.rotator.record_failure(selection.index);
                        return Err(GenfallError::Auth {
                            status_code: err.status_code.unwrap_or(401),
                            model: model.clone(),
                            attempts,
                        });
                    }
                }
            }
        }

        self.rotator.record_failure(selection.index);
        Err(GenfallError::AllModelsFailed { attempts })
    }

    /// Generate a streaming completion for `prompt`.
    ///
    /// Same fallback loop as [`generate`](Self::generate) but each model is
    /// attempted once, with no inner retry. Success is having produced at
    /// least one fragment. A model that closes its stream without output
    /// counts as a soft failure and the loop moves on. An error after
    /// fragments have been yielded surfaces as
    /// [`GenfallError::StreamInterrupted`] — falling back at that point
    /// would duplicate text the consumer already saw.
    #[must_use]
    pub fn generate_stream(&self, prompt: &str, model: Option<&str>) -> GenerationStream {
        let models = self.models_to_try(model);
        let prompt = prompt.to_string();
        let generator = Arc::clone(&self.generator);
        let rotator = self.rotator.clone();
        let rate_limits = self.rate_limits.clone();
        let health = self.health.clone();
        let generation = self.generation.clone();
        let granularity = self.config.rotation_granularity;
        let enforce = self.config.enforce_rate_limit;

        Box::pin(stream! {
            let mut attempts: Vec<AttemptRecord> = Vec::new();
            let mut selection = rotator.select();

            for (i, model) in models.iter().enumerate() {
                if i > 0 && granularity == RotationGranularity::PerModelAttempt {
                    selection = rotator.select();
                }
                debug!(model = %model, "attempting stream");
                check_rate_limit(rate_limits.as_ref(), enforce, model).await;
                if let Some(tracker) = &rate_limits {
                    tracker.record_request(model);
                }

                let start = Instant::now();
                let opened = generator
                    .invoke_stream(&selection.secret, model, &prompt, &generation)
                    .await;

                let mut fragments: u64 = 0;
                let failure: Option<CallError> = match opened {
                    Ok(mut text) => {
                        let mut failure = None;
                        while let Some(item) = text.next().await {
                            match item {
                                Ok(fragment) => {
                                    fragments += 1;
                                    yield Ok(fragment);
                                }
                                Err(err) => {
                                    failure = Some(err);
                                    break;
                                }
                            }
                        }
                        failure
                    }
                    Err(err) => Some(err),
                };

                let latency_ms = elapsed_ms(start);
                match failure {
                    None if fragments > 0 => {
                        if let Some(health) = &health {
                            health.record_request(model, latency_ms, true, None);
                        }
                        rotator.record_success(selection.index);
                        info!(model = %model, fragments, "stream succeeded");
                        return;
                    }
                    None => {
                        // Closed cleanly with nothing produced: soft failure.
                        if let Some(health) = &health {
                            health.record_request(model, latency_ms, false, Some("empty stream"));
                        }
                        warn!(model = %model, "stream produced no fragments");
                        attempts.push(AttemptRecord::now(
                            model.clone(),
                            "stream produced no fragments",
                            None,
                        ));
                    }
                    Some(err) if fragments > 0 => {
                        if let Some(health) = &health {
                            health.record_request(model, latency_ms, false, Some(&err.message));
                        }
                        rotator.record_failure(selection.index);
                        warn!(model = %model, error = %err, "stream interrupted mid-flight");
                        yield Err(GenfallError::StreamInterrupted {
                            model: model.clone(),
                            status_code: err.status_code,
                            message: err.message,
                        });
                        return;
                    }
                    Some(err) => {
                        if let Some(health) = &health {
                            health.record_request(model, latency_ms, false, Some(&err.message));
                        }
                        warn!(model = %model, error = %err, "stream attempt failed");
                        attempts.push(AttemptRecord::from_call_error(model.clone(), &err));

                        if err.class() == ErrorClass::Auth {
                            rotator.record_failure(selection.index);
                            yield Err(GenfallError::Auth {
                                status_code: err.status_code.unwrap_or(401),
                                model: model.clone(),
                                attempts,
                            });
                            return;
                        }
                    }
                }
            }

            rotator.record_failure(selection.index);
            yield Err(GenfallError::AllModelsFailed { attempts });
        })
    }

    /// Read-only diagnostic snapshot across all trackers.
    ///
    /// Safe to call while generation calls are in flight; the view is
    /// eventually consistent, not transactional.
    #[must_use]
    pub fn fallback_stats(&self) -> FallbackStats {
        let rate_limits = self.rate_limits.as_ref().map_or_else(Vec::new, |tracker| {
            self.config
                .fallback_order
                .iter()
                .map(|model| tracker.status(model))
                .collect()
        });
        let health = self.health.as_ref().map_or_else(Vec::new, |monitor| {
            self.config
                .fallback_order
                .iter()
                .map(|model| monitor.health(model))
                .collect()
        });
        FallbackStats {
            credentials: self.rotator.snapshot(),
            rate_limits,
            health,
        }
    }

    fn models_to_try(&self, model: Option<&str>) -> Vec<String> {
        model.map_or_else(
            || self.config.fallback_order.clone(),
            |m| vec![m.to_string()],
        )
    }

    /// Inner retry loop for one model: transient failures retry with
    /// exponential backoff up to the budget; everything else surfaces to
    /// the fallback loop immediately.
    async fn invoke_with_retry(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
    ) -> std::result::Result<CallResponse, CallError> {
        let mut retries = 0u32;
        loop {
            let err = match self
                .generator
                .invoke(credential, model, prompt, &self.generation)
                .await
            {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            match err.class() {
                ErrorClass::Transient if retries < self.config.max_retries => {
                    retries += 1;
                    let delay = self.backoff_delay(retries);
                    info!(
                        model = %model,
                        retry = retries,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                // 429 is resolved by moving to another model, not by
                // waiting here. Auth and unclassified errors are not
                // retryable either.
                _ => return Err(err),
            }
        }
    }

    /// Delay before retry `retry` (1-based): `base * 2^(retry-1)`, with
    /// optional jitter scaling by a random factor in [0.5, 1.5).
    fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let mut ms = self
            .config
            .base_retry_delay_ms
            .saturating_mul(1u64 << exponent);
        if self.config.jitter {
            let factor = rand::thread_rng().gen_range(0.5..1.5);
            ms = (ms as f64 * factor) as u64;
        }
        Duration::from_millis(ms)
    }
}

/// Quota prediction before an attempt. Advisory unless `enforce` is set,
/// in which case the recommended wait is slept cooperatively. Shared by
/// the single-shot and streaming fallback loops.
async fn check_rate_limit(tracker: Option<&RateLimitTracker>, enforce: bool, model: &str) {
    let Some(tracker) = tracker else {
        return;
    };
    if !tracker.would_exceed_limit(model) {
        return;
    }
    let wait = tracker.recommended_wait(model);
    if enforce && !wait.is_zero() {
        warn!(model = %model, wait_ms = wait.as_millis() as u64, "over rate limit, throttling");
        tokio::time::sleep(wait).await;
    } else {
        warn!(
            model = %model,
            recommended_wait_ms = wait.as_millis() as u64,
            "would exceed rate limit"
        );
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::TextStream;
    use async_trait::async_trait;

    struct NeverGenerator;

    #[async_trait]
    impl TextGenerator for NeverGenerator {
        async fn invoke(
            &self,
            _credential: &str,
            _model: &str,
            _prompt: &str,
            _config: &GenerationConfig,
        ) -> std::result::Result<CallResponse, CallError> {
            Err(CallError::new(None, "not under test"))
        }

        async fn invoke_stream(
            &self,
            _credential: &str,
            _model: &str,
            _prompt: &str,
            _config: &GenerationConfig,
        ) -> std::result::Result<TextStream, CallError> {
            Err(CallError::new(None, "not under test"))
        }
    }

    fn client(mutate: impl FnOnce(&mut GenfallConfig)) -> FallbackClient {
        let mut config = GenfallConfig {
            credentials: vec!["k1".into()],
            ..GenfallConfig::default()
        };
        mutate(&mut config);
        FallbackClient::new(config, Arc::new(NeverGenerator)).expect("valid config")
    }

    #[test]
    fn construction_without_credentials_fails() {
        let config = GenfallConfig::default();
        let result = FallbackClient::new(config, Arc::new(NeverGenerator));
        assert!(matches!(result, Err(GenfallError::Config(_))));
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let client = client(|c| c.base_retry_delay_ms = 100);
        assert_eq!(client.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(client.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(client.backoff_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn backoff_exponent_is_capped() {
        let client = client(|c| c.base_retry_delay_ms = 1);
        // Exponent clamps at 16, so enormous retry counts stay finite.
        assert_eq!(client.backoff_delay(40), Duration::from_millis(1 << 16));
    }

    #[test]
    fn jitter_stays_within_half_to_one_and_a_half() {
        let client = client(|c| {
            c.base_retry_delay_ms = 1000;
            c.jitter = true;
        });
        for _ in 0..100 {
            let delay = client.backoff_delay(1);
            assert!(delay >= Duration::from_millis(500), "delay {delay:?}");
            assert!(delay < Duration::from_millis(1500), "delay {delay:?}");
        }
    }

    #[test]
    fn explicit_model_overrides_fallback_order() {
        let client = client(|c| c.fallback_order = vec!["a".into(), "b".into()]);
        assert_eq!(client.models_to_try(Some("c")), vec!["c".to_string()]);
        assert_eq!(
            client.models_to_try(None),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn stats_empty_when_monitoring_disabled() {
        let client = client(|c| c.enable_monitoring = false);
        let stats = client.fallback_stats();
        assert!(stats.rate_limits.is_empty());
        assert!(stats.health.is_empty());
        // Credential stats are always available.
        assert_eq!(stats.credentials.len(), 1);
    }
}
