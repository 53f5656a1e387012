//! Default HTTP collaborator for OpenAI-compatible APIs.
//!
//! Owns transport, serialization, and the per-request timeout — the
//! orchestrator above it only ever sees [`CallResponse`] or [`CallError`].
//! Any OpenAI-compatible `/v1/chat/completions` endpoint works; streaming
//! uses the standard `data:` SSE framing.

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use genfall_core::error::CallError;
use genfall_core::types::{CallResponse, GenerationConfig, UsageMetadata};

use crate::generator::{TextGenerator, TextStream};

/// [`TextGenerator`] over an OpenAI-compatible chat-completions API.
pub struct HttpTextGenerator {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTextGenerator {
    /// Create a generator against `base_url` (no trailing slash) with a
    /// per-request timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }

    fn url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn body(model: &str, prompt: &str, config: &GenerationConfig, stream: bool) -> serde_json::Value {
        let mut body = json!({
            "model": model,
            "messages": [
                { "role": "user", "content": prompt },
            ],
            "temperature": config.temperature,
            "stream": stream,
        });
        if let Some(max) = config.max_output_tokens {
            body["max_tokens"] = json!(max);
        }
        if let Some(top_p) = config.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(top_k) = config.top_k {
            body["top_k"] = json!(top_k);
        }
        body
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn invoke(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<CallResponse, CallError> {
        let response = self
            .http
            .post(self.url())
            .header("Authorization", format!("Bearer {credential}"))
            .json(&Self::body(model, prompt, config, false))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(call_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CallError::new(Some(status.as_u16()), text));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CallError::new(None, format!("invalid response body: {e}")))?;

        let text = raw["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        let finish_reason = raw["choices"][0]["finish_reason"]
            .as_str()
            .map(ToString::to_string);
        let usage = raw.get("usage").map(|u| UsageMetadata {
            prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: u["total_tokens"].as_u64().unwrap_or(0) as u32,
        });

        Ok(CallResponse {
            text,
            usage,
            finish_reason,
            raw,
        })
    }

    async fn invoke_stream(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<TextStream, CallError> {
        let response = self
            .http
            .post(self.url())
            .header("Authorization", format!("Bearer {credential}"))
            .json(&Self::body(model, prompt, config, true))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(call_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CallError::new(Some(status.as_u16()), text));
        }

        let mut bytes = Box::pin(response.bytes_stream());
        let stream = stream! {
            let mut buffer = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(call_error(e));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // SSE events are newline-delimited; anything after the
                // last newline is an incomplete line kept for next chunk.
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        return;
                    }
                    match serde_json::from_str::<serde_json::Value>(data) {
                        Ok(event) => {
                            if let Some(fragment) =
                                event["choices"][0]["delta"]["content"].as_str()
                            {
                                if !fragment.is_empty() {
                                    yield Ok(fragment.to_string());
                                }
                            }
                        }
                        Err(e) => {
                            debug!(error = %e, "skipping unparseable stream event");
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Collapse a transport error into the collaborator error shape. The
/// message keeps the timeout/connection wording the classifier keys on.
fn call_error(e: reqwest::Error) -> CallError {
    let status = e.status().map(|s| s.as_u16());
    if e.is_timeout() {
        CallError::new(status, format!("request timeout: {e}"))
    } else if e.is_connect() {
        CallError::new(status, format!("connection failed: {e}"))
    } else {
        CallError::new(status, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_includes_optional_fields_only_when_set() {
        let config = GenerationConfig::default().with_max_output_tokens(128);
        let body = HttpTextGenerator::body("model-a", "hi", &config, false);
        assert_eq!(body["model"], "model-a");
        assert_eq!(body["max_tokens"], 128);
        assert!(body.get("top_p").is_none());
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn url_targets_chat_completions() {
        let generator = HttpTextGenerator::new("https://example.test", Duration::from_secs(30));
        assert_eq!(generator.url(), "https://example.test/v1/chat/completions");
    }
}
