//! # genfall-client — fallback orchestration for generative-text calls
//!
//! Composes the `genfall-core` trackers into one decision procedure:
//! given a prompt, pick a model and a credential, invoke the remote
//! service, retry transient failures with exponential backoff, fall back
//! across the configured model order on persistent failure, and keep
//! per-credential and per-model statistics current for future routing.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use genfall_client::{FallbackClient, HttpTextGenerator};
//! use genfall_core::GenfallConfig;
//!
//! # async fn demo() -> genfall_core::Result<()> {
//! let config = GenfallConfig {
//!     credentials: vec!["sk-one".into(), "sk-two".into()],
//!     fallback_order: vec!["gpt-4o-mini".into(), "gpt-4o".into()],
//!     ..GenfallConfig::default()
//! };
//! let generator = HttpTextGenerator::new(config.base_url.clone(), Duration::from_secs(30));
//! let client = FallbackClient::new(config, Arc::new(generator))?;
//!
//! let result = client.generate("Write a haiku about failover.", None).await?;
//! println!("{} (via {})", result.text, result.model);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod generator;
pub mod http;

pub use client::{FallbackClient, GenerationStream};
pub use generator::{TextGenerator, TextStream};
pub use http::HttpTextGenerator;
