//! The call collaborator boundary.
//!
//! The orchestrator never talks to the network itself; it invokes a
//! [`TextGenerator`], which owns transport, serialization, and its own
//! request timeout. Tests substitute scripted fakes behind the same trait.

use async_trait::async_trait;
use futures::stream::BoxStream;

use genfall_core::error::CallError;
use genfall_core::types::{CallResponse, GenerationConfig};

/// A lazy, finite, non-restartable sequence of text fragments from one
/// streaming invocation.
pub type TextStream = BoxStream<'static, Result<String, CallError>>;

/// One invocation against the remote generative-text service.
///
/// Implementations report failures as [`CallError`] with a status code
/// when one is available; classification happens in the orchestrator, not
/// here.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a single completion.
    async fn invoke(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<CallResponse, CallError>;

    /// Open a streaming completion.
    ///
    /// An `Err` here means the stream could not be opened; errors after
    /// fragments have flowed arrive through the stream itself.
    async fn invoke_stream(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<TextStream, CallError>;
}
