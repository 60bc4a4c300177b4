//! The uniform contract every vendor adapter implements.
//!
//! Modeled on the `LLMProvider` trait from the reference `km-tools`
//! provider module: one trait, capability queries plus the two request
//! shapes (`complete`/`stream`), no per-vendor leakage into the engine.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skillrunner_common::{CompletionRequest, CompletionResponse, EngineError};
use tokio_util::sync::CancellationToken;

/// Static identity of a provider, independent of any particular model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub description: String,
    pub base_url: String,
    pub is_local: bool,
}

/// Result of a single health probe.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: String,
    pub latency: Duration,
    pub last_checked: DateTime<Utc>,
}

/// Callback invoked once per streamed chunk of content. Returning `Err`
/// aborts the stream; the engine uses this to cut a run short when a
/// budget is exceeded mid-stream.
pub type ChunkSink<'a> = dyn FnMut(&str) -> Result<(), EngineError> + Send + 'a;

/// A strategy for turning a [`CompletionRequest`] into a [`CompletionResponse`],
/// streaming or not. Every adapter in this crate (`anthropic`, `openai`,
/// `groq`, `ollama`) implements this and nothing else — the registry and
/// the engine never see vendor-specific types.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Static identity, never changes for the lifetime of the provider.
    fn info(&self) -> ProviderInfo;

    /// Model ids this provider claims to serve. Used for routing and for `supports_model`'s default implementation.
    fn list_models(&self) -> Vec<String>;

    fn supports_model(&self, model_id: &str) -> bool {
        self.list_models().iter().any(|m| m == model_id)
    }

    /// Cheap reachability probe. Does not imply a successful completion —
    /// only that the provider is configured and its endpoint responds.
    async fn is_available(&self, model_id: &str) -> bool;

    /// A single non-streaming completion call. `cancel` is threaded through
    /// to every suspension point inside the call (retry backoff sleeps,
    /// the request itself) so the caller's cancellation aborts the wait
    /// immediately rather than only at the call's outer boundary.
    async fn complete(
        &self,
        req: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, EngineError>;

    /// A streaming completion call. `on_chunk` is invoked once per piece of
    /// assistant content as it arrives; the returned [`CompletionResponse`]
    /// carries the same aggregate fields as `complete` would have. `cancel`
    /// is honoured at every suspension point, including the SSE/NDJSON
    /// read loop.
    async fn stream(
        &self,
        req: &CompletionRequest,
        on_chunk: &mut ChunkSink<'_>,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, EngineError>;

    /// A full health probe: latency-timed, does not require a model to
    /// actually be invoked if `is_available` already tells us enough.
    async fn health_check(&self, model_id: &str) -> HealthStatus;
}
