//! An in-process fake [`Provider`] for deterministic tests, the way the
//! teacher's `FactoryDb::new_in_memory` swaps a real SQLite file for an
//! in-memory one — here the network call itself is the thing swapped out.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use skillrunner_common::{CompletionRequest, CompletionResponse, EngineError, FinishReason};
use tokio_util::sync::CancellationToken;

use crate::provider::{ChunkSink, HealthStatus, Provider, ProviderInfo};

enum ScriptedCall {
    Complete(Result<CompletionResponse, EngineError>),
    Stream(Result<(Vec<String>, CompletionResponse), EngineError>),
}

/// A scriptable stand-in for a real vendor adapter. Queue up responses
/// with [`FakeProvider::queue_completion`]/[`queue_error`]/[`queue_stream`];
/// unscripted calls fall back to a fixed default so tests that don't care
/// about the response content don't need to script one.
pub struct FakeProvider {
    name: String,
    models: Vec<String>,
    is_local: bool,
    available: AtomicBool,
    script: Mutex<VecDeque<ScriptedCall>>,
    complete_calls: AtomicUsize,
    stream_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            models: vec!["fake-model".to_string()],
            is_local: false,
            available: AtomicBool::new(true),
            script: Mutex::new(VecDeque::new()),
            complete_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Mark this fake as a local/unmetered provider.
    pub fn local(mut self) -> Self {
        self.is_local = true;
        self
    }

    /// Shorthand for `with_available(false)`, used by registry tests that
    /// read more naturally as "this provider is unhealthy".
    pub fn unhealthy(self) -> Self {
        self.with_available(false)
    }

    pub fn queue_completion(&self, response: CompletionResponse) {
        self.script
            .lock()
            .expect("fake provider script poisoned")
            .push_back(ScriptedCall::Complete(Ok(response)));
    }

    pub fn queue_error(&self, error: EngineError) {
        self.script
            .lock()
            .expect("fake provider script poisoned")
            .push_back(ScriptedCall::Complete(Err(error)));
    }

    pub fn queue_stream(&self, chunks: Vec<String>, response: CompletionResponse) {
        self.script
            .lock()
            .expect("fake provider script poisoned")
            .push_back(ScriptedCall::Stream(Ok((chunks, response))));
    }

    pub fn queue_stream_error(&self, error: EngineError) {
        self.script
            .lock()
            .expect("fake provider script poisoned")
            .push_back(ScriptedCall::Stream(Err(error)));
    }

    pub fn complete_call_count(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn stream_call_count(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    fn default_response(model_id: &str) -> CompletionResponse {
        CompletionResponse {
            content: "fake-response".to_string(),
            input_tokens: 10,
            output_tokens: 5,
            finish_reason: FinishReason::Stop,
            model_used: model_id.to_string(),
            duration: Duration::from_millis(1),
            rate_limit: None,
        }
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.name.clone(),
            description: "in-process fake provider for tests".to_string(),
            base_url: "fake://local".to_string(),
            is_local: self.is_local,
        }
    }

    fn list_models(&self) -> Vec<String> {
        self.models.clone()
    }

    async fn is_available(&self, _model_id: &str) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn complete(
        &self,
        req: &CompletionRequest,
        _cancel: &CancellationToken,
    ) -> Result<CompletionResponse, EngineError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .script
            .lock()
            .expect("fake provider script poisoned")
            .pop_front();
        match scripted {
            Some(ScriptedCall::Complete(result)) => result,
            Some(ScriptedCall::Stream(_)) => Err(EngineError::internal(
                "fake provider: queued a stream response for a complete call",
            )),
            None => Ok(Self::default_response(&req.model_id)),
        }
    }

    async fn stream(
        &self,
        req: &CompletionRequest,
        on_chunk: &mut ChunkSink<'_>,
        _cancel: &CancellationToken,
    ) -> Result<CompletionResponse, EngineError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .script
            .lock()
            .expect("fake provider script poisoned")
            .pop_front();
        match scripted {
            Some(ScriptedCall::Stream(Ok((chunks, response)))) => {
                for chunk in &chunks {
                    on_chunk(chunk)?;
                }
                Ok(response)
            }
            Some(ScriptedCall::Stream(Err(error))) => Err(error),
            Some(ScriptedCall::Complete(_)) => Err(EngineError::internal(
                "fake provider: queued a complete response for a stream call",
            )),
            None => {
                let response = Self::default_response(&req.model_id);
                on_chunk(&response.content)?;
                Ok(response)
            }
        }
    }

    async fn health_check(&self, _model_id: &str) -> HealthStatus {
        HealthStatus {
            healthy: self.available.load(Ordering::SeqCst),
            message: "fake provider".to_string(),
            latency: Duration::from_millis(1),
            last_checked: Utc::now(),
        }
    }
}
