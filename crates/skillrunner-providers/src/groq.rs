//! Groq: same chat-completions dialect as OpenAI, different host and
//! model catalogue.

use async_trait::async_trait;
use skillrunner_common::{CompletionRequest, CompletionResponse, EngineError};
use tokio_util::sync::CancellationToken;

use crate::openai::ChatCompletionsClient;
use crate::provider::{ChunkSink, HealthStatus, Provider, ProviderInfo};

pub struct GroqProvider {
    inner: ChatCompletionsClient,
}

impl GroqProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            inner: ChatCompletionsClient::new(
                "groq",
                "https://api.groq.com/openai/v1",
                api_key,
                vec![
                    "llama-3.3-70b-versatile".to_string(),
                    "llama-3.1-8b-instant".to_string(),
                    "mixtral-8x7b-32768".to_string(),
                ],
            ),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.inner.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Provider for GroqProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.inner.name.clone(),
            description: "Groq-hosted open-weight models over an OpenAI-compatible API".to_string(),
            base_url: self.inner.base_url.clone(),
            is_local: false,
        }
    }

    fn list_models(&self) -> Vec<String> {
        self.inner.models.clone()
    }

    async fn is_available(&self, model_id: &str) -> bool {
        self.inner.is_available(model_id).await
    }

    async fn complete(
        &self,
        req: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, EngineError> {
        self.inner.complete(req, cancel).await
    }

    async fn stream(
        &self,
        req: &CompletionRequest,
        on_chunk: &mut ChunkSink<'_>,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, EngineError> {
        self.inner.stream(req, on_chunk, cancel).await
    }

    async fn health_check(&self, model_id: &str) -> HealthStatus {
        self.inner.health_check(model_id).await
    }
}
