//! Local Ollama daemon adapter. No API key, newline-delimited JSON
//! streaming instead of SSE, and its own `/api/chat` request shape.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use skillrunner_common::{CompletionRequest, CompletionResponse, EngineError, FinishReason};
use tokio_util::sync::CancellationToken;

use crate::http::{classified_http_error, send_with_retry, RetryPolicy};
use crate::provider::{ChunkSink, HealthStatus, Provider, ProviderInfo};

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaTagEntry>,
}

#[derive(Debug, Deserialize)]
struct OllamaTagEntry {
    name: String,
}

pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    fn options(req: &CompletionRequest) -> serde_json::Value {
        let mut options = json!({});
        if req.temperature != 0.0 {
            options["temperature"] = json!(req.temperature);
        }
        if req.max_tokens != 0 {
            options["num_predict"] = json!(req.max_tokens);
        }
        options
    }

    fn messages(req: &CompletionRequest) -> Vec<OllamaMessage<'_>> {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if let Some(system) = &req.system_prompt {
            messages.push(OllamaMessage {
                role: "system",
                content: system,
            });
        }
        for m in &req.messages {
            messages.push(OllamaMessage {
                role: m.role.as_str(),
                content: &m.content,
            });
        }
        messages
    }

    async fn tags(&self) -> Option<Vec<String>> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let parsed: OllamaTagsResponse = resp.json().await.ok()?;
        Some(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "ollama".to_string(),
            description: "Locally hosted models served by an Ollama daemon".to_string(),
            base_url: self.base_url.clone(),
            is_local: true,
        }
    }

    fn list_models(&self) -> Vec<String> {
        Vec::new()
    }

    fn supports_model(&self, _model_id: &str) -> bool {
        // The local catalogue is runtime-discovered via `/api/tags`, not
        // fixed at construction time like the hosted vendors.
        true
    }

    async fn is_available(&self, model_id: &str) -> bool {
        match self.tags().await {
            Some(models) => models.iter().any(|m| m == model_id),
            None => false,
        }
    }

    async fn complete(
        &self,
        req: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, EngineError> {
        let started = Instant::now();
        let body = json!({
            "model": req.model_id,
            "messages": Self::messages(req),
            "stream": false,
            "options": Self::options(req),
        });

        let resp = send_with_retry(&self.retry, cancel, "ollama", || {
            self.client
                .post(format!("{}/api/chat", self.base_url))
                .json(&body)
                .send()
        })
        .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(classified_http_error("ollama", status, &text));
        }

        let parsed: OllamaChatResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::provider("ollama: malformed response").with_cause(e))?;

        Ok(CompletionResponse {
            content: parsed.message.content,
            input_tokens: parsed.prompt_eval_count,
            output_tokens: parsed.eval_count,
            finish_reason: FinishReason::Stop,
            model_used: req.model_id.clone(),
            duration: started.elapsed(),
            // The local daemon has no concept of a request quota.
            rate_limit: None,
        })
    }

    async fn stream(
        &self,
        req: &CompletionRequest,
        on_chunk: &mut ChunkSink<'_>,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, EngineError> {
        use futures_util::StreamExt;

        let started = Instant::now();
        let body = json!({
            "model": req.model_id,
            "messages": Self::messages(req),
            "stream": true,
            "options": Self::options(req),
        });

        let resp = send_with_retry(&self.retry, cancel, "ollama", || {
            self.client
                .post(format!("{}/api/chat", self.base_url))
                .json(&body)
                .send()
        })
        .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(classified_http_error("ollama", status, &text));
        }

        let mut content = String::new();
        let mut input_tokens = 0u32;
        let mut output_tokens = 0u32;
        let mut line_buf = String::new();
        let mut byte_stream = resp.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::cancelled("ollama: stream cancelled")),
                next = byte_stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| EngineError::provider("ollama: stream error").with_cause(e))?;
            line_buf.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = line_buf.find('\n') {
                let line = line_buf[..pos].to_string();
                line_buf.drain(..=pos);
                if line.trim().is_empty() {
                    continue;
                }
                let parsed: OllamaChatResponse = serde_json::from_str(&line)
                    .map_err(|e| EngineError::provider("ollama: malformed stream line").with_cause(e))?;
                if !parsed.message.content.is_empty() {
                    on_chunk(&parsed.message.content)?;
                    content.push_str(&parsed.message.content);
                }
                if parsed.done {
                    input_tokens = parsed.prompt_eval_count;
                    output_tokens = parsed.eval_count;
                }
            }
        }

        Ok(CompletionResponse {
            content,
            input_tokens,
            output_tokens,
            finish_reason: FinishReason::Stop,
            model_used: req.model_id.clone(),
            duration: started.elapsed(),
            rate_limit: None,
        })
    }

    async fn health_check(&self, model_id: &str) -> HealthStatus {
        let start = Instant::now();
        let healthy = self.is_available(model_id).await;
        HealthStatus {
            healthy,
            message: if healthy {
                "reachable".to_string()
            } else {
                "ollama daemon unreachable or model not pulled".to_string()
            },
            latency: start.elapsed(),
            last_checked: Utc::now(),
        }
    }
}
