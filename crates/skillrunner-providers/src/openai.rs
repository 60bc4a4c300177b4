//! OpenAI's chat-completions wire format, shared by [`OpenAiProvider`] and
//! (via [`ChatCompletionsClient`]) the Groq adapter, which speaks the same
//! dialect against a different base URL.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use skillrunner_common::{CompletionRequest, CompletionResponse, EngineError, FinishReason};
use tokio_util::sync::CancellationToken;

use crate::http::{classified_http_error, openai_style_rate_limit, send_with_retry, RetryPolicy};
use crate::provider::{ChunkSink, HealthStatus, Provider, ProviderInfo};
use crate::sse::{SseDecoder, SseEvent};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChatChunkChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChunkChoice {
    delta: ChatChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

fn map_finish_reason(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some("tool_calls") => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

/// Client for any vendor speaking the OpenAI chat-completions dialect.
/// Holds the bits that differ per vendor (name, base URL, key, model list)
/// so the request/response handling lives exactly once.
pub(crate) struct ChatCompletionsClient {
    pub(crate) name: String,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) models: Vec<String>,
    pub(crate) client: reqwest::Client,
    pub(crate) retry: RetryPolicy,
}

impl ChatCompletionsClient {
    pub(crate) fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        models: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            models,
            client: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    fn payload(req: &CompletionRequest, stream: bool) -> serde_json::Value {
        let mut messages: Vec<ChatMessage> = Vec::with_capacity(req.messages.len() + 1);
        if let Some(system) = &req.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        for m in &req.messages {
            messages.push(ChatMessage {
                role: m.role.as_str(),
                content: &m.content,
            });
        }
        let mut body = json!({
            "model": req.model_id,
            "messages": messages,
            "stream": stream,
        });
        if req.max_tokens != 0 {
            body["max_tokens"] = json!(req.max_tokens);
        }
        if req.temperature != 0.0 {
            body["temperature"] = json!(req.temperature);
        }
        body
    }

    async fn is_available(&self, model_id: &str) -> bool {
        if !self.models.iter().any(|m| m == model_id) || self.api_key.is_empty() {
            return false;
        }
        self.client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn complete(
        &self,
        req: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, EngineError> {
        let started = Instant::now();
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::payload(req, false);

        let resp = send_with_retry(&self.retry, cancel, &self.name, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
        })
        .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(classified_http_error(&self.name, status, &text));
        }

        let rate_limit = openai_style_rate_limit(&resp);
        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::provider(format!("{}: malformed response", self.name)).with_cause(e))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::provider(format!("{}: empty choices", self.name)))?;

        let usage = parsed.usage.unwrap_or(ChatUsage {
            prompt_tokens: 0,
            completion_tokens: 0,
        });

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            finish_reason: map_finish_reason(choice.finish_reason.as_deref()),
            model_used: parsed.model,
            duration: started.elapsed(),
            rate_limit,
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
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::payload(req, true);

        let resp = send_with_retry(&self.retry, cancel, &self.name, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
        })
        .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(classified_http_error(&self.name, status, &text));
        }

        let rate_limit = openai_style_rate_limit(&resp);
        let mut decoder = SseDecoder::new();
        let mut content = String::new();
        let mut finish_reason = FinishReason::Stop;
        let mut output_tokens = 0u32;
        let mut input_tokens = 0u32;
        let mut byte_stream = resp.bytes_stream();

        'outer: loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::cancelled(format!("{}: stream cancelled", self.name))),
                next = byte_stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk =
                chunk.map_err(|e| EngineError::provider(format!("{}: stream error", self.name)).with_cause(e))?;
            for event in decoder.push(&chunk) {
                let payload = match event {
                    SseEvent::Done => break 'outer,
                    SseEvent::Data(payload) => payload,
                };
                let parsed: ChatCompletionChunk = serde_json::from_str(&payload).map_err(|e| {
                    EngineError::provider(format!("{}: malformed stream chunk", self.name)).with_cause(e)
                })?;
                if let Some(usage) = parsed.usage {
                    input_tokens = usage.prompt_tokens;
                    output_tokens = usage.completion_tokens;
                }
                if let Some(choice) = parsed.choices.into_iter().next() {
                    if let Some(delta) = choice.delta.content {
                        if !delta.is_empty() {
                            on_chunk(&delta)?;
                            content.push_str(&delta);
                        }
                    }
                    if let Some(reason) = choice.finish_reason {
                        finish_reason = map_finish_reason(Some(&reason));
                    }
                }
            }
        }

        Ok(CompletionResponse {
            content,
            input_tokens,
            output_tokens,
            finish_reason,
            model_used: req.model_id.clone(),
            duration: started.elapsed(),
            rate_limit,
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
                format!("{} unreachable or model not served", self.name)
            },
            latency: start.elapsed(),
            last_checked: Utc::now(),
        }
    }
}

/// OpenAI proper: `https://api.openai.com/v1`.
pub struct OpenAiProvider {
    inner: ChatCompletionsClient,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            inner: ChatCompletionsClient::new(
                "openai",
                "https://api.openai.com/v1",
                api_key,
                vec![
                    "gpt-4o".to_string(),
                    "gpt-4o-mini".to_string(),
                    "gpt-4-turbo".to_string(),
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
impl Provider for OpenAiProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.inner.name.clone(),
            description: "OpenAI chat completions".to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use skillrunner_common::Message;

    #[test]
    fn payload_includes_system_prompt_first() {
        let req = CompletionRequest::new("gpt-4o", vec![Message::user("hi")])
            .with_system_prompt("be terse")
            .with_max_tokens(50)
            .with_temperature(0.2);
        let body = ChatCompletionsClient::payload(&req, false);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
    }

    #[test]
    fn payload_omits_zero_max_tokens_and_temperature() {
        let req = CompletionRequest::new("gpt-4o", vec![Message::user("hi")]);
        let body = ChatCompletionsClient::payload(&req, false);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn finish_reason_maps_known_values() {
        assert_eq!(map_finish_reason(Some("stop")), FinishReason::Stop);
        assert_eq!(map_finish_reason(Some("length")), FinishReason::Length);
        assert_eq!(
            map_finish_reason(Some("tool_calls")),
            FinishReason::ToolCalls
        );
        assert_eq!(map_finish_reason(None), FinishReason::Stop);
    }

    #[tokio::test]
    async fn unavailable_without_api_key() {
        let provider = OpenAiProvider::new("");
        assert!(!provider.is_available("gpt-4o").await);
    }
}
