//! Anthropic's Messages API: a `system` field separate from the turn
//! array, and an SSE event sequence keyed by `type` rather than a single
//! `delta.content` shape.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use skillrunner_common::{CompletionRequest, CompletionResponse, EngineError, FinishReason};
use tokio_util::sync::CancellationToken;

use crate::http::{anthropic_rate_limit, classified_http_error, send_with_retry, RetryPolicy};
use crate::provider::{ChunkSink, HealthStatus, Provider, ProviderInfo};
use crate::sse::{SseDecoder, SseEvent};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
    stop_reason: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicStreamEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: AnthropicDelta },
    #[serde(rename = "message_delta")]
    MessageDelta {
        delta: AnthropicMessageDelta,
        usage: AnthropicUsage,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicDelta {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicMessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

fn map_stop_reason(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("end_turn") => FinishReason::EndTurn,
        Some("max_tokens") => FinishReason::MaxTokens,
        Some("stop_sequence") => FinishReason::StopSequence,
        Some("tool_use") => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
    models: Vec<String>,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".to_string(),
            client: reqwest::Client::new(),
            retry: RetryPolicy::default(),
            models: vec![
                "claude-opus-4".to_string(),
                "claude-sonnet-4".to_string(),
                "claude-haiku-4".to_string(),
            ],
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn payload(req: &CompletionRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<AnthropicMessage> = req
            .messages
            .iter()
            .map(|m| AnthropicMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect();
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
        if let Some(system) = &req.system_prompt {
            body["system"] = json!(system);
        }
        body
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "anthropic".to_string(),
            description: "Anthropic Messages API".to_string(),
            base_url: self.base_url.clone(),
            is_local: false,
        }
    }

    fn list_models(&self) -> Vec<String> {
        self.models.clone()
    }

    async fn is_available(&self, model_id: &str) -> bool {
        self.supports_model(model_id) && !self.api_key.is_empty()
    }

    async fn complete(
        &self,
        req: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, EngineError> {
        let started = Instant::now();
        let body = Self::payload(req, false);

        let resp = send_with_retry(&self.retry, cancel, "anthropic", || {
            self.client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
                .send()
        })
        .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(classified_http_error("anthropic", status, &text));
        }

        let rate_limit = anthropic_rate_limit(&resp);
        let parsed: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::provider("anthropic: malformed response").with_cause(e))?;

        let content = parsed
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            finish_reason: map_stop_reason(parsed.stop_reason.as_deref()),
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
        let body = Self::payload(req, true);

        let resp = send_with_retry(&self.retry, cancel, "anthropic", || {
            self.client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
                .send()
        })
        .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(classified_http_error("anthropic", status, &text));
        }

        let rate_limit = anthropic_rate_limit(&resp);
        let mut decoder = SseDecoder::new();
        let mut content = String::new();
        let mut output_tokens = 0u32;
        let mut finish_reason = FinishReason::Stop;
        let mut byte_stream = resp.bytes_stream();

        'outer: loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::cancelled("anthropic: stream cancelled")),
                next = byte_stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| EngineError::provider("anthropic: stream error").with_cause(e))?;
            for event in decoder.push(&chunk) {
                let payload = match event {
                    SseEvent::Done => break 'outer,
                    SseEvent::Data(payload) => payload,
                };
                let parsed: AnthropicStreamEvent = serde_json::from_str(&payload).map_err(|e| {
                    EngineError::provider("anthropic: malformed stream event").with_cause(e)
                })?;
                match parsed {
                    AnthropicStreamEvent::ContentBlockDelta { delta } => {
                        if !delta.text.is_empty() {
                            on_chunk(&delta.text)?;
                            content.push_str(&delta.text);
                        }
                    }
                    AnthropicStreamEvent::MessageDelta { delta, usage } => {
                        output_tokens = usage.output_tokens;
                        finish_reason = map_stop_reason(delta.stop_reason.as_deref());
                    }
                    AnthropicStreamEvent::Other => {}
                }
            }
        }

        Ok(CompletionResponse {
            content,
            input_tokens: 0,
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
                "anthropic unreachable or missing api key".to_string()
            },
            latency: start.elapsed(),
            last_checked: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillrunner_common::Message;

    #[test]
    fn payload_sets_top_level_system_field() {
        let req = CompletionRequest::new("claude-sonnet-4", vec![Message::user("hi")])
            .with_system_prompt("be terse")
            .with_max_tokens(100);
        let body = AnthropicProvider::payload(&req, false);
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn payload_omits_zero_max_tokens_and_temperature() {
        let req = CompletionRequest::new("claude-sonnet-4", vec![Message::user("hi")]);
        let body = AnthropicProvider::payload(&req, false);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn stop_reason_maps_known_values() {
        assert_eq!(map_stop_reason(Some("end_turn")), FinishReason::EndTurn);
        assert_eq!(map_stop_reason(Some("max_tokens")), FinishReason::MaxTokens);
        assert_eq!(
            map_stop_reason(Some("stop_sequence")),
            FinishReason::StopSequence
        );
    }

    #[tokio::test]
    async fn unavailable_without_api_key() {
        let provider = AnthropicProvider::new("");
        assert!(!provider.is_available("claude-sonnet-4").await);
    }

    #[tokio::test]
    async fn unavailable_for_unknown_model() {
        let provider = AnthropicProvider::new("test-key");
        assert!(!provider.is_available("gpt-4o").await);
    }
}
