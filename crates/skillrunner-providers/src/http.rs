//! Retry/backoff envelope shared by every vendor adapter.
//!
//! Every adapter makes an HTTP call per request and needs the same
//! retry behavior on transient failure, so the policy lives here once
//! rather than being re-invented per adapter.

use std::time::Duration;

use skillrunner_common::{EngineError, ErrorKind, RateLimitInfo};
use tokio_util::sync::CancellationToken;

/// Exponential backoff with a cap, the way transient HTTP/5xx/429 failures
/// are conventionally retried. Connection-level failures and 5xx/429
/// responses are retryable; 4xx (other than 429) are not.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Map a non-2xx HTTP status to the error kind a caller should branch on.
/// 401/403 mean the credentials are wrong (`Configuration`), 404 means the
/// resource doesn't exist (`NotFound`), 400/422 mean the request itself was
/// bad (`Validation`), and everything else (429, 5xx, other 4xx) is a
/// transient or opaque provider failure.
pub fn classify_status(status: reqwest::StatusCode) -> ErrorKind {
    match status.as_u16() {
        401 | 403 => ErrorKind::Configuration,
        404 => ErrorKind::NotFound,
        400 | 422 => ErrorKind::Validation,
        _ => ErrorKind::Provider,
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        scaled.min(self.max_delay)
    }
}

/// Build the error a caller should return for a non-2xx response already
/// read to text, classifying the status into the right `ErrorKind` rather
/// than collapsing everything into `Provider`.
pub fn classified_http_error(
    provider_name: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> EngineError {
    EngineError::new(
        classify_status(status),
        format!("{provider_name}: http {status}: {body}"),
    )
}

/// Read a header as a `u64`, when present and numeric.
fn header_u64(resp: &reqwest::Response, name: &str) -> Option<u64> {
    resp.headers().get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Read a header as an RFC3339 timestamp, when present and parseable.
fn header_rfc3339(resp: &reqwest::Response, name: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let raw = resp.headers().get(name)?.to_str().ok()?;
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

/// Parse Anthropic's `anthropic-ratelimit-requests-*` headers, if present.
/// `None` if none of the three headers showed up on the response.
pub fn anthropic_rate_limit(resp: &reqwest::Response) -> Option<RateLimitInfo> {
    let limit = header_u64(resp, "anthropic-ratelimit-requests-limit");
    let remaining = header_u64(resp, "anthropic-ratelimit-requests-remaining");
    let reset_at = header_rfc3339(resp, "anthropic-ratelimit-requests-reset");
    if limit.is_none() && remaining.is_none() && reset_at.is_none() {
        return None;
    }
    Some(RateLimitInfo {
        limit,
        remaining,
        reset_at,
    })
}

/// Parse OpenAI/Groq's `x-ratelimit-*-requests` headers, if present. Neither
/// vendor sends an absolute reset timestamp (it's a relative duration like
/// `"6m0s"`), so `reset_at` is always `None` here.
pub fn openai_style_rate_limit(resp: &reqwest::Response) -> Option<RateLimitInfo> {
    let limit = header_u64(resp, "x-ratelimit-limit-requests");
    let remaining = header_u64(resp, "x-ratelimit-remaining-requests");
    if limit.is_none() && remaining.is_none() {
        return None;
    }
    Some(RateLimitInfo {
        limit,
        remaining,
        reset_at: None,
    })
}

/// Whether a transport-level failure is worth retrying.
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

/// Parse a `Retry-After: <seconds>` header, when present, into a wait
/// duration. Non-numeric (HTTP-date) values are ignored; none of
/// the vendors this repo targets send that form.
fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
    let raw = resp.headers().get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let secs: u64 = raw.trim().parse().ok()?;
    Some(Duration::from_secs(secs))
}

/// Run `attempt` up to `policy.max_attempts` times, backing off between
/// failures. `attempt` returns `Ok(response)` with the raw HTTP response so
/// the caller can still inspect a non-2xx body before deciding it was
/// fatal; this function only controls *whether to retry*, never response
/// interpretation.
pub async fn send_with_retry<F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    provider_name: &str,
    mut attempt: F,
) -> Result<reqwest::Response, EngineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut last_err: Option<EngineError> = None;

    for attempt_no in 0..policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(EngineError::cancelled(format!(
                "{provider_name}: request cancelled"
            )));
        }

        let mut wait = policy.delay_for(attempt_no);

        match attempt().await {
            Ok(resp) => {
                if resp.status().is_success() || !is_retryable_status(resp.status()) {
                    return Ok(resp);
                }
                if let Some(header_wait) = retry_after(&resp) {
                    wait = header_wait;
                }
                last_err = Some(EngineError::provider(format!(
                    "{provider_name}: http {}",
                    resp.status()
                )));
            }
            Err(err) => {
                last_err = Some(
                    EngineError::provider(format!("{provider_name}: transport error"))
                        .with_cause(err),
                );
            }
        }

        if attempt_no + 1 < policy.max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => {
                    return Err(EngineError::cancelled(format!(
                        "{provider_name}: request cancelled"
                    )));
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        EngineError::provider(format!("{provider_name}: exhausted retries with no response"))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
    }

    #[test]
    fn default_policy_matches_documented_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn classify_status_maps_kinds() {
        assert_eq!(classify_status(reqwest::StatusCode::UNAUTHORIZED), ErrorKind::Configuration);
        assert_eq!(classify_status(reqwest::StatusCode::FORBIDDEN), ErrorKind::Configuration);
        assert_eq!(classify_status(reqwest::StatusCode::NOT_FOUND), ErrorKind::NotFound);
        assert_eq!(classify_status(reqwest::StatusCode::BAD_REQUEST), ErrorKind::Validation);
        assert_eq!(classify_status(reqwest::StatusCode::UNPROCESSABLE_ENTITY), ErrorKind::Validation);
        assert_eq!(classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS), ErrorKind::Provider);
        assert_eq!(classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR), ErrorKind::Provider);
    }

    #[test]
    fn classified_http_error_carries_kind_and_body() {
        let err = classified_http_error("anthropic", reqwest::StatusCode::UNAUTHORIZED, "bad key");
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert!(err.message.contains("bad key"));
    }

    #[test]
    fn retryable_status_classification() {
        assert!(is_retryable_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(
            reqwest::StatusCode::SERVICE_UNAVAILABLE
        ));
        assert!(!is_retryable_status(reqwest::StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(reqwest::StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn send_with_retry_returns_first_success() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let mut calls = 0;
        let resp = send_with_retry(&policy, &cancel, "test", || {
            calls += 1;
            async {
                reqwest::Client::new()
                    .get("http://127.0.0.1:0")
                    .send()
                    .await
            }
        })
        .await;
        // connection to a closed port is a transport error on every attempt;
        // assert the retry loop exhausts exactly max_attempts tries.
        assert!(resp.is_err());
        assert_eq!(calls, policy.max_attempts);
    }
}
