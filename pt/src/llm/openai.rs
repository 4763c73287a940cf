//! OpenAI API client implementation
//!
//! Implements the LlmClient trait for OpenAI's Chat Completions API (and
//! compatible servers).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StopReason, TokenUsage};
use crate::config::LlmConfig;

/// Retries after the first attempt
const MAX_RETRIES: u32 = 3;

const INITIAL_BACKOFF_MS: u64 = 1000;

/// Client for OpenAI-compatible Chat Completions endpoints
pub struct OpenAIClient {
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAIClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable named in the config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(provider = %config.provider, base_url = %config.base_url, "from_config: called");
        let api_key = config.api_key()?;

        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    /// Build the request body for the OpenAI API
    fn build_request_body(&self, request: &CompletionRequest, with_format: bool) -> serde_json::Value {
        debug!(model = %request.model, ?request.max_tokens, %with_format, "build_request_body: called");

        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        let max_tokens = request.max_tokens.unwrap_or(self.max_tokens).min(self.max_tokens);

        // GPT-5.x and o1/o3 models use max_completion_tokens instead of max_tokens
        let uses_completion_tokens =
            request.model.starts_with("gpt-5") || request.model.starts_with("o1") || request.model.starts_with("o3");

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
        });

        if uses_completion_tokens {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if with_format && let Some(format) = request.response_format {
            body["response_format"] = serde_json::json!({ "type": format.as_str() });
        }

        body
    }

    /// First choice's text, finish reason and usage
    fn parse_response(&self, chat: ChatResponse) -> CompletionResponse {
        debug!(choice_count = chat.choices.len(), "parse_response: called");
        let choice = chat.choices.into_iter().next();

        let (content, stop_reason) = match choice {
            Some(c) => (
                c.message.content,
                c.finish_reason
                    .as_deref()
                    .map(StopReason::from_openai)
                    .unwrap_or_default(),
            ),
            None => (None, StopReason::EndTurn),
        };

        let usage = chat
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        CompletionResponse {
            content,
            stop_reason,
            usage,
        }
    }

    /// POST one body, retrying transient failures with exponential backoff
    async fn send(&self, body: &serde_json::Value) -> Result<CompletionResponse, LlmError> {
        let endpoint = format!("{}/v1/chat/completions", self.base_url);
        let mut attempt = 0;

        loop {
            let failure = match self
                .http
                .post(&endpoint)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await
            {
                Err(e) if e.is_timeout() => LlmError::Timeout(self.timeout),
                Err(e) => LlmError::Network(e),
                Ok(response) if response.status().is_success() => {
                    let chat: ChatResponse = response.json().await?;
                    debug!(attempt, "send: success");
                    return Ok(self.parse_response(chat));
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let wait = retry_after(response.headers());
                    let message = response.text().await.unwrap_or_default();
                    status_error(status, message, wait)
                }
            };

            if attempt == MAX_RETRIES || !failure.is_retryable() {
                debug!(attempt, retryable = failure.is_retryable(), "send: giving up");
                return Err(failure);
            }
            attempt += 1;
            let delay = backoff(attempt);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                rate_limited = failure.is_rate_limit(),
                error = %failure,
                "send: transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Error for a non-success HTTP status
fn status_error(status: u16, message: String, retry_after: Duration) -> LlmError {
    match status {
        429 => LlmError::RateLimited { retry_after },
        _ => LlmError::ApiError { status, message },
    }
}

/// Delay before retry `attempt` (1-based): 1s, 2s, 4s, ...
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS << attempt.saturating_sub(1))
}

/// `Retry-After` in seconds, 60 when absent or unparseable
fn retry_after(headers: &reqwest::header::HeaderMap) -> Duration {
    let secs = headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(60);
    Duration::from_secs(secs)
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(model = %request.model, ?request.max_tokens, "complete: called");
        let body = self.build_request_body(&request, true);

        match self.send(&body).await {
            Err(e) if request.response_format.is_some() && e.rejects_response_format() => {
                // Some models refuse structured-output mode; the caller parses text either way
                warn!(model = %request.model, "complete: response_format rejected, retrying without it");
                let body = self.build_request_body(&request, false);
                self.send(&body).await
            }
            other => other,
        }
    }
}

// Chat Completions wire types (only the fields read here)

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    fn client(max_tokens: u32) -> OpenAIClient {
        OpenAIClient {
            api_key: "test-key".to_string(),
            base_url: "https://api.openai.com".to_string(),
            http: Client::new(),
            max_tokens,
            timeout: Duration::from_secs(300),
        }
    }

    #[test]
    fn test_build_request_body_basic() {
        let request = CompletionRequest::new(
            "gpt-4o",
            vec![Message::system("You are helpful"), Message::user("Hello")],
            0.7,
        );

        let body = client(8192).build_request_body(&request, true);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 8192);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are helpful");
        assert_eq!(body["messages"][1]["role"], "user");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_response_format_toggle() {
        let request = CompletionRequest::new("gpt-4o", vec![Message::user("x")], 0.0).json();

        let body = client(8192).build_request_body(&request, true);
        assert_eq!(body["response_format"]["type"], "json_object");

        let body = client(8192).build_request_body(&request, false);
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_max_tokens_capped() {
        let request = CompletionRequest::new("gpt-4o", vec![], 0.0).max_tokens(5000);
        let body = client(1000).build_request_body(&request, true);
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn test_completion_tokens_for_reasoning_models() {
        let request = CompletionRequest::new("o3-mini", vec![], 0.0).max_tokens(300);
        let body = client(4096).build_request_body(&request, true);
        assert_eq!(body["max_completion_tokens"], 300);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(2), Duration::from_secs(2));
        assert_eq!(backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = reqwest::header::HeaderMap::new();
        assert_eq!(retry_after(&headers), Duration::from_secs(60));
        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after(&headers), Duration::from_secs(7));
    }

    #[test]
    fn test_status_errors_drive_retry() {
        let wait = Duration::from_secs(7);
        let err = status_error(429, String::new(), wait);
        assert!(err.is_rate_limit());
        assert!(err.is_retryable());
        assert!(matches!(err, LlmError::RateLimited { retry_after } if retry_after == wait));

        for status in [408, 500, 502, 503, 504] {
            assert!(status_error(status, "x".to_string(), wait).is_retryable(), "{status}");
        }
        for status in [400, 401, 403, 404, 422] {
            let err = status_error(status, "x".to_string(), wait);
            assert!(!err.is_retryable(), "{status}");
            assert!(matches!(err, LlmError::ApiError { status: s, .. } if s == status));
        }
    }

    #[test]
    fn test_parse_response() {
        let api: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"hello"},"finish_reason":"length"}],
                "usage":{"prompt_tokens":10,"completion_tokens":2}}"#,
        )
        .unwrap();
        let resp = client(100).parse_response(api);
        assert_eq!(resp.content.as_deref(), Some("hello"));
        assert_eq!(resp.stop_reason, StopReason::MaxTokens);
        assert_eq!(resp.usage.output_tokens, 2);
    }
}
