//! Generator request/response types
//!
//! These model the Chat Completions contract the turn engine depends on:
//! role-tagged messages in, a single block of text out.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A completion request - everything needed for one generator call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model identifier passed through to the provider
    pub model: String,

    /// Conversation sent verbatim (system messages included)
    pub messages: Vec<Message>,

    /// Sampling temperature
    pub temperature: f32,

    /// Ask the provider for structured (JSON object) output
    pub response_format: Option<ResponseFormat>,

    /// Output token budget; provider default when None
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Create a plain-text request
    pub fn new(model: impl Into<String>, messages: Vec<Message>, temperature: f32) -> Self {
        let model = model.into();
        debug!(%model, message_count = messages.len(), %temperature, "CompletionRequest::new: called");
        Self {
            model,
            messages,
            temperature,
            response_format: None,
            max_tokens: None,
        }
    }

    /// Request JSON object output
    pub fn json(mut self) -> Self {
        self.response_format = Some(ResponseFormat::JsonObject);
        self
    }

    /// Bound the output token budget
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Structured-output mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    JsonObject,
}

impl ResponseFormat {
    /// Wire value for the `response_format.type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::JsonObject => "json_object",
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        debug!("Message::system: called");
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        debug!("Message::user: called");
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        debug!("Message::assistant: called");
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Response from a completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    /// Text content (if any)
    pub content: Option<String>,

    /// Why the model stopped
    pub stop_reason: StopReason,

    /// Token usage for cost tracking
    pub usage: TokenUsage,
}

impl CompletionResponse {
    /// Wrap plain text as a finished response
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }
    }

    /// The generated text, empty when the provider returned none
    pub fn into_text(self) -> String {
        self.content.unwrap_or_default()
    }
}

/// Why the model stopped generating
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StopReason {
    #[default]
    EndTurn,
    MaxTokens,
    ContentFilter,
}

impl StopReason {
    /// Parse from an OpenAI `finish_reason` string
    pub fn from_openai(s: &str) -> Self {
        debug!(%s, "StopReason::from_openai: called");
        match s {
            "length" => StopReason::MaxTokens,
            "content_filter" => StopReason::ContentFilter,
            _ => StopReason::EndTurn,
        }
    }
}

/// Token usage reported by the provider
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        let msg = Message::assistant("Hi there");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "Hi there");
    }

    #[test]
    fn test_message_deserializes_lowercase_roles() {
        let msgs: Vec<Message> = serde_json::from_str(
            r#"[{"role":"system","content":"a"},{"role":"user","content":"b"},{"role":"assistant","content":"c"}]"#,
        )
        .unwrap();
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[2].content, "c");
    }

    #[test]
    fn test_message_rejects_unknown_role() {
        let result: Result<Message, _> = serde_json::from_str(r#"{"role":"tool","content":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_request_builders() {
        let req = CompletionRequest::new("gpt-4o", vec![Message::user("hi")], 0.1)
            .json()
            .max_tokens(300);
        assert_eq!(req.response_format, Some(ResponseFormat::JsonObject));
        assert_eq!(req.max_tokens, Some(300));
        assert_eq!(ResponseFormat::JsonObject.as_str(), "json_object");
    }

    #[test]
    fn test_stop_reason_from_openai() {
        assert_eq!(StopReason::from_openai("stop"), StopReason::EndTurn);
        assert_eq!(StopReason::from_openai("length"), StopReason::MaxTokens);
        assert_eq!(StopReason::from_openai("content_filter"), StopReason::ContentFilter);
        assert_eq!(StopReason::from_openai("unknown"), StopReason::EndTurn);
    }

    #[test]
    fn test_into_text_defaults_to_empty() {
        let resp = CompletionResponse::default();
        assert_eq!(resp.into_text(), "");
        assert_eq!(CompletionResponse::text("x").into_text(), "x");
    }
}
