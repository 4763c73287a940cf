//! Primary call, single repair round-trip, typed default

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{ShapeError, parse_with};
use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, Message, StopReason};

/// A type that can be validated out of an untrusted JSON value
pub trait Structured: Sized {
    /// Name used in logs
    const KIND: &'static str;

    /// Validate and normalize a parsed value
    fn from_value(value: Value) -> Result<Self, ShapeError>;

    /// Recover, parse and validate raw generator text
    fn from_raw(raw: &str) -> Result<Self, ShapeError> {
        parse_with(raw, Self::from_value)
    }
}

/// What the repair call is shown alongside its instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairContext {
    /// The primary request messages
    Request,
    /// The primary request plus the malformed output as an assistant turn
    RequestWithOutput,
    /// Only the malformed output
    OutputOnly,
}

/// One logical structured request
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub request: CompletionRequest,
    /// System instruction demanding valid JSON only
    pub repair_instruction: String,
    pub repair: RepairContext,
}

impl ExtractionRequest {
    pub fn new(request: CompletionRequest, repair_instruction: impl Into<String>, repair: RepairContext) -> Self {
        Self {
            request,
            repair_instruction: repair_instruction.into(),
            repair,
        }
    }

    /// The repair call for a malformed primary output
    fn repair_request(&self, raw: &str) -> CompletionRequest {
        debug!(repair = ?self.repair, raw_len = raw.len(), "ExtractionRequest::repair_request: called");
        let instruction = Message::system(self.repair_instruction.clone());
        let messages = match self.repair {
            RepairContext::Request => {
                let mut messages = self.request.messages.clone();
                messages.push(instruction);
                messages
            }
            RepairContext::RequestWithOutput => {
                let mut messages = self.request.messages.clone();
                messages.push(Message::assistant(raw));
                messages.push(instruction);
                messages
            }
            RepairContext::OutputOnly => vec![instruction, Message::user(raw)],
        };

        CompletionRequest {
            model: self.request.model.clone(),
            messages,
            temperature: 0.0,
            response_format: self.request.response_format,
            max_tokens: self.request.max_tokens,
        }
    }
}

/// How an extraction concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// Primary output validated
    Parsed,
    /// Repair output validated
    Repaired,
    /// Caller's default substituted
    Defaulted,
}

/// A validated value plus how it was obtained
#[derive(Debug, Clone)]
pub struct Extraction<T> {
    pub value: T,
    pub outcome: ExtractionOutcome,
    /// Generator calls issued (1 or 2)
    pub calls: u8,
    /// Some output stopped at the token limit
    pub truncated: bool,
}

impl<T> Extraction<T> {
    fn new(value: T, outcome: ExtractionOutcome, calls: u8, truncated: bool) -> Self {
        Self {
            value,
            outcome,
            calls,
            truncated,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Runs the extraction protocol against a generator
#[derive(Clone)]
pub struct StructuredExtractor {
    llm: Arc<dyn LlmClient>,
}

impl StructuredExtractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Extract a `T`, falling back to `default` when both attempts fail
    ///
    /// A transport failure on the primary call skips the repair: there is no
    /// output to repair.
    pub async fn extract<T: Structured>(&self, request: ExtractionRequest, default: T) -> Extraction<T> {
        debug!(kind = T::KIND, model = %request.request.model, "extract: called");

        let mut truncated = false;
        let raw = match self.llm.complete(request.request.clone()).await {
            Ok(response) => read_text::<T>(response, "primary", &mut truncated),
            Err(e) => {
                warn!(kind = T::KIND, error = %e, "extract: primary call failed, using default");
                return Extraction::new(default, ExtractionOutcome::Defaulted, 1, truncated);
            }
        };

        match T::from_raw(&raw) {
            Ok(value) => {
                debug!(kind = T::KIND, "extract: primary output valid");
                return Extraction::new(value, ExtractionOutcome::Parsed, 1, truncated);
            }
            Err(e) => {
                warn!(kind = T::KIND, error = %e, raw_len = raw.len(), "extract: primary output rejected, repairing");
            }
        }

        let repaired = match self.llm.complete(request.repair_request(&raw)).await {
            Ok(response) => read_text::<T>(response, "repair", &mut truncated),
            Err(e) => {
                warn!(kind = T::KIND, error = %e, "extract: repair call failed, using default");
                return Extraction::new(default, ExtractionOutcome::Defaulted, 2, truncated);
            }
        };

        match T::from_raw(&repaired) {
            Ok(value) => {
                debug!(kind = T::KIND, "extract: repaired output valid");
                Extraction::new(value, ExtractionOutcome::Repaired, 2, truncated)
            }
            Err(e) => {
                warn!(kind = T::KIND, error = %e, "extract: repaired output rejected, using default");
                Extraction::new(default, ExtractionOutcome::Defaulted, 2, truncated)
            }
        }
    }
}

/// Take the response text, noting usage and a token-limit stop
fn read_text<T: Structured>(response: CompletionResponse, call: &'static str, truncated: &mut bool) -> String {
    debug!(
        kind = T::KIND,
        call,
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        "extract: response received"
    );
    if response.stop_reason == StopReason::MaxTokens {
        warn!(kind = T::KIND, call, "extract: output stopped at the token limit");
        *truncated = true;
    }
    response.into_text()
}
