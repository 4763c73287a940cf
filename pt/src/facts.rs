//! Fact extraction - atomic, attributed claims from the latest user turn
//!
//! Facts are produced fresh every turn and never persisted here. Extraction
//! failure is never fatal: the worst case is an empty list.

use std::sync::Arc;

use eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::agenda::{AgendaIndex, Structure};
use crate::config::{FactsConfig, SpanPolicy};
use crate::extract::{
    ExtractionRequest, RepairContext, ShapeError, Structured, StructuredExtractor, required_array,
};
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::prompts::PromptLoader;

/// Hard ceiling on facts per turn, whatever the config says
pub const MAX_FACTS: usize = 12;

/// Maximum characters kept in `Fact::text`
pub const MAX_FACT_TEXT: usize = 140;

/// One atomic claim traced to the user's words
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub text: String,
    /// Verbatim substring of the input (see `SpanPolicy`)
    pub exact_span: String,
    #[serde(rename = "sectionHint")]
    pub section_hint: String,
    #[serde(rename = "fieldHint")]
    pub field_hint: String,
    pub attributes: FactAttributes,
    pub confidence: f64,
}

/// Optional quantitative qualifiers, e.g. `latency < 200 ms`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactAttributes {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparator: Option<String>,
}

impl Fact {
    /// Normalize one generator element; `None` when it is not a usable fact
    fn from_element(element: &Value) -> Option<Self> {
        let obj = element.as_object()?;
        let text = obj.get("text")?.as_str()?.trim();
        if text.is_empty() {
            return None;
        }

        Some(Self {
            text: text.chars().take(MAX_FACT_TEXT).collect(),
            exact_span: string_field(obj, "exact_span"),
            section_hint: string_field(obj, "sectionHint"),
            field_hint: string_field(obj, "fieldHint"),
            attributes: obj
                .get("attributes")
                .and_then(Value::as_object)
                .map(FactAttributes::from_object)
                .unwrap_or_default(),
            confidence: obj
                .get("confidence")
                .and_then(Value::as_f64)
                .map(|c| c.clamp(0.0, 1.0))
                .unwrap_or(0.0),
        })
    }

    /// Whether `exact_span` appears literally in `input`
    pub fn span_is_verbatim(&self, input: &str) -> bool {
        !self.exact_span.is_empty() && input.contains(&self.exact_span)
    }
}

impl FactAttributes {
    fn from_object(obj: &Map<String, Value>) -> Self {
        let text = |key: &str| match obj.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Self {
            kind: text("type"),
            value: obj.get("value").filter(|v| !v.is_null()).cloned(),
            unit: text("unit"),
            comparator: text("comparator"),
        }
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// The validated `{"facts": [...]}` payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactSet(pub Vec<Fact>);

impl Structured for FactSet {
    const KIND: &'static str = "facts";

    fn from_value(value: Value) -> Result<Self, ShapeError> {
        let elements = required_array(&value, "facts")?;

        let facts: Vec<Fact> = elements.iter().filter_map(Fact::from_element).collect();
        if facts.len() < elements.len() {
            debug!(
                dropped = elements.len() - facts.len(),
                "FactSet::from_value: dropped malformed elements"
            );
        }
        Ok(FactSet(facts))
    }
}

#[derive(Serialize)]
struct FactsUserContext<'a> {
    prompt: &'a str,
    cursor: String,
    next_focus: String,
}

fn index_json(index: Option<AgendaIndex>) -> String {
    index
        .and_then(|i| serde_json::to_string(&i).ok())
        .unwrap_or_else(|| "{}".to_string())
}

/// Pulls facts out of the latest user input
pub struct FactExtractor {
    extractor: StructuredExtractor,
    prompts: Arc<PromptLoader>,
    config: FactsConfig,
}

impl FactExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, config: FactsConfig) -> Self {
        Self {
            extractor: StructuredExtractor::new(llm),
            prompts,
            config,
        }
    }

    fn max_facts(&self) -> usize {
        self.config.max_facts.min(MAX_FACTS)
    }

    fn build_request(&self, prompt: &str, structure: &Structure, model: &str) -> Result<ExtractionRequest> {
        let system = self
            .prompts
            .render("facts-system", &serde_json::json!({ "max_facts": self.max_facts() }))?;
        let user = self.prompts.render(
            "facts-user",
            &FactsUserContext {
                prompt,
                cursor: index_json(structure.cursor),
                next_focus: index_json(structure.next_focus),
            },
        )?;
        let repair = self.prompts.text("facts-repair")?;

        let model = self.config.model.as_deref().unwrap_or(model);
        let request = CompletionRequest::new(
            model,
            vec![Message::system(system), Message::user(user)],
            self.config.temperature,
        )
        .json()
        .max_tokens(self.config.max_tokens);

        Ok(ExtractionRequest::new(request, repair, RepairContext::RequestWithOutput))
    }

    /// Extract at most twelve facts; empty on irrecoverable failure
    pub async fn extract(&self, prompt: &str, structure: &Structure, model: &str) -> Vec<Fact> {
        debug!(prompt_len = prompt.len(), %model, "FactExtractor::extract: called");

        let request = match self.build_request(prompt, structure, model) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "FactExtractor::extract: could not build request");
                return Vec::new();
            }
        };

        let extraction = self.extractor.extract(request, FactSet::default()).await;
        let outcome = extraction.outcome;
        let mut facts = extraction.into_value().0;

        if self.config.span_policy == SpanPolicy::Verbatim {
            let before = facts.len();
            facts.retain(|f| f.span_is_verbatim(prompt));
            if facts.len() < before {
                warn!(
                    dropped = before - facts.len(),
                    "FactExtractor::extract: dropped facts whose span is not in the input"
                );
            }
        }

        facts.truncate(self.max_facts());
        info!(count = facts.len(), ?outcome, "Extracted facts");
        facts
    }
}
