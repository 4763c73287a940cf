//! Code transform - turns a PRD and an instruction into proposed file changes
//!
//! The generator proposes `{changes, notes}`; changes are normalized, capped
//! and, when none survive, one nudge call asks for at least a test plan file.
//! Nothing is written to disk here: the caller applies the changes.

use std::sync::Arc;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::{Config, TransformConfig};
use crate::extract::{ExtractionRequest, RepairContext, ShapeError, Structured, StructuredExtractor};
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::prompts::PromptLoader;
use crate::turn::TurnFailure;

/// Paths listed in the prompt manifest
pub const MAX_MANIFEST_LINES: usize = 1000;

/// File bodies included in the prompt
pub const MAX_FILE_BLOBS: usize = 200;

/// Characters kept in `ChangeSet::notes`
pub const MAX_NOTES: usize = 500;

const TRANSFORM_TEMPERATURE: f32 = 0.1;
const NUDGE_MAX_TOKENS: u32 = 1200;

/// A file supplied as context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// Request-level overrides of `TransformConfig`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    #[serde(default)]
    pub max_changes: Option<usize>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRequest {
    #[serde(default)]
    pub prd: String,
    /// Free-text instruction, e.g. "add tests for login"
    #[serde(default)]
    pub extra_prompt: String,
    #[serde(default)]
    pub files: Vec<SourceFile>,
    #[serde(default)]
    pub llm: Option<String>,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub lang_hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Add,
    Modify,
    Delete,
}

impl FileAction {
    /// Case-insensitive, surrounding whitespace ignored
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "add" => Some(FileAction::Add),
            "modify" => Some(FileAction::Modify),
            "delete" => Some(FileAction::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub action: FileAction,
    /// Full file body; only for add and modify
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
}

impl FileChange {
    fn from_element(element: &Value) -> Option<Self> {
        let obj = element.as_object()?;
        let path = obj.get("path")?.as_str()?.trim();
        if path.is_empty() {
            return None;
        }
        let action = FileAction::parse(obj.get("action")?.as_str()?)?;
        let new_content = match action {
            FileAction::Delete => None,
            FileAction::Add | FileAction::Modify => Some(
                obj.get("new_content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            ),
        };
        Some(Self {
            path: path.to_string(),
            action,
            new_content,
        })
    }
}

/// Proposed changes plus a one-line summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changes: Vec<FileChange>,
    pub notes: String,
}

impl Structured for ChangeSet {
    const KIND: &'static str = "changes";

    fn from_value(value: Value) -> Result<Self, ShapeError> {
        let obj: &Map<String, Value> = value.as_object().ok_or(ShapeError::NotObject)?;

        let changes = match obj.get("changes") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().filter_map(FileChange::from_element).collect(),
            Some(_) => return Err(ShapeError::wrong_type("changes", "an array")),
        };

        let notes = match obj.get("notes") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        Ok(Self {
            changes,
            notes: notes.chars().take(MAX_NOTES).collect(),
        })
    }
}

/// Either the change set or the error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformOutcome {
    Success(ChangeSet),
    Failure(TurnFailure),
}

#[derive(Serialize)]
struct SystemContext<'a> {
    max_changes: usize,
    lang_hint: &'a str,
}

#[derive(Serialize)]
struct UserContext<'a> {
    prd: &'a str,
    instruction: &'a str,
    manifest: String,
    files: String,
}

/// Manifest and file blobs, bounded
fn context_pack(files: &[SourceFile]) -> (String, String) {
    let listed: Vec<&SourceFile> = files.iter().filter(|f| !f.path.is_empty()).collect();

    let manifest = listed
        .iter()
        .take(MAX_MANIFEST_LINES)
        .map(|f| f.path.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let blobs = listed
        .iter()
        .filter_map(|f| f.content.as_ref().map(|c| format!("\n=== {} ===\n{}", f.path, c)))
        .take(MAX_FILE_BLOBS)
        .collect::<Vec<_>>()
        .join("\n");

    (manifest, blobs)
}

pub struct Transformer {
    llm: Arc<dyn LlmClient>,
    extractor: StructuredExtractor,
    prompts: Arc<PromptLoader>,
    config: TransformConfig,
    default_model: String,
}

impl Transformer {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, config: &Config) -> Self {
        Self {
            extractor: StructuredExtractor::new(llm.clone()),
            llm,
            prompts,
            config: config.transform.clone(),
            default_model: config.llm.model.clone(),
        }
    }

    fn build_request(&self, request: &TransformRequest, model: &str, max_changes: usize) -> Result<ExtractionRequest> {
        let (manifest, files) = context_pack(&request.files);
        let system = self.prompts.render(
            "transform-system",
            &SystemContext {
                max_changes,
                lang_hint: request.lang_hint.as_deref().map(str::trim).unwrap_or_default(),
            },
        )?;
        let user = self.prompts.render(
            "transform-user",
            &UserContext {
                prd: &request.prd,
                instruction: &request.extra_prompt,
                manifest,
                files,
            },
        )?;
        let max_tokens = request.limits.max_tokens.unwrap_or(self.config.max_tokens);

        let completion = CompletionRequest::new(
            model,
            vec![Message::system(system), Message::user(user)],
            TRANSFORM_TEMPERATURE,
        )
        .json()
        .max_tokens(max_tokens);

        Ok(ExtractionRequest::new(
            completion,
            self.prompts.text("transform-repair")?,
            RepairContext::OutputOnly,
        ))
    }

    /// One call asking for at least a test plan; failures add nothing
    async fn nudge(&self, prd: &str, model: &str) -> Vec<FileChange> {
        debug!(%model, "Transformer::nudge: called");
        let messages = match (
            self.prompts.text("transform-nudge-system"),
            self.prompts.render("transform-nudge-user", &serde_json::json!({ "prd": prd })),
        ) {
            (Ok(system), Ok(user)) => vec![Message::system(system), Message::user(user)],
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Transformer::nudge: could not build request");
                return Vec::new();
            }
        };
        let request = CompletionRequest::new(model, messages, TRANSFORM_TEMPERATURE)
            .json()
            .max_tokens(NUDGE_MAX_TOKENS);

        match self.llm.complete(request).await {
            Ok(response) => match ChangeSet::from_raw(&response.into_text()) {
                Ok(set) => set.changes,
                Err(e) => {
                    warn!(error = %e, "Transformer::nudge: unusable output");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(error = %e, "Transformer::nudge: call failed");
                Vec::new()
            }
        }
    }

    /// Propose changes for a decoded request
    pub async fn transform(&self, request: &TransformRequest) -> Result<ChangeSet> {
        let model = request.llm.clone().unwrap_or_else(|| self.default_model.clone());
        let max_changes = request.limits.max_changes.unwrap_or(self.config.max_changes);
        debug!(%model, files = request.files.len(), max_changes, "Transformer::transform: called");

        let extraction_request = self.build_request(request, &model, max_changes)?;
        let extraction = self.extractor.extract(extraction_request, ChangeSet::default()).await;
        let outcome = extraction.outcome;
        let mut set = extraction.into_value();
        set.changes.truncate(max_changes);

        if set.changes.is_empty() {
            warn!("Transformer::transform: no changes proposed, nudging");
            let mut nudged = self.nudge(&request.prd, &model).await;
            nudged.truncate(max_changes);
            set.changes = nudged;
        }

        info!(changes = set.changes.len(), ?outcome, "Transform complete");
        Ok(set)
    }

    /// Decode, transform, and report either outcome
    pub async fn handle_json(&self, input: &str) -> TransformOutcome {
        debug!(input_len = input.len(), "Transformer::handle_json: called");
        let result = async {
            let request: TransformRequest =
                serde_json::from_str(input).context("Invalid transform request")?;
            self.transform(&request).await
        }
        .await;

        match result {
            Ok(set) => TransformOutcome::Success(set),
            Err(report) => {
                warn!(error = %report, "Transformer::handle_json: failed");
                TransformOutcome::Failure(report.into())
            }
        }
    }
}
