//! Turn Orchestrator - one conversational turn, start to finish
//!
//! ```text
//! TurnRequest ──▶ reply ──▶ ┌ facts  ┐
//!                           │ plan   │ ──▶ TurnResponse
//!                           └ draft  ┘
//! ```
//!
//! The reply is generated first; if it fails the whole turn fails. Facts,
//! plan and draft all read the same input snapshot, so they run concurrently
//! and each degrades to its own safe default. The engine holds no state
//! between turns.

use std::fmt;
use std::sync::Arc;

use eyre::{Context, Report, Result};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::agenda::Structure;
use crate::config::{Config, TurnConfig};
use crate::draft::{DraftComposer, DraftInput};
use crate::facts::{Fact, FactExtractor};
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::planner::{Planner, PlannerDecision};
use crate::prompts::PromptLoader;

/// Per-turn temperature overrides
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Temps {
    #[serde(default)]
    pub reply: Option<f32>,
    #[serde(default)]
    pub draft: Option<f32>,
}

/// One turn's input, as sent by the conversation loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    /// Latest user input
    pub prompt: String,
    /// Full history, already ending with the latest user message
    pub conversation: Vec<Message>,
    /// Model identifier; the configured model when absent
    #[serde(default)]
    pub llm: Option<String>,
    #[serde(default)]
    pub prd_draft: Option<String>,
    #[serde(default)]
    pub structure: Structure,
    #[serde(default)]
    pub should_draft: bool,
    #[serde(default)]
    pub temps: Temps,
}

/// The normal envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub reply: String,
    pub prd_draft: String,
    pub planner: PlannerDecision,
    pub facts: Vec<Fact>,
}

/// A turn-fatal error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnFailure {
    pub error: String,
    pub traceback: String,
}

impl From<Report> for TurnFailure {
    fn from(report: Report) -> Self {
        Self {
            error: report.to_string(),
            traceback: format!("{:?}", report),
        }
    }
}

/// Exactly one of the envelope or the error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnOutcome {
    Success(TurnResponse),
    Failure(TurnFailure),
}

impl TurnOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TurnOutcome::Success(_))
    }
}

/// Stages of a turn, for logs and error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Decode,
    GenerateReply,
    ExtractFacts,
    Plan,
    Draft,
    Assemble,
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnStage::Decode => "decode",
            TurnStage::GenerateReply => "generate_reply",
            TurnStage::ExtractFacts => "extract_facts",
            TurnStage::Plan => "plan",
            TurnStage::Draft => "draft",
            TurnStage::Assemble => "assemble",
        };
        f.write_str(s)
    }
}

impl TurnStage {
    /// Span that tags a stage's logs
    pub fn span(self) -> tracing::Span {
        info_span!("stage", stage = %self)
    }
}

/// Runs turns against one generator
pub struct TurnEngine {
    llm: Arc<dyn LlmClient>,
    default_model: String,
    temps: TurnConfig,
    facts: FactExtractor,
    planner: Planner,
    drafter: DraftComposer,
}

impl TurnEngine {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, config: &Config) -> Self {
        debug!(model = %config.llm.model, "TurnEngine::new: called");
        Self {
            facts: FactExtractor::new(llm.clone(), prompts.clone(), config.facts.clone()),
            planner: Planner::new(llm.clone(), prompts.clone(), config.planner.clone()),
            drafter: DraftComposer::new(llm.clone(), prompts),
            llm,
            default_model: config.llm.model.clone(),
            temps: config.turn.clone(),
        }
    }

    async fn generate_reply(&self, request: &TurnRequest, model: &str) -> Result<String> {
        debug!(stage = %TurnStage::GenerateReply, "generate_reply: called");
        let messages = if request.conversation.is_empty() {
            warn!("generate_reply: conversation is empty, sending the prompt alone");
            vec![Message::user(request.prompt.clone())]
        } else {
            request.conversation.clone()
        };
        let temperature = request.temps.reply.unwrap_or(self.temps.reply_temperature);

        let response = self
            .llm
            .complete(CompletionRequest::new(model, messages, temperature))
            .await
            .with_context(|| format!("Turn stage '{}' failed", TurnStage::GenerateReply))?;
        Ok(response.into_text())
    }

    /// Run one decoded turn
    ///
    /// Only reply generation can fail; every other stage has a default.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnResponse> {
        let turn_id = Uuid::now_v7();
        let span = info_span!("turn", %turn_id);
        self.run_turn_inner(request).instrument(span).await
    }

    async fn run_turn_inner(&self, request: TurnRequest) -> Result<TurnResponse> {
        let model = request.llm.clone().unwrap_or_else(|| self.default_model.clone());
        debug!(
            %model,
            history = request.conversation.len(),
            should_draft = request.should_draft,
            "run_turn: called"
        );

        let reply = self.generate_reply(&request, &model).await?;
        info!(stage = %TurnStage::GenerateReply, reply_len = reply.len(), "Stage complete");

        let guidance = request.structure.guidance();
        let previous_draft = request.prd_draft.as_deref().unwrap_or_default();
        let draft_input = DraftInput {
            previous_draft,
            conversation: &request.conversation,
            guidance: &guidance,
            should_draft: request.should_draft,
            model: &model,
            temperature: request.temps.draft.unwrap_or(self.temps.draft_temperature),
        };

        let (facts, planner, prd_draft) = tokio::join!(
            self.facts
                .extract(&request.prompt, &request.structure, &model)
                .instrument(TurnStage::ExtractFacts.span()),
            self.planner
                .decide(&request.prompt, &request.structure, &model)
                .instrument(TurnStage::Plan.span()),
            self.drafter
                .compose(draft_input)
                .instrument(TurnStage::Draft.span()),
        );

        info!(
            stage = %TurnStage::Assemble,
            facts = facts.len(),
            action = %planner.action,
            drafted = request.should_draft,
            "Turn complete"
        );
        Ok(TurnResponse {
            reply,
            prd_draft,
            planner,
            facts,
        })
    }

    /// Decode a JSON turn request, run it, and report either outcome
    pub async fn handle_json(&self, input: &str) -> TurnOutcome {
        debug!(input_len = input.len(), "handle_json: called");
        let result = async {
            let request: TurnRequest = serde_json::from_str(input)
                .with_context(|| format!("Turn stage '{}' failed: invalid turn request", TurnStage::Decode))?;
            self.run_turn(request).await
        }
        .await;

        match result {
            Ok(response) => TurnOutcome::Success(response),
            Err(report) => {
                warn!(error = %report, "handle_json: turn failed");
                TurnOutcome::Failure(report.into())
            }
        }
    }
}
