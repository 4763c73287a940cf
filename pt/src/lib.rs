//! prdturn - turn-processing engine for conversational PRD drafting
//!
//! Each conversational turn produces a natural-language reply, a set of
//! atomic facts extracted from the user's latest input, a planner decision
//! about what the turn means for the document, and (optionally) a regenerated
//! markdown draft. The engine is stateless across turns: the caller owns the
//! conversation history, agenda state and draft, and hands all of it in with
//! every turn.
//!
//! # Core Concepts
//!
//! - **Untrusted generator**: every structured output passes through the
//!   extraction protocol before it becomes a typed value
//! - **Graceful degradation**: facts, plan and draft each have a safe default;
//!   only reply generation and request decoding can fail a turn
//! - **Closed vocabulary**: planner actions are a sum type, never free strings
//!
//! # Modules
//!
//! - [`llm`] - Generator client trait and OpenAI-compatible implementation
//! - [`extract`] - Structured extraction protocol (fence stripping, repair, defaults)
//! - [`facts`] - Fact extraction
//! - [`planner`] - Planner decisions
//! - [`agenda`] - Agenda, cursor, focus stack and guidance text
//! - [`draft`] - Draft composition
//! - [`turn`] - Turn orchestration
//! - [`transform`] - PRD-driven code change proposals
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod agenda;
pub mod cli;
pub mod config;
pub mod draft;
pub mod extract;
pub mod facts;
pub mod llm;
pub mod planner;
pub mod prompts;
pub mod transform;
pub mod turn;

// Re-export commonly used types
pub use agenda::{Agenda, AgendaIndex, FocusFrame, FocusStack, Section, Structure};
pub use config::{Config, FactsConfig, LlmConfig, PlannerConfig, SpanPolicy, TransformConfig, TurnConfig};
pub use draft::{DraftComposer, DraftInput};
pub use extract::{Extraction, ExtractionOutcome, ExtractionRequest, RepairContext, ShapeError, Structured, StructuredExtractor};
pub use facts::{Fact, FactAttributes, FactExtractor, MAX_FACTS};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Message, OpenAIClient, Role, create_client};
pub use planner::{Planner, PlannerAction, PlannerDecision};
pub use prompts::PromptLoader;
pub use transform::{ChangeSet, FileAction, FileChange, SourceFile, TransformOutcome, TransformRequest, Transformer};
pub use turn::{Temps, TurnEngine, TurnFailure, TurnOutcome, TurnRequest, TurnResponse, TurnStage};
