//! Draft Composer - regenerates the full markdown draft, or leaves it alone
//!
//! Drafting is the expensive call of a turn, so it only runs when the caller
//! asks for it. The output is opaque markdown and is never parsed here.

use std::sync::Arc;

use eyre::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::prompts::PromptLoader;

#[derive(Serialize)]
struct DraftUserContext<'a> {
    guidance: &'a str,
    previous_draft: &'a str,
    conversation: String,
}

/// What the composer needs for one draft
#[derive(Debug, Clone, Copy)]
pub struct DraftInput<'a> {
    pub previous_draft: &'a str,
    pub conversation: &'a [Message],
    pub guidance: &'a str,
    pub should_draft: bool,
    pub model: &'a str,
    pub temperature: f32,
}

pub struct DraftComposer {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
}

impl DraftComposer {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>) -> Self {
        Self { llm, prompts }
    }

    fn build_request(&self, input: &DraftInput<'_>) -> Result<CompletionRequest> {
        let conversation =
            serde_json::to_string(input.conversation).context("Failed to serialize conversation")?;
        let system = self.prompts.text("draft-system")?;
        let user = self.prompts.render(
            "draft-user",
            &DraftUserContext {
                guidance: input.guidance,
                previous_draft: input.previous_draft,
                conversation,
            },
        )?;

        Ok(CompletionRequest::new(
            input.model,
            vec![Message::system(system), Message::user(user)],
            input.temperature,
        ))
    }

    async fn generate(&self, input: &DraftInput<'_>) -> Result<String> {
        let request = self.build_request(input)?;
        let response = self.llm.complete(request).await.context("Draft generation failed")?;
        Ok(response.into_text())
    }

    /// The new draft, or `previous_draft` unchanged
    ///
    /// No generator call is made when `should_draft` is false. Generator
    /// failure and blank output also leave the previous draft in place.
    pub async fn compose(&self, input: DraftInput<'_>) -> String {
        debug!(should_draft = input.should_draft, model = %input.model, "DraftComposer::compose: called");
        if !input.should_draft {
            return input.previous_draft.to_string();
        }

        match self.generate(&input).await {
            Ok(draft) if draft.trim().is_empty() => {
                warn!("DraftComposer::compose: generator returned an empty draft, keeping previous");
                input.previous_draft.to_string()
            }
            Ok(draft) => {
                info!(draft_len = draft.len(), "Composed draft");
                draft
            }
            Err(e) => {
                warn!(error = ?e, "DraftComposer::compose: keeping previous draft");
                input.previous_draft.to_string()
            }
        }
    }
}
