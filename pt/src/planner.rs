//! Planner - decides what document-construction action a turn implies
//!
//! The decision policy belongs to the generator, but the action vocabulary is
//! closed. Anything outside it, or any object that does not conform, is a
//! protocol failure and ends in the deterministic fallback decision, so the
//! conversation can never reach an unrecognised state.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agenda::{AgendaIndex, Structure};
use crate::config::PlannerConfig;
use crate::extract::{ExtractionOutcome, ExtractionRequest, RepairContext, ShapeError, Structured, StructuredExtractor};
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::prompts::PromptLoader;

/// The closed set of planner actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerAction {
    UpdatePrd,
    Gather,
    Summarize,
    ConfirmGate,
    Examples,
    Standards,
    None,
}

impl PlannerAction {
    pub const ALL: [PlannerAction; 7] = [
        PlannerAction::UpdatePrd,
        PlannerAction::Gather,
        PlannerAction::Summarize,
        PlannerAction::ConfirmGate,
        PlannerAction::Examples,
        PlannerAction::Standards,
        PlannerAction::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlannerAction::UpdatePrd => "update_prd",
            PlannerAction::Gather => "gather",
            PlannerAction::Summarize => "summarize",
            PlannerAction::ConfirmGate => "confirm_gate",
            PlannerAction::Examples => "examples",
            PlannerAction::Standards => "standards",
            PlannerAction::None => "none",
        }
    }

    /// `update_prd|gather|...` for prompts
    pub fn vocabulary() -> String {
        Self::ALL.iter().map(|a| a.as_str()).collect::<Vec<_>>().join("|")
    }
}

impl FromStr for PlannerAction {
    type Err = ShapeError;

    /// Exact, case-sensitive match against the vocabulary
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ShapeError::UnknownAction(s.to_string()))
    }
}

impl fmt::Display for PlannerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decision per turn; not retained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerDecision {
    pub action: PlannerAction,
    pub confidence: f64,
    pub targets: Vec<AgendaIndex>,
    pub facts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl PlannerDecision {
    /// Keep gathering on the next focus
    pub fn fallback(next_focus: AgendaIndex) -> Self {
        Self {
            action: PlannerAction::Gather,
            confidence: 0.5,
            targets: vec![next_focus],
            facts: Vec::new(),
            summary: None,
        }
    }
}

impl Structured for PlannerDecision {
    const KIND: &'static str = "planner";

    fn from_value(value: Value) -> Result<Self, ShapeError> {
        let obj = value.as_object().ok_or(ShapeError::NotObject)?;
        let field = |key: &str| obj.get(key).ok_or_else(|| ShapeError::MissingKey(key.to_string()));

        let action = field("action")?
            .as_str()
            .ok_or_else(|| ShapeError::wrong_type("action", "a string"))?
            .parse::<PlannerAction>()?;

        let confidence = field("confidence")?
            .as_f64()
            .ok_or_else(|| ShapeError::wrong_type("confidence", "a number"))?
            .clamp(0.0, 1.0);

        let targets: Vec<AgendaIndex> = serde_json::from_value(field("targets")?.clone())
            .map_err(|_| ShapeError::wrong_type("targets", "an array of {sectionIndex, fieldIndex}"))?;

        let facts = field("facts")?
            .as_array()
            .ok_or_else(|| ShapeError::wrong_type("facts", "an array"))?
            .iter()
            .map(|f| f.as_str().map(String::from))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ShapeError::wrong_type("facts", "an array of strings"))?;

        let summary = match obj.get("summary") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(ShapeError::wrong_type("summary", "a string")),
        };

        Ok(Self {
            action,
            confidence,
            targets,
            facts,
            summary,
        })
    }
}

#[derive(Serialize)]
struct PlannerUserContext<'a> {
    prompt: &'a str,
    guidance: &'a str,
}

/// Produces one `PlannerDecision` per turn
pub struct Planner {
    extractor: StructuredExtractor,
    prompts: Arc<PromptLoader>,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, config: PlannerConfig) -> Self {
        Self {
            extractor: StructuredExtractor::new(llm),
            prompts,
            config,
        }
    }

    fn build_request(&self, prompt: &str, guidance: &str, model: &str) -> Result<ExtractionRequest> {
        let system = self
            .prompts
            .render("planner-system", &serde_json::json!({ "actions": PlannerAction::vocabulary() }))?;
        let user = self
            .prompts
            .render("planner-user", &PlannerUserContext { prompt, guidance })?;
        let repair = self.prompts.text("planner-repair")?;

        let request = CompletionRequest::new(
            model,
            vec![Message::system(system), Message::user(user)],
            self.config.temperature,
        )
        .json()
        .max_tokens(self.config.max_tokens);

        Ok(ExtractionRequest::new(request, repair, RepairContext::Request))
    }

    /// Decide the turn's action; the fallback decision on any failure
    pub async fn decide(&self, prompt: &str, structure: &Structure, model: &str) -> PlannerDecision {
        debug!(prompt_len = prompt.len(), %model, "Planner::decide: called");
        let fallback = PlannerDecision::fallback(structure.next_focus_or_origin());

        let request = match self.build_request(prompt, &structure.guidance(), model) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Planner::decide: could not build request, using fallback");
                return fallback;
            }
        };

        let extraction = self.extractor.extract(request, fallback).await;
        if extraction.outcome == ExtractionOutcome::Defaulted {
            warn!("Planner::decide: no valid decision, coerced to fallback");
        }
        let decision = extraction.into_value();
        info!(action = %decision.action, confidence = decision.confidence, "Planner decided");
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agenda::{Agenda, Section};
    use crate::llm::client::mock::MockLlmClient;
    use proptest::prelude::*;

    fn structure() -> Structure {
        Structure {
            agenda: Agenda(vec![
                Section::new("Overview", ["Problem"]),
                Section::new("Requirements", ["Requirement", "Acceptance Criteria"]),
            ]),
            cursor: Some(AgendaIndex::new(1, 0)),
            next_focus: Some(AgendaIndex::new(1, 1)),
            ..Structure::default()
        }
    }

    async fn decide(replies: Vec<&str>) -> (PlannerDecision, Arc<MockLlmClient>) {
        let llm = Arc::new(MockLlmClient::texts(replies));
        let planner = Planner::new(
            llm.clone(),
            Arc::new(PromptLoader::embedded_only()),
            PlannerConfig::default(),
        );
        let decision = planner.decide("We need SSO", &structure(), "gpt-test").await;
        (decision, llm)
    }

    #[test]
    fn test_action_round_trip_and_vocabulary() {
        for action in PlannerAction::ALL {
            assert_eq!(action.as_str().parse::<PlannerAction>().unwrap(), action);
            assert_eq!(serde_json::to_value(action).unwrap(), action.as_str());
        }
        assert_eq!(
            PlannerAction::vocabulary(),
            "update_prd|gather|summarize|confirm_gate|examples|standards|none"
        );
    }

    #[test]
    fn test_action_match_is_exact() {
        assert!("Gather".parse::<PlannerAction>().is_err());
        assert!(" gather".parse::<PlannerAction>().is_err());
        assert!("update-prd".parse::<PlannerAction>().is_err());
        assert!(matches!(
            "frobnicate".parse::<PlannerAction>(),
            Err(ShapeError::UnknownAction(a)) if a == "frobnicate"
        ));
    }

    #[test]
    fn test_from_value_valid() {
        let d = PlannerDecision::from_value(serde_json::json!({
            "action": "summarize",
            "confidence": 1.7,
            "targets": [{"sectionIndex": 1, "fieldIndex": 0}],
            "facts": ["SSO required"],
            "summary": "Auth covered"
        }))
        .unwrap();
        assert_eq!(d.action, PlannerAction::Summarize);
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.targets, vec![AgendaIndex::new(1, 0)]);
        assert_eq!(d.summary.as_deref(), Some("Auth covered"));
    }

    #[test]
    fn test_from_value_rejects_nonconforming() {
        let base = serde_json::json!({"action": "gather", "confidence": 0.9, "targets": [], "facts": []});
        assert!(PlannerDecision::from_value(base.clone()).is_ok());

        for key in ["action", "confidence", "targets", "facts"] {
            let mut v = base.clone();
            v.as_object_mut().unwrap().remove(key);
            assert!(matches!(PlannerDecision::from_value(v), Err(ShapeError::MissingKey(_))), "{key}");
        }

        let mut v = base.clone();
        v["facts"] = serde_json::json!([1, 2]);
        assert!(PlannerDecision::from_value(v).is_err());

        let mut v = base.clone();
        v["targets"] = serde_json::json!([{"sectionIndex": -3}]);
        assert!(PlannerDecision::from_value(v).is_err());

        let mut v = base;
        v["confidence"] = serde_json::json!("high");
        assert!(PlannerDecision::from_value(v).is_err());
    }

    #[tokio::test]
    async fn test_valid_decision() {
        let (d, llm) = decide(vec![
            r#"{"action":"update_prd","confidence":0.82,"targets":[{"sectionIndex":1,"fieldIndex":0}],"facts":["SSO"]}"#,
        ])
        .await;
        assert_eq!(d.action, PlannerAction::UpdatePrd);
        assert_eq!(d.facts, vec!["SSO"]);
        assert_eq!(d.summary, None);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_out_of_vocabulary_action_coerced_to_gather() {
        let raw = r#"{"action":"frobnicate","confidence":0.99,"targets":[],"facts":[]}"#;
        let (d, llm) = decide(vec![raw, raw]).await;
        assert_eq!(d.action, PlannerAction::Gather);
        assert_eq!(d.confidence, 0.5);
        assert_eq!(d.targets, vec![AgendaIndex::new(1, 1)]);
        assert!(d.facts.is_empty());
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_repair_recovers_decision() {
        let (d, _) = decide(vec![
            "I think we should gather more info.",
            "```json\n{\"action\":\"examples\",\"confidence\":0.6,\"targets\":[],\"facts\":[]}\n```",
        ])
        .await;
        assert_eq!(d.action, PlannerAction::Examples);
    }

    #[tokio::test]
    async fn test_fallback_without_next_focus_targets_origin() {
        let llm = Arc::new(MockLlmClient::texts(["nope", "nope"]));
        let planner = Planner::new(llm, Arc::new(PromptLoader::embedded_only()), PlannerConfig::default());
        let d = planner.decide("hi", &Structure::default(), "m").await;
        assert_eq!(d, PlannerDecision::fallback(AgendaIndex::new(0, 0)));
    }

    #[tokio::test]
    async fn test_request_carries_guidance_and_vocabulary() {
        let (_, llm) = decide(vec![r#"{"action":"none","confidence":0.1,"targets":[],"facts":[]}"#]).await;
        let req = &llm.requests()[0];
        assert_eq!(req.model, "gpt-test");
        assert_eq!(req.temperature, 0.1);
        assert_eq!(req.max_tokens, Some(300));
        assert!(req.messages[0].content.contains("update_prd|gather|summarize"));
        assert!(req.messages[1].content.contains("Latest user input: We need SSO"));
        assert!(req.messages[1].content.contains("Agenda: Overview [Problem] | Requirements"));
        assert!(req.messages[1].content.contains("Next focus index: section=1, field=1"));
    }

    #[test]
    fn test_decision_serializes_wire_shape() {
        let json = serde_json::to_value(PlannerDecision::fallback(AgendaIndex::new(2, 3))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "action": "gather",
                "confidence": 0.5,
                "targets": [{"sectionIndex": 2, "fieldIndex": 3}],
                "facts": []
            })
        );
    }

    fn action_name() -> impl Strategy<Value = String> {
        prop_oneof![
            proptest::sample::select(PlannerAction::ALL.to_vec()).prop_map(|a| a.as_str().to_string()),
            "[a-z_]{0,16}",
            any::<String>(),
        ]
    }

    proptest! {
        #[test]
        fn prop_action_is_vocabulary_or_rejected(name in action_name()) {
            let value = serde_json::json!({
                "action": name,
                "confidence": 0.5,
                "targets": [],
                "facts": []
            });
            let known = PlannerAction::ALL.iter().any(|a| a.as_str() == name);
            match PlannerDecision::from_value(value) {
                Ok(decision) => {
                    prop_assert!(known);
                    prop_assert_eq!(decision.action.as_str(), name.as_str());
                }
                Err(e) => {
                    prop_assert!(!known);
                    prop_assert!(matches!(e, ShapeError::UnknownAction(_)), "unexpected error");
                }
            }
        }
    }
}
