//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

pub const FACTS_SYSTEM: &str = include_str!("../../prompts/facts-system.pmt");
pub const FACTS_USER: &str = include_str!("../../prompts/facts-user.pmt");
pub const FACTS_REPAIR: &str = include_str!("../../prompts/facts-repair.pmt");
pub const PLANNER_SYSTEM: &str = include_str!("../../prompts/planner-system.pmt");
pub const PLANNER_USER: &str = include_str!("../../prompts/planner-user.pmt");
pub const PLANNER_REPAIR: &str = include_str!("../../prompts/planner-repair.pmt");
pub const DRAFT_SYSTEM: &str = include_str!("../../prompts/draft-system.pmt");
pub const DRAFT_USER: &str = include_str!("../../prompts/draft-user.pmt");
pub const TRANSFORM_SYSTEM: &str = include_str!("../../prompts/transform-system.pmt");
pub const TRANSFORM_USER: &str = include_str!("../../prompts/transform-user.pmt");
pub const TRANSFORM_REPAIR: &str = include_str!("../../prompts/transform-repair.pmt");
pub const TRANSFORM_NUDGE_SYSTEM: &str = include_str!("../../prompts/transform-nudge-system.pmt");
pub const TRANSFORM_NUDGE_USER: &str = include_str!("../../prompts/transform-nudge-user.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    let found = match name {
        "facts-system" => FACTS_SYSTEM,
        "facts-user" => FACTS_USER,
        "facts-repair" => FACTS_REPAIR,
        "planner-system" => PLANNER_SYSTEM,
        "planner-user" => PLANNER_USER,
        "planner-repair" => PLANNER_REPAIR,
        "draft-system" => DRAFT_SYSTEM,
        "draft-user" => DRAFT_USER,
        "transform-system" => TRANSFORM_SYSTEM,
        "transform-user" => TRANSFORM_USER,
        "transform-repair" => TRANSFORM_REPAIR,
        "transform-nudge-system" => TRANSFORM_NUDGE_SYSTEM,
        "transform-nudge-user" => TRANSFORM_NUDGE_USER,
        _ => {
            debug!("get_embedded: no match found");
            return None;
        }
    };
    Some(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_embedded_facts() {
        let system = get_embedded("facts-system").unwrap();
        assert!(system.contains("'facts'"));
        assert!(system.contains("exact_span"));
        assert!(get_embedded("facts-repair").unwrap().contains("ONLY valid JSON"));
    }

    #[test]
    fn test_get_embedded_planner_lists_vocabulary_slot() {
        assert!(get_embedded("planner-system").unwrap().contains("{{actions}}"));
    }

    #[test]
    fn test_get_embedded_draft_mentions_previous_draft() {
        assert!(get_embedded("draft-user").unwrap().contains("return the previous PRD draft as-is"));
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
