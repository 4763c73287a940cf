//! Prompt Loader
//!
//! Loads prompt templates from files or falls back to embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory (e.g., `.prdturn/prompts/`)
    user_dir: Option<PathBuf>,
    /// Repo default directory (e.g., `prompts/`)
    repo_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a new prompt loader rooted at `root`
    ///
    /// Looks for `.prdturn/prompts/` and `prompts/` under the root; missing
    /// directories are skipped.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        debug!(?root, "PromptLoader::new: called");
        let user_dir = root.join(".prdturn/prompts");
        let repo_dir = root.join("prompts");

        let user_dir_exists = user_dir.is_dir();
        let repo_dir_exists = repo_dir.is_dir();
        debug!(
            ?user_dir,
            %user_dir_exists,
            ?repo_dir,
            %repo_dir_exists,
            "PromptLoader::new: checking directories"
        );

        Self {
            hbs: Self::engine(),
            user_dir: user_dir_exists.then_some(user_dir),
            repo_dir: repo_dir_exists.then_some(repo_dir),
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            user_dir: None,
            repo_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // Prompts are plain text; user input must reach the generator untouched
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    ///
    /// Checks in order:
    /// 1. User override: `.prdturn/prompts/{name}.pmt`
    /// 2. Repo default: `prompts/{name}.pmt`
    /// 3. Embedded fallback
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        for dir in [&self.user_dir, &self.repo_dir].into_iter().flatten() {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found on disk");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
            debug!(?path, "PromptLoader::load_template: not found on disk");
        }

        debug!("PromptLoader::load_template: trying embedded fallback");
        if let Some(content) = embedded::get_embedded(name) {
            return Ok(content.to_string());
        }

        debug!(%name, "PromptLoader::load_template: not found anywhere");
        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;

        self.hbs
            .render_template(&template, context)
            .map(|rendered| rendered.trim_end().to_string())
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }

    /// Load a template that takes no variables
    pub fn text(&self, template_name: &str) -> Result<String> {
        self.render(template_name, &serde_json::json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_embedded_facts_user() {
        let loader = PromptLoader::embedded_only();
        let rendered = loader
            .render(
                "facts-user",
                &serde_json::json!({
                    "prompt": "Users can sign in with Google",
                    "cursor": "{\"sectionIndex\":2,\"fieldIndex\":0}",
                    "next_focus": "{}",
                }),
            )
            .unwrap();
        assert!(rendered.starts_with("Latest user input: Users can sign in with Google\n"));
        assert!(rendered.contains("Cursor: {\"sectionIndex\":2,\"fieldIndex\":0} NextFocus: {}"));
    }

    #[test]
    fn test_render_does_not_escape_html() {
        let loader = PromptLoader::embedded_only();
        let rendered = loader
            .render(
                "facts-user",
                &serde_json::json!({"prompt": "P95 < 200ms & \"fast\"", "cursor": "", "next_focus": ""}),
            )
            .unwrap();
        assert!(rendered.contains("P95 < 200ms & \"fast\""));
    }

    #[test]
    fn test_conditional_sections() {
        let loader = PromptLoader::embedded_only();
        let without = loader
            .render("planner-user", &serde_json::json!({"prompt": "hi", "guidance": ""}))
            .unwrap();
        assert!(without.starts_with("Latest user input: hi\nDecide minimal action"));

        let with = loader
            .render("planner-user", &serde_json::json!({"prompt": "hi", "guidance": "Agenda: A [x]"}))
            .unwrap();
        assert!(with.contains("hi\nAgenda: A [x]\nDecide"));
    }

    #[test]
    fn test_user_override_wins() {
        let dir = TempDir::new().unwrap();
        let user_dir = dir.path().join(".prdturn/prompts");
        std::fs::create_dir_all(&user_dir).unwrap();
        std::fs::write(user_dir.join("draft-system.pmt"), "You write terse PRDs for {{team}}.\n").unwrap();

        let loader = PromptLoader::new(dir.path());
        let rendered = loader.render("draft-system", &serde_json::json!({"team": "payments"})).unwrap();
        assert_eq!(rendered, "You write terse PRDs for payments.");

        // Not overridden: embedded copy
        assert!(loader.text("facts-repair").unwrap().contains("ONLY valid JSON"));
    }

    #[test]
    fn test_repo_dir_used_when_no_user_override() {
        let dir = TempDir::new().unwrap();
        let repo_dir = dir.path().join("prompts");
        std::fs::create_dir_all(&repo_dir).unwrap();
        std::fs::write(repo_dir.join("planner-repair.pmt"), "JSON. Now.").unwrap();

        let loader = PromptLoader::new(dir.path());
        assert_eq!(loader.text("planner-repair").unwrap(), "JSON. Now.");
    }

    #[test]
    fn test_unknown_template() {
        let loader = PromptLoader::embedded_only();
        assert!(loader.load_template("nonexistent-template").is_err());
        assert!(loader.text("nonexistent-template").is_err());
    }
}
