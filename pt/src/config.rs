//! prdturn configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::llm::LlmError;

/// Main prdturn configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generator provider configuration
    pub llm: LlmConfig,

    /// Reply and draft sampling defaults
    pub turn: TurnConfig,

    /// Fact extraction settings
    pub facts: FactsConfig,

    /// Planner settings
    pub planner: PlannerConfig,

    /// Code transform limits
    pub transform: TransformConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidates() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialised
    ///
    /// Errors are swallowed: a broken config is reported later by `load`.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = match config_path {
            Some(p) => Some(p.clone()),
            None => Self::candidates().into_iter().find(|p| p.exists()),
        }?;
        let content = fs::read_to_string(path).ok()?;
        let config: Self = serde_yaml::from_str(&content).ok()?;
        config.log_level
    }

    /// Project-local `.prdturn.yml`, then `~/.config/prdturn/prdturn.yml`
    fn candidates() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".prdturn.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("prdturn").join("prdturn.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Generator provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "openai" supported)
    pub provider: String,

    /// Default model identifier when a request names none
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Hard ceiling on tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String, LlmError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(self.api_key_env.clone()))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 16384,
            timeout_ms: 300_000,
        }
    }
}

/// Reply and draft sampling defaults (overridable per turn)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    #[serde(rename = "reply-temperature")]
    pub reply_temperature: f32,

    #[serde(rename = "draft-temperature")]
    pub draft_temperature: f32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            reply_temperature: 0.7,
            draft_temperature: 0.2,
        }
    }
}

/// How strictly a fact's `exact_span` must match the user input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanPolicy {
    /// Keep spans as the generator returned them
    #[default]
    Trust,
    /// Drop facts whose span is not a literal substring of the input
    Verbatim,
}

/// Fact extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FactsConfig {
    /// Dedicated extraction model; the turn's model when unset
    pub model: Option<String>,

    pub temperature: f32,

    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    #[serde(rename = "max-facts")]
    pub max_facts: usize,

    #[serde(rename = "span-policy")]
    pub span_policy: SpanPolicy,
}

impl Default for FactsConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.0,
            max_tokens: 800,
            max_facts: 12,
            span_policy: SpanPolicy::Trust,
        }
    }
}

/// Planner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub temperature: f32,

    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 300,
        }
    }
}

/// Code transform limits (request `limits` override these)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    #[serde(rename = "max-changes")]
    pub max_changes: usize,

    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_changes: 50,
            max_tokens: 4000,
        }
    }
}
