//! pt - PRD turn engine
//!
//! Reads one JSON request, writes exactly one JSON object to stdout. Logs go
//! to a file so stdout stays machine-readable.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use prdturn::cli::{Cli, Command};
use prdturn::config::Config;
use prdturn::llm::{LlmClient, create_client};
use prdturn::{AgendaIndex, FactExtractor, PromptLoader, Structure, Transformer, TurnEngine, TurnFailure};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("prdturn")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("prdturn.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Request body from `--input` or stdin
fn read_input(path: Option<&Path>) -> Result<String> {
    debug!(?path, "read_input: called");
    match path {
        Some(path) => fs::read_to_string(path).context(format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value).context("Failed to serialize output")?);
    Ok(())
}

fn client(config: &Config) -> Result<Arc<dyn LlmClient>> {
    create_client(&config.llm).context("Failed to create generator client")
}

fn prompts() -> Result<Arc<PromptLoader>> {
    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
    Ok(Arc::new(PromptLoader::new(cwd)))
}

async fn cmd_turn(config: &Config, input: Option<&Path>) -> Result<()> {
    debug!(?input, "cmd_turn: called");
    let body = read_input(input)?;
    let engine = TurnEngine::new(client(config)?, prompts()?, config);
    emit(&engine.handle_json(&body).await)
}

async fn cmd_facts(config: &Config, input: &str, model: Option<&str>, cursor: Option<AgendaIndex>) -> Result<()> {
    debug!(?model, ?cursor, "cmd_facts: called");
    let extractor = FactExtractor::new(client(config)?, prompts()?, config.facts.clone());
    let structure = Structure::focused_at(cursor);
    let model = model.unwrap_or(&config.llm.model);
    let facts = extractor.extract(input, &structure, model).await;
    emit(&serde_json::json!({ "facts": facts }))
}

async fn cmd_transform(config: &Config, input: Option<&Path>) -> Result<()> {
    debug!(?input, "cmd_transform: called");
    let body = read_input(input)?;
    let transformer = Transformer::new(client(config)?, prompts()?, config);
    emit(&transformer.handle_json(&body).await)
}

async fn run(cli: Cli) -> Result<()> {
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(model = %config.llm.model, "pt loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Turn { input } => cmd_turn(&config, input.as_deref()).await,
        Command::Facts {
            input,
            model,
            section_index,
            field_index,
        } => {
            let cursor = match (section_index, field_index) {
                (None, None) => None,
                (s, f) => Some(AgendaIndex::new(s.unwrap_or_default(), f.unwrap_or_default())),
            };
            cmd_facts(&config, &input, model.as_deref(), cursor).await
        }
        Command::Transform { input } => cmd_transform(&config, input.as_deref()).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Callers always read exactly one JSON object
    if let Err(report) = run(cli).await {
        tracing::error!(error = ?report, "pt failed");
        let failure = TurnFailure::from(report);
        match serde_json::to_string(&failure) {
            Ok(json) => println!("{}", json),
            Err(_) => println!(r#"{{"error":"unserializable error","traceback":""}}"#),
        }
    }
}
