//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// prdturn - conversational PRD turn engine
#[derive(Parser)]
#[command(
    name = "pt",
    about = "Process PRD conversation turns: reply, facts, plan and draft as JSON",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process one turn request (JSON on stdin or from a file)
    Turn {
        /// Read the request from this file instead of stdin
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Extract facts from a single piece of user input
    Facts {
        /// The user input
        #[arg(short, long)]
        input: String,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,

        /// Cursor section index
        #[arg(long)]
        section_index: Option<usize>,

        /// Cursor field index
        #[arg(long)]
        field_index: Option<usize>,
    },

    /// Propose code changes from a PRD (JSON on stdin or from a file)
    Transform {
        /// Read the request from this file instead of stdin
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
    },
}
