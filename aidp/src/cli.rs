//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aidp - fix-forward work-loop harness for AI-assisted development
#[derive(Parser)]
#[command(name = "aidp", about = "Fix-forward work-loop harness for AI-assisted development", version)]
pub struct Cli {
    /// Path to config file (default: <project>/.aidp/aidp.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Project directory (default: current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a step's work loop to completion
    Run {
        /// Step name (e.g. 16_IMPLEMENTATION)
        step: String,

        /// File holding the step prompt body
        #[arg(long)]
        prompt_file: Option<PathBuf>,

        /// Inline step prompt body
        #[arg(long, conflicts_with = "prompt_file")]
        prompt: Option<String>,

        /// Override harness.max-iterations
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Run inside a registered workstream
        #[arg(long)]
        workstream: Option<String>,
    },

    /// Interactive control REPL
    Repl,

    /// Show the latest checkpoint and task counts
    Status,

    /// Inspect the task ledger
    Tasks {
        #[command(subcommand)]
        command: TasksCommand,
    },

    /// Manage workstreams
    Ws {
        #[command(subcommand)]
        command: WsCommand,
    },
}

/// Task ledger subcommands
#[derive(Debug, Subcommand)]
pub enum TasksCommand {
    /// List tasks, newest first
    List {
        /// Filter by status (pending, in_progress, done, abandoned)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Per-status counts
    Counts,
}

/// Workstream subcommands
#[derive(Debug, Subcommand)]
pub enum WsCommand {
    /// List registered workstreams
    List,

    /// Create a workstream
    New {
        /// Slug (lowercase-hyphen)
        slug: String,

        /// Base branch (default: current HEAD)
        #[arg(long)]
        base: Option<String>,
    },

    /// Remove a workstream
    Rm {
        slug: String,

        /// Also delete the branch
        #[arg(long)]
        delete_branch: bool,
    },
}
