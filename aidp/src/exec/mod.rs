//! External collaborator contracts
//!
//! The core never talks to a model, a shell, or git directly; it goes through
//! these traits so the loop can be driven end-to-end with scripted doubles.

pub mod mock;

mod agent;
mod git;
mod shell;

pub use agent::CommandAgent;
pub use git::GitDriver;
pub use shell::ShellRunner;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Terminal status reported by the agent provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Completed,
    InProgress,
    Error,
}

/// Result of one agent invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub status: AgentStatus,

    /// Full text output; directives are extracted from this
    pub output: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResult {
    /// A completed result with the given output text.
    pub fn completed(output: impl Into<String>) -> Self {
        Self {
            status: AgentStatus::Completed,
            output: output.into(),
            message: None,
            error: None,
        }
    }
}

/// Per-call agent options (model hints, thinking depth, timeouts)
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    /// Thinking-depth tier name, when one is active
    pub thinking_tier: Option<String>,

    /// Extra provider settings
    pub settings: HashMap<String, String>,
}

/// The external coding agent (model + transport).
///
/// `execute` may fail; the engine catches the failure once and folds it into
/// the next prompt instead of propagating (fix-forward at the call boundary).
#[async_trait]
pub trait AgentProvider: Send + Sync {
    async fn execute(&self, prompt: &str, working_dir: &Path, options: &AgentOptions) -> eyre::Result<AgentResult>;

    /// Whether the provider reads a repo-local instruction file on its own.
    /// Providers without one get the style-guide reminder prepended.
    fn has_instruction_file(&self) -> bool {
        false
    }
}

/// Captured output of one shell command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// True when the command exited zero.
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// The external command runner (tests, linters, builds).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cmd: &str, working_dir: &Path) -> eyre::Result<CommandOutput>;
}

/// A worktree as reported by the VCS driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub branch: String,
}

/// The external version-control driver (git worktrees and rollback).
#[async_trait]
pub trait VcsDriver: Send + Sync {
    /// Create a worktree at `path` on a new `branch` forked from `base`
    /// (current HEAD when `base` is None).
    async fn create_worktree(&self, repo: &Path, path: &Path, branch: &str, base: Option<&str>) -> eyre::Result<()>;

    /// Remove a worktree, optionally deleting its branch.
    async fn remove_worktree(&self, repo: &Path, path: &Path, branch: &str, delete_branch: bool) -> eyre::Result<()>;

    /// List worktrees registered on the repository.
    async fn list_worktrees(&self, repo: &Path) -> eyre::Result<Vec<WorktreeEntry>>;

    /// Discard the last `count` commits on the current branch.
    async fn rollback_commits(&self, repo: &Path, count: u32) -> eyre::Result<()>;

    /// Name of the currently checked-out branch.
    async fn current_branch(&self, repo: &Path) -> eyre::Result<String>;

    /// Name of the repository's default branch.
    async fn default_branch(&self, repo: &Path) -> eyre::Result<String>;
}

/// Injectable sleep, so wait units are instant in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
