//! Scripted collaborator doubles for tests
//!
//! Always compiled so integration tests (and downstream harness tests) can
//! drive the full loop without a model, a shell, or a repository.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use eyre::eyre;

use super::{
    AgentOptions, AgentProvider, AgentResult, CommandOutput, CommandRunner, Sleeper, VcsDriver, WorktreeEntry,
};

/// One scripted agent turn: a result or an error to raise.
pub enum ScriptedTurn {
    Result(AgentResult),
    Failure(String),
}

/// Agent provider that replays a fixed script of turns.
///
/// Runs past the end of the script repeat the last turn.
pub struct ScriptedAgent {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    prompts: Mutex<Vec<String>>,
    last: Mutex<Option<AgentResult>>,
}

impl ScriptedAgent {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            prompts: Mutex::new(Vec::new()),
            last: Mutex::new(None),
        }
    }

    /// Script that completes immediately with the given output.
    pub fn completing(output: impl Into<String>) -> Self {
        Self::new(vec![ScriptedTurn::Result(AgentResult::completed(output))])
    }

    /// Prompts observed so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl AgentProvider for ScriptedAgent {
    async fn execute(&self, prompt: &str, _working_dir: &Path, _options: &AgentOptions) -> eyre::Result<AgentResult> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());

        let turn = self.turns.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        match turn {
            Some(ScriptedTurn::Result(result)) => {
                *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(result.clone());
                Ok(result)
            }
            Some(ScriptedTurn::Failure(message)) => Err(eyre!(message)),
            None => {
                let last = self.last.lock().unwrap_or_else(|e| e.into_inner()).clone();
                last.ok_or_else(|| eyre!("ScriptedAgent: no turns scripted"))
            }
        }
    }
}

/// Command runner that maps command substrings to scripted outputs.
///
/// Commands with no mapping succeed with empty output.
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, VecDeque<CommandOutput>)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue an output for commands containing `needle`. Multiple pushes for
    /// the same needle replay in order, repeating the final one.
    pub fn on(self, needle: impl Into<String>, output: CommandOutput) -> Self {
        let needle = needle.into();
        {
            let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((_, queue)) = rules.iter_mut().find(|(n, _)| *n == needle) {
                queue.push_back(output);
            } else {
                rules.push((needle, VecDeque::from([output])));
            }
        }
        self
    }

    /// Convenience: exit status only.
    pub fn on_status(self, needle: impl Into<String>, exit_status: i32, stdout: impl Into<String>) -> Self {
        self.on(
            needle,
            CommandOutput {
                exit_status,
                stdout: stdout.into(),
                stderr: String::new(),
            },
        )
    }

    /// Commands observed so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, cmd: &str, _working_dir: &Path) -> eyre::Result<CommandOutput> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(cmd.to_string());

        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        for (needle, queue) in rules.iter_mut() {
            if cmd.contains(needle.as_str()) {
                let output = if queue.len() > 1 {
                    queue.pop_front().unwrap_or_else(|| CommandOutput {
                        exit_status: 0,
                        stdout: String::new(),
                        stderr: String::new(),
                    })
                } else {
                    queue.front().cloned().unwrap_or(CommandOutput {
                        exit_status: 0,
                        stdout: String::new(),
                        stderr: String::new(),
                    })
                };
                return Ok(output);
            }
        }

        Ok(CommandOutput {
            exit_status: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// Command runner that always fails with an I/O-style error.
pub struct FailingRunner;

#[async_trait]
impl CommandRunner for FailingRunner {
    async fn run(&self, cmd: &str, _working_dir: &Path) -> eyre::Result<CommandOutput> {
        Err(eyre!("command runner unavailable: {}", cmd))
    }
}

/// Sleeper that returns immediately and records requested durations.
pub struct NoopSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl NoopSleeper {
    pub fn new() -> Self {
        Self {
            slept: Mutex::new(Vec::new()),
        }
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for NoopSleeper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap_or_else(|e| e.into_inner()).push(duration);
    }
}

/// In-memory VCS driver tracking worktrees and branches without git.
pub struct FakeVcs {
    state: Mutex<FakeVcsState>,
}

struct FakeVcsState {
    worktrees: Vec<WorktreeEntry>,
    current_branch: String,
    default_branch: String,
    rollbacks: Vec<u32>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeVcsState {
                worktrees: Vec::new(),
                current_branch: "main".to_string(),
                default_branch: "main".to_string(),
                rollbacks: Vec::new(),
            }),
        }
    }

    /// Pretend a different branch is checked out.
    pub fn set_current_branch(&self, branch: impl Into<String>) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).current_branch = branch.into();
    }

    /// Rollback counts observed so far.
    pub fn rollbacks(&self) -> Vec<u32> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).rollbacks.clone()
    }

    /// Registered worktree paths.
    pub fn worktree_paths(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .worktrees
            .iter()
            .map(|e| e.path.clone())
            .collect()
    }
}

impl Default for FakeVcs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VcsDriver for FakeVcs {
    async fn create_worktree(&self, _repo: &Path, path: &Path, branch: &str, _base: Option<&str>) -> eyre::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.worktrees.iter().any(|e| e.path == path) {
            return Err(eyre!("worktree already exists: {}", path.display()));
        }
        state.worktrees.push(WorktreeEntry {
            path: path.to_path_buf(),
            branch: branch.to_string(),
        });
        Ok(())
    }

    async fn remove_worktree(&self, _repo: &Path, path: &Path, _branch: &str, _delete_branch: bool) -> eyre::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.worktrees.retain(|e| e.path != path);
        Ok(())
    }

    async fn list_worktrees(&self, _repo: &Path) -> eyre::Result<Vec<WorktreeEntry>> {
        Ok(self.state.lock().unwrap_or_else(|e| e.into_inner()).worktrees.clone())
    }

    async fn rollback_commits(&self, _repo: &Path, count: u32) -> eyre::Result<()> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).rollbacks.push(count);
        Ok(())
    }

    async fn current_branch(&self, _repo: &Path) -> eyre::Result<String> {
        Ok(self.state.lock().unwrap_or_else(|e| e.into_inner()).current_branch.clone())
    }

    async fn default_branch(&self, _repo: &Path) -> eyre::Result<String> {
        Ok(self.state.lock().unwrap_or_else(|e| e.into_inner()).default_branch.clone())
    }
}
