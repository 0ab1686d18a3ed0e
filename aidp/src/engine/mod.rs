//! The fix-forward work-loop engine
//!
//! Drives one step to completion: drains REPL instructions, asks the
//! scheduler for the next unit, invokes the agent or the deterministic
//! runner, feeds failures forward into the prompt, and gates `done` on the
//! task ledger. Failure never rolls anything back; it becomes input for the
//! next iteration.

pub mod commands;
pub mod runner;
pub mod state;

pub use runner::{AsyncRunner, RunSummary};
pub use state::{LoopPhase, OutputEntry, OutputKind, StateError, StateSnapshot, WorkLoopState};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::domain::Unit;
use crate::exec::{AgentOptions, AgentProvider, CommandRunner, Sleeper};
use crate::guard::{BYPASS_ENV, DiffStat, GuardPolicy};
use crate::prompt::{OptimizeContext, PromptStore};
use crate::queue::{InstructionQueue, format_for_prompt};
use crate::scheduler::UnitScheduler;
use crate::signals;
use crate::tasks::{CompletionCheck, CreateOptions, TaskLedger};
use crate::units::{RunContext, UnitRunner};

use commands::{build_exception_block, build_fix_forward_block, diagnose_failures, run_post_commands};

/// Character ceiling for the style-guide reminder.
const STYLE_REMINDER_LIMIT: usize = 4_000;

/// The reminder fires on every Nth iteration.
const STYLE_REMINDER_EVERY: u32 = 5;

/// Poll interval while paused.
const PAUSE_POLL: Duration = Duration::from_millis(100);

/// Breather between iterations; also the worker's cooperative yield point.
const ITERATION_DELAY: Duration = Duration::from_millis(50);

/// Fix-forward state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Ready,
    ApplyPatch,
    Test,
    Pass,
    Fail,
    Diagnose,
    NextPatch,
    Done,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::ApplyPatch => write!(f, "apply_patch"),
            Self::Test => write!(f, "test"),
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
            Self::Diagnose => write!(f, "diagnose"),
            Self::NextPatch => write!(f, "next_patch"),
            Self::Done => write!(f, "done"),
        }
    }
}

impl std::str::FromStr for EngineState {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(Self::Ready),
            "apply_patch" => Ok(Self::ApplyPatch),
            "test" => Ok(Self::Test),
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            "diagnose" => Ok(Self::Diagnose),
            "next_patch" => Ok(Self::NextPatch),
            "done" => Ok(Self::Done),
            _ => Err(EngineError::InvalidState(s.to_string())),
        }
    }
}

/// Error kinds for the state machine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// One recorded state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRecord {
    pub from: EngineState,
    pub to: EngineState,
    pub iteration: u32,
}

/// Terminal status of one step run
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Cancelled,
    Error,
    Unknown,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Error => write!(f, "error"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result summary of one step run
#[derive(Debug, Clone, serde::Serialize)]
pub struct StepOutcome {
    pub status: StepStatus,
    pub iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Directory context for one step
#[derive(Debug, Clone)]
pub struct EngineContext {
    /// Project root (owns `.aidp/`)
    pub project_dir: PathBuf,

    /// Where the agent and commands run (a workstream path or the root)
    pub working_dir: PathBuf,
}

/// The fix-forward engine for one step.
pub struct FixForwardEngine {
    config: Config,
    ctx: EngineContext,
    agent: Arc<dyn AgentProvider>,
    command_runner: Arc<dyn CommandRunner>,
    state: Arc<WorkLoopState>,
    queue: Arc<InstructionQueue>,
    ledger: Arc<TaskLedger>,
    checkpoints: Arc<crate::checkpoint::CheckpointManager>,
    prompt: PromptStore,
    scheduler: UnitScheduler,
    unit_runner: UnitRunner,
    guard: GuardPolicy,
    engine_state: EngineState,
    history: Vec<TransitionRecord>,
    thinking_tier: Option<String>,
}

impl FixForwardEngine {
    pub fn new(
        config: Config,
        ctx: EngineContext,
        agent: Arc<dyn AgentProvider>,
        command_runner: Arc<dyn CommandRunner>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let aidp_dir = ctx.project_dir.join(".aidp");
        let state = Arc::new(WorkLoopState::new(clock.clone()));
        let queue = Arc::new(InstructionQueue::new(clock.clone()));
        let ledger = Arc::new(TaskLedger::open(&aidp_dir, clock.clone()));
        let checkpoints = Arc::new(crate::checkpoint::CheckpointManager::new(&ctx.project_dir, clock.clone()));
        let prompt = PromptStore::new(&aidp_dir, clock.clone());
        let mut scheduler = UnitScheduler::new(config.work_loop.clone(), clock.clone());
        scheduler.load_initial_units(&ctx.project_dir);
        let unit_runner = UnitRunner::new(
            command_runner.clone(),
            sleeper,
            clock.clone(),
            &ctx.project_dir,
            &ctx.working_dir,
        );
        let guard = GuardPolicy::new(config.guard.clone(), std::env::var(BYPASS_ENV).is_ok());

        Self {
            config,
            ctx,
            agent,
            command_runner,
            state,
            queue,
            ledger,
            checkpoints,
            prompt,
            scheduler,
            unit_runner,
            guard,
            engine_state: EngineState::Ready,
            history: Vec::new(),
            thinking_tier: None,
        }
    }

    /// Share a process-wide ledger instead of the engine's own.
    pub fn with_ledger(mut self, ledger: Arc<TaskLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Share a process-wide checkpoint manager.
    pub fn with_checkpoints(mut self, checkpoints: Arc<crate::checkpoint::CheckpointManager>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    /// Select a thinking-depth tier passed through to the provider.
    pub fn with_thinking_tier(mut self, tier: impl Into<String>) -> Self {
        self.thinking_tier = Some(tier.into());
        self
    }

    /// Shared life-cycle state, for the async runner and the REPL.
    pub fn state(&self) -> Arc<WorkLoopState> {
        self.state.clone()
    }

    /// Shared instruction queue.
    pub fn queue(&self) -> Arc<InstructionQueue> {
        self.queue.clone()
    }

    /// Shared task ledger.
    pub fn ledger(&self) -> Arc<TaskLedger> {
        self.ledger.clone()
    }

    /// Recorded state transitions.
    pub fn state_history(&self) -> &[TransitionRecord] {
        &self.history
    }

    fn transition(&mut self, to: EngineState, iteration: u32) {
        debug!(from = %self.engine_state, %to, iteration, "FixForwardEngine::transition");
        self.history.push(TransitionRecord {
            from: self.engine_state,
            to,
            iteration,
        });
        self.engine_state = to;
    }

    /// Run one step to a terminal outcome.
    ///
    /// The caller (AsyncRunner) has already moved the life-cycle state to
    /// `running`. This method only returns through a terminal path; agent
    /// and command failures are folded into the next iteration instead of
    /// propagating.
    pub async fn execute_step(&mut self, step_name: &str, base_prompt: &str) -> Result<StepOutcome> {
        info!(%step_name, working_dir = %self.ctx.working_dir.display(), "Starting work loop");

        let optimize_ctx = OptimizeContext {
            step_name: step_name.to_string(),
            body: base_prompt.to_string(),
            token_budget: 8_000,
        };
        if !self.prompt.write_optimized(&optimize_ctx)? {
            self.prompt.write(base_prompt)?;
        }

        loop {
            // Iteration boundary: cooperative control checks.
            match self.state.phase() {
                LoopPhase::Cancelled => return self.finish_cancelled(step_name).await,
                LoopPhase::Paused => {
                    tokio::time::sleep(PAUSE_POLL).await;
                    continue;
                }
                _ => {}
            }

            let iteration = self.state.next_iteration();
            if iteration > self.config.harness.max_iterations {
                return self.finish_max_iterations(step_name, iteration).await;
            }
            debug!(iteration, max = self.config.harness.max_iterations, "execute_step: iteration start");

            if let Some(outcome) = self.run_iteration(step_name, iteration).await? {
                return Ok(outcome);
            }

            tokio::time::sleep(ITERATION_DELAY).await;
        }
    }

    /// One full iteration. Returns a terminal outcome when the step ends.
    async fn run_iteration(&mut self, step_name: &str, iteration: u32) -> Result<Option<StepOutcome>> {
        // 1. Drain queued instructions into the prompt.
        let instructions = self.queue.dequeue_all();
        if !instructions.is_empty() {
            info!(count = instructions.len(), "Injecting user instructions");
            self.prompt.prepend(&format_for_prompt(&instructions))?;
            self.state
                .append_output(format!("{} instruction(s) injected", instructions.len()), OutputKind::Info);
        }

        // 2. Apply parked guard updates and config reloads.
        self.apply_control_requests(iteration);

        // 3. What runs next?
        let unit = self.scheduler.next_unit()?;
        debug!(unit = %unit.name(), agentic = unit.is_agentic(), "run_iteration: scheduled unit");

        match unit {
            // 4. Deterministic: run it and feed the scheduler.
            Unit::Deterministic { definition } => {
                let result = self.unit_runner.run(&definition, &RunContext::default()).await;
                self.state
                    .append_output(format!("unit {} -> {}", result.name, result.status), OutputKind::Info);
                self.scheduler.record_deterministic(result);
                Ok(None)
            }

            // 5. Agentic: the full apply/test/diagnose cycle.
            Unit::Agentic { name } => self.run_agentic_unit(step_name, &name, iteration).await,
        }
    }

    /// One agentic turn. Returns a terminal outcome when the step finishes.
    async fn run_agentic_unit(&mut self, step_name: &str, unit_name: &str, iteration: u32) -> Result<Option<StepOutcome>> {
        let full_prompt = self.compose_agent_prompt(step_name, unit_name, iteration)?;
        self.transition(EngineState::ApplyPatch, iteration);

        let options = AgentOptions {
            thinking_tier: self.thinking_tier.clone(),
            settings: self.config.provider.settings.clone(),
        };

        let agent_result = match self.agent.execute(&full_prompt, &self.ctx.working_dir, &options).await {
            Ok(result) => result,
            Err(e) => {
                // Fix-forward at the call boundary: catch once, fold the
                // failure into the prompt, never rethrow.
                error!(error = %e, "Agent call raised; continuing fix-forward");
                self.prompt.append(&build_exception_block(&e))?;
                self.state
                    .append_output(format!("agent call failed: {}", e), OutputKind::Error);
                self.scheduler
                    .record_agentic(unit_name, None, format!("agent call failed: {}", e));
                return Ok(None);
            }
        };

        // Extract directives from the output.
        self.apply_task_directives(step_name, iteration, &agent_result.output);
        let requested_next = signals::extract_next_unit(&agent_result.output);
        let completed = signals::agent_marked_complete(&agent_result.output);
        self.scheduler
            .record_agentic(unit_name, requested_next, summarize(&agent_result.output));
        self.state.append_output(
            format!("agent turn finished (complete: {})", completed),
            OutputKind::Agent,
        );

        self.enforce_guard_on_changes().await;

        // Post-agent command phases.
        self.transition(EngineState::Test, iteration);
        let bag = run_post_commands(
            &self.config.work_loop.commands,
            self.command_runner.as_ref(),
            &self.ctx.working_dir,
            completed,
        )
        .await;

        if bag.all_required_passed() {
            self.transition(EngineState::Pass, iteration);

            if completed {
                let gate = self.check_task_completion()?;
                if gate.complete {
                    self.transition(EngineState::Done, iteration);
                    return Ok(Some(self.finish_completed(step_name, iteration).await?));
                }

                let message = gate.message.unwrap_or_else(|| "tasks remain open".to_string());
                warn!(%message, "Completion blocked by task gate");
                self.prompt.append(&format!(
                    "\n## Completion Blocked\n\n{}\n\nResolve every task (done, or abandoned with a reason) before declaring STATUS: COMPLETE again.\n",
                    message
                ))?;
                self.state
                    .append_output(format!("completion blocked: {}", message), OutputKind::Warn);
            }
            return Ok(None);
        }

        // Failure: diagnose and feed forward.
        self.transition(EngineState::Fail, iteration);
        self.transition(EngineState::Diagnose, iteration);
        let diagnostic = diagnose_failures(&bag);
        self.transition(EngineState::NextPatch, iteration);

        let reminder = if iteration % STYLE_REMINDER_EVERY == 0 {
            self.style_reminder()
        } else {
            None
        };
        self.prompt
            .append(&build_fix_forward_block(iteration, &bag, &diagnostic, reminder.as_deref()))?;
        info!(iteration, %diagnostic, "Iteration failed; prepared next iteration");
        self.state
            .append_output(format!("iteration {} failed: {}", iteration, diagnostic), OutputKind::Warn);

        Ok(None)
    }

    /// The task-completion gate.
    fn check_task_completion(&self) -> Result<CompletionCheck> {
        if !self.config.harness.task_completion_required {
            return Ok(CompletionCheck {
                complete: true,
                message: None,
            });
        }
        Ok(self.ledger.check_completion()?)
    }

    fn apply_task_directives(&self, step_name: &str, iteration: u32, output: &str) {
        for filing in signals::parse_task_filings(output) {
            let options = CreateOptions {
                priority: filing.priority,
                session: Some(step_name.to_string()),
                discovered_during: Some(format!("iteration {}", iteration)),
                tags: filing.tags,
            };
            match self.ledger.create(&filing.description, options) {
                Ok(task) => info!(task_id = %task.id, "Agent filed task"),
                Err(e) => warn!(error = %e, "Rejected agent task filing"),
            }
        }

        for update in signals::parse_task_updates(output) {
            match self.ledger.update_status(&update.id, update.status, update.reason) {
                Ok(task) => info!(task_id = %task.id, status = %task.status, "Agent updated task"),
                Err(e) => warn!(task_id = %update.id, error = %e, "Rejected agent task update"),
            }
        }
    }

    fn apply_control_requests(&mut self, iteration: u32) {
        for (key, value) in self.state.take_guard_updates() {
            match self.guard.apply_update(&key, &value) {
                Ok(()) => {
                    info!(%key, %value, "Applied guard update");
                    self.state
                        .append_output(format!("guard updated: {}={}", key, value), OutputKind::Info);
                }
                Err(e) => {
                    warn!(%key, %value, error = %e, "Rejected guard update");
                    self.state.append_output(format!("guard update failed: {}", e), OutputKind::Error);
                }
            }
        }

        if self.state.take_config_reload() {
            match Config::load(None, &self.ctx.project_dir) {
                Ok(mut config) => {
                    config.finalize();
                    self.guard.set_config(config.guard.clone());
                    self.config = config;
                    info!(iteration, "Reloaded configuration");
                    self.state.append_output("configuration reloaded", OutputKind::Info);
                }
                Err(e) => {
                    warn!(error = %e, "Config reload failed; keeping previous configuration");
                    self.state
                        .append_output(format!("config reload failed: {}", e), OutputKind::Error);
                }
            }
        }
    }

    /// Check the agent's edits against the guard policy via `git diff`.
    async fn enforce_guard_on_changes(&mut self) {
        if self.guard.bypass() || !self.guard.config().enabled {
            return;
        }

        let Ok(output) = self
            .command_runner
            .run("git diff --numstat HEAD", &self.ctx.working_dir)
            .await
        else {
            return;
        };

        let stats = parse_numstat(&output.stdout);
        if stats.is_empty() {
            return;
        }

        if let Err(violation) = self.guard.validate_changes(&stats) {
            warn!(%violation, "Guard policy violation in agent changes");
            let _ = self.prompt.append(&format!(
                "\n## Guard Policy Violation\n\n{}\n\nKeep future edits inside the allowed file set and change budget.\n",
                violation
            ));
            self.state
                .append_output(format!("guard violation: {}", violation), OutputKind::Warn);
        }
    }

    fn compose_agent_prompt(&self, step_name: &str, unit_name: &str, iteration: u32) -> Result<String> {
        let mut prompt = String::new();
        prompt.push_str(&format!("# Work Loop: {} (iteration {})\n\n", step_name, iteration));
        prompt.push_str(&format!("Working directory: {}\n", self.ctx.working_dir.display()));
        prompt.push_str(&format!("Unit: {}\n\n", unit_name));
        prompt.push_str("Ground rules:\n");
        prompt.push_str("- Fix forward: never roll back on failure; repair in place.\n");
        prompt.push_str("- Write and edit code files directly in the working directory.\n");
        prompt.push_str("- Name the next unit with `NEXT_UNIT: <name>` when you know what should run.\n");
        prompt.push_str("- Declare `STATUS: COMPLETE` only when the step is actually finished.\n");

        if self.config.harness.task_completion_required {
            prompt.push_str("\n## Task Tracking\n\n");
            prompt.push_str("File follow-up work instead of dropping it:\n");
            prompt.push_str("- `File task: \"<description>\" [priority: low|medium|high|critical] [tags: a,b,c]`\n");
            prompt.push_str("- `Update task: <id> status: pending|in_progress|done|abandoned [reason: \"<text>\"]`\n");
            prompt.push_str(
                "Do not abandon tasks to finish faster; abandonment requires a reason and user review. \
                 The step cannot complete while any task is pending or in progress.\n",
            );
        }

        if iteration % STYLE_REMINDER_EVERY == 0 && !self.config.provider.instruction_file {
            if let Some(reminder) = self.style_reminder() {
                prompt.push_str("\n## Style Guide Reminder\n\n");
                prompt.push_str(&reminder);
                prompt.push('\n');
            }
        }

        // Recent deterministic results give the agent the loop's context.
        let context = self.scheduler.deterministic_context();
        if !context.is_empty() {
            prompt.push_str("\n## Recent Unit Results\n\n");
            for (name, result) in context {
                prompt.push_str(&format!("- {}: {}\n", name, result.status));
            }
        }

        prompt.push('\n');
        prompt.push_str(&self.prompt.read()?);
        Ok(prompt)
    }

    /// Pick and bound the style-guide text.
    fn style_reminder(&self) -> Option<String> {
        let candidates: Vec<PathBuf> = match &self.config.harness.style_guide {
            Some(path) => vec![self.ctx.project_dir.join(path)],
            None => vec![
                self.ctx.project_dir.join(".aidp/style_guide.md"),
                self.ctx.project_dir.join("STYLE_GUIDE.md"),
                self.ctx.project_dir.join("CONTRIBUTING.md"),
            ],
        };

        for path in candidates {
            if let Ok(content) = std::fs::read_to_string(&path) {
                debug!(path = %path.display(), "style_reminder: using");
                if content.len() > STYLE_REMINDER_LIMIT {
                    let mut end = STYLE_REMINDER_LIMIT;
                    while !content.is_char_boundary(end) {
                        end -= 1;
                    }
                    return Some(format!("{}\n(truncated)", &content[..end]));
                }
                return Some(content);
            }
        }
        None
    }

    async fn finish_completed(&mut self, step_name: &str, iterations: u32) -> Result<StepOutcome> {
        info!(%step_name, iterations, "Step completed");
        self.cleanup(step_name, true).await;
        let _ = self.state.transition(LoopPhase::Completed);
        Ok(StepOutcome {
            status: StepStatus::Completed,
            iterations,
            message: Some(format!("{} completed after {} iteration(s)", step_name, iterations)),
            error: None,
        })
    }

    async fn finish_cancelled(&mut self, step_name: &str) -> Result<StepOutcome> {
        let iterations = self.state.iteration();
        info!(%step_name, iterations, "Step cancelled");
        let save_checkpoint = self.state.save_checkpoint_on_cancel();
        self.cleanup(step_name, save_checkpoint).await;
        Ok(StepOutcome {
            status: StepStatus::Cancelled,
            iterations,
            message: Some(format!("{} cancelled at iteration {}", step_name, iterations)),
            error: None,
        })
    }

    async fn finish_max_iterations(&mut self, step_name: &str, iterations: u32) -> Result<StepOutcome> {
        let message = "Maximum iterations reached";
        let details = format!(
            "did not complete within {} iterations",
            self.config.harness.max_iterations
        );
        error!(%step_name, iterations, %details, "{}", message);
        self.state
            .append_output(format!("warning: {} ({})", message, details), OutputKind::Warn);

        self.cleanup(step_name, true).await;
        self.state.error(message);
        Ok(StepOutcome {
            status: StepStatus::Error,
            iterations,
            message: Some(message.to_string()),
            error: Some(details),
        })
    }

    /// Terminal-path housekeeping: state summary, prompt archive + delete,
    /// final checkpoint.
    async fn cleanup(&mut self, step_name: &str, save_checkpoint: bool) {
        self.display_state_summary();

        if let Err(e) = self.prompt.archive(step_name) {
            warn!(error = %e, "Failed to archive prompt");
        }
        if let Err(e) = self.prompt.delete() {
            warn!(error = %e, "Failed to delete working prompt");
        }

        if let Err(e) = crate::tasks::write_future_work(&self.ctx.project_dir.join(".aidp"), &self.ledger) {
            warn!(error = %e, "Failed to write future-work backlog");
        }

        if save_checkpoint {
            let counts = self.ledger.counts().unwrap_or_default();
            if let Err(e) =
                self.checkpoints
                    .record_checkpoint(step_name, self.state.iteration(), &counts, HashMap::new())
            {
                warn!(error = %e, "Failed to record final checkpoint");
            }
        }
    }

    fn display_state_summary(&self) {
        let summary = self
            .history
            .iter()
            .map(|t| format!("{}->{} (i{})", t.from, t.to, t.iteration))
            .collect::<Vec<_>>()
            .join(", ");
        info!(transitions = self.history.len(), %summary, "State history");
        self.state
            .append_output(format!("state history: {}", summary), OutputKind::Info);
    }
}

fn summarize(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.len() <= 200 {
        trimmed.to_string()
    } else {
        let mut end = 200;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    }
}

/// Parse `git diff --numstat` output into per-file stats.
fn parse_numstat(output: &str) -> Vec<DiffStat> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let additions = parts.next()?.parse().unwrap_or(0);
            let deletions = parts.next()?.parse().unwrap_or(0);
            let path = parts.next()?.to_string();
            Some(DiffStat {
                path,
                additions,
                deletions,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_state_round_trip() {
        for name in ["ready", "apply_patch", "test", "pass", "fail", "diagnose", "next_patch", "done"] {
            let state: EngineState = name.parse().unwrap();
            assert_eq!(state.to_string(), name);
        }
        assert!(matches!(
            "half_done".parse::<EngineState>(),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn test_parse_numstat() {
        let output = "12\t3\tsrc/main.rs\n-\t-\tassets/logo.png\n0\t7\tREADME.md\n";
        let stats = parse_numstat(output);
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].additions, 12);
        assert_eq!(stats[0].deletions, 3);
        assert_eq!(stats[1].additions, 0, "binary files count as zero");
        assert_eq!(stats[2].path, "README.md");
    }

    #[test]
    fn test_summarize_truncates() {
        assert_eq!(summarize("  short  "), "short");
        let long = "y".repeat(500);
        let cut = summarize(&long);
        assert!(cut.len() <= 203);
        assert!(cut.ends_with("..."));
    }
}
