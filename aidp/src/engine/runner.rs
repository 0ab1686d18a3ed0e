//! Async execution shell around the engine
//!
//! Runs the fix-forward engine on a tokio worker task and exposes the narrow
//! control API the REPL consumes. Control flows one way: the REPL mutates
//! `WorkLoopState` and the instruction queue; the worker observes both at
//! iteration boundaries.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::domain::{InstructionKind, InstructionPriority};
use crate::queue::InstructionQueue;

use super::state::{LoopPhase, OutputEntry, StateError, StateSnapshot, WorkLoopState};
use super::{FixForwardEngine, StepOutcome, StepStatus};

/// Default bound on joining the worker after a cancel.
const DEFAULT_CANCEL_TIMEOUT: Duration = Duration::from_secs(30);

/// Result summary returned by [`AsyncRunner::wait`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunSummary {
    pub status: StepStatus,
    pub iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<StepOutcome> for RunSummary {
    fn from(outcome: StepOutcome) -> Self {
        Self {
            status: outcome.status,
            iterations: outcome.iterations,
            message: outcome.message,
            error: outcome.error,
        }
    }
}

/// Owns the worker task and the shared control state for one step.
pub struct AsyncRunner {
    state: Arc<WorkLoopState>,
    queue: Arc<InstructionQueue>,
    engine: Mutex<Option<FixForwardEngine>>,
    handle: tokio::sync::Mutex<Option<JoinHandle<eyre::Result<StepOutcome>>>>,
    cancel_timeout: Duration,
}

impl AsyncRunner {
    pub fn new(engine: FixForwardEngine) -> Self {
        let state = engine.state();
        let queue = engine.queue();
        Self {
            state,
            queue,
            engine: Mutex::new(Some(engine)),
            handle: tokio::sync::Mutex::new(None),
            cancel_timeout: DEFAULT_CANCEL_TIMEOUT,
        }
    }

    /// Bound on joining the worker after cancellation.
    pub fn with_cancel_timeout(mut self, timeout: Duration) -> Self {
        self.cancel_timeout = timeout;
        self
    }

    /// Start the step on a worker task.
    ///
    /// Rejects when the loop is not idle or has already consumed its engine.
    pub async fn execute_step_async(&self, step_name: &str, base_prompt: &str) -> Result<StateSnapshot, StateError> {
        if self.state.phase() != LoopPhase::Idle {
            return Err(StateError::AlreadyRunning);
        }
        let Some(mut engine) = self.engine.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            return Err(StateError::AlreadyRunning);
        };

        self.state.transition(LoopPhase::Running)?;
        info!(%step_name, "Starting worker");

        let step_name = step_name.to_string();
        let base_prompt = base_prompt.to_string();
        let state = self.state.clone();
        let handle = tokio::spawn(async move {
            let result = engine.execute_step(&step_name, &base_prompt).await;
            if let Err(e) = &result {
                // Programmer or persistence error escaped the loop; record it
                // so wait() can report an error summary.
                error!(error = %e, "Worker raised");
                state.error(format!("{:#}", e));
            }
            result
        });

        *self.handle.lock().await = Some(handle);
        Ok(self.state.snapshot())
    }

    /// Worker alive and the loop running or paused.
    pub async fn running(&self) -> bool {
        let alive = self
            .handle
            .lock()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false);
        alive && matches!(self.state.phase(), LoopPhase::Running | LoopPhase::Paused)
    }

    pub fn pause(&self) -> Result<StateSnapshot, StateError> {
        self.state.transition(LoopPhase::Paused)?;
        debug!("AsyncRunner::pause");
        Ok(self.state.snapshot())
    }

    pub fn resume(&self) -> Result<StateSnapshot, StateError> {
        self.state.transition(LoopPhase::Running)?;
        debug!("AsyncRunner::resume");
        Ok(self.state.snapshot())
    }

    /// Request cooperative cancellation; the worker observes it at the next
    /// iteration boundary.
    pub fn cancel(&self, save_checkpoint: bool) -> Result<StateSnapshot, StateError> {
        self.state.set_save_checkpoint_on_cancel(save_checkpoint);
        self.state.transition(LoopPhase::Cancelled)?;
        info!(save_checkpoint, "Cancellation requested");
        Ok(self.state.snapshot())
    }

    pub fn enqueue_instruction(&self, content: &str, kind: InstructionKind, priority: InstructionPriority) {
        self.queue.enqueue(content, kind, priority);
    }

    pub fn drain_output(&self) -> Vec<OutputEntry> {
        self.state.drain_output()
    }

    pub fn request_guard_update(&self, key: &str, value: &str) {
        self.state.request_guard_update(key, value);
    }

    pub fn request_config_reload(&self) {
        self.state.request_config_reload();
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    /// Join the worker and classify the result.
    ///
    /// After a cancel the join is bounded by the cancel timeout; a worker
    /// stuck in an external call past that bound yields an `unknown` summary.
    pub async fn wait(&self) -> RunSummary {
        let handle = self.handle.lock().await.take();
        let Some(handle) = handle else {
            return RunSummary {
                status: StepStatus::Unknown,
                iterations: self.state.iteration(),
                message: Some("no worker was started".to_string()),
                error: None,
            };
        };

        let joined = if self.state.phase() == LoopPhase::Cancelled {
            match tokio::time::timeout(self.cancel_timeout, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    return RunSummary {
                        status: StepStatus::Unknown,
                        iterations: self.state.iteration(),
                        message: Some("worker did not stop within the cancel timeout".to_string()),
                        error: None,
                    };
                }
            }
        } else {
            handle.await
        };

        match joined {
            Ok(Ok(outcome)) => outcome.into(),
            Ok(Err(e)) => RunSummary {
                status: StepStatus::Error,
                iterations: self.state.iteration(),
                message: Some("worker raised".to_string()),
                error: Some(format!("{:#}", e)),
            },
            Err(join_error) => {
                self.state.error(format!("worker panicked: {}", join_error));
                RunSummary {
                    status: StepStatus::Error,
                    iterations: self.state.iteration(),
                    message: Some("worker panicked".to_string()),
                    error: Some(join_error.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::EngineContext;
    use crate::exec::mock::{NoopSleeper, ScriptedAgent, ScriptedRunner};
    use crate::clock::ManualClock;
    use tempfile::tempdir;

    fn engine_with(dir: &std::path::Path, agent: ScriptedAgent, config: Config) -> FixForwardEngine {
        FixForwardEngine::new(
            config,
            EngineContext {
                project_dir: dir.to_path_buf(),
                working_dir: dir.to_path_buf(),
            },
            Arc::new(agent),
            Arc::new(ScriptedRunner::new()),
            Arc::new(ManualClock::default()),
            Arc::new(NoopSleeper::new()),
        )
    }

    fn engine_at(dir: &std::path::Path, agent: ScriptedAgent) -> FixForwardEngine {
        engine_with(dir, agent, Config::default())
    }

    /// Config for tests that keep the worker looping until told to stop.
    fn endless_config() -> Config {
        let mut config = Config::default();
        config.harness.max_iterations = u32::MAX;
        config
    }

    #[tokio::test]
    async fn test_start_and_wait_completed() {
        let temp = tempdir().unwrap();
        let agent = ScriptedAgent::completing("all finished\nSTATUS: COMPLETE");
        let runner = AsyncRunner::new(engine_at(temp.path(), agent));

        let snapshot = runner.execute_step_async("16_IMPLEMENTATION", "do the thing").await.unwrap();
        assert_eq!(snapshot.phase, LoopPhase::Running);

        let summary = runner.wait().await;
        assert_eq!(summary.status, StepStatus::Completed);
        assert_eq!(summary.iterations, 1);
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let temp = tempdir().unwrap();
        let agent = ScriptedAgent::completing("STATUS: COMPLETE");
        let runner = AsyncRunner::new(engine_at(temp.path(), agent));

        runner.execute_step_async("STEP", "p").await.unwrap();
        assert!(matches!(
            runner.execute_step_async("STEP", "p").await,
            Err(StateError::AlreadyRunning)
        ));

        runner.wait().await;
    }

    #[tokio::test]
    async fn test_cancel_produces_cancelled_summary() {
        let temp = tempdir().unwrap();
        // Never completes on its own.
        let agent = ScriptedAgent::completing("still going");
        let runner = AsyncRunner::new(engine_with(temp.path(), agent, endless_config()));

        runner.execute_step_async("STEP", "p").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        runner.cancel(true).unwrap();

        let summary = runner.wait().await;
        assert_eq!(summary.status, StepStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_pause_resume_round_trip() {
        let temp = tempdir().unwrap();
        let agent = ScriptedAgent::completing("working");
        let runner = AsyncRunner::new(engine_with(temp.path(), agent, endless_config()));

        runner.execute_step_async("STEP", "p").await.unwrap();
        let paused = runner.pause().unwrap();
        assert_eq!(paused.phase, LoopPhase::Paused);
        assert!(runner.running().await, "paused still counts as running");

        let resumed = runner.resume().unwrap();
        assert_eq!(resumed.phase, LoopPhase::Running);

        runner.cancel(false).unwrap();
        runner.wait().await;
    }

    #[tokio::test]
    async fn test_wait_without_start_is_unknown() {
        let temp = tempdir().unwrap();
        let agent = ScriptedAgent::completing("unused");
        let runner = AsyncRunner::new(engine_at(temp.path(), agent));

        let summary = runner.wait().await;
        assert_eq!(summary.status, StepStatus::Unknown);
    }

    #[tokio::test]
    async fn test_control_channels_forward() {
        let temp = tempdir().unwrap();
        let agent = ScriptedAgent::completing("STATUS: COMPLETE");
        let engine = engine_at(temp.path(), agent);
        let queue = engine.queue();
        let state = engine.state();
        let runner = AsyncRunner::new(engine);

        runner.enqueue_instruction("focus on tests", InstructionKind::Constraint, InstructionPriority::High);
        assert_eq!(queue.len(), 1);

        runner.request_guard_update("enabled", "true");
        assert_eq!(state.take_guard_updates().len(), 1);

        runner.request_config_reload();
        assert!(state.take_config_reload());
    }
}
