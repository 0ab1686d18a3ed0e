//! Work-loop life-cycle state shared between the worker and the REPL
//!
//! The worker owns the loop; the REPL steers it through this structure.
//! Guard updates and config-reload requests are parked here and drained by
//! the worker at iteration boundaries — reading clears.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;

/// Life-cycle phase of a running step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
    Error,
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Error kinds for life-cycle misuse
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Illegal transition: {from} -> {to}")]
    IllegalTransition { from: LoopPhase, to: LoopPhase },

    #[error("Work loop is already running")]
    AlreadyRunning,
}

/// Kind of a buffered output entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Info,
    Warn,
    Error,
    Agent,
}

/// One buffered output line for the REPL
#[derive(Debug, Clone, Serialize)]
pub struct OutputEntry {
    pub message: String,
    pub kind: OutputKind,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view for status displays
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub phase: LoopPhase,
    pub iteration: u32,
    pub last_error: Option<String>,
    pub buffered_output: usize,
}

struct StateInner {
    phase: LoopPhase,
    iteration: u32,
    last_error: Option<String>,
    output: VecDeque<OutputEntry>,
    guard_updates: HashMap<String, String>,
    config_reload: bool,
    save_checkpoint_on_cancel: bool,
}

/// Thread-safe life-cycle state plus REPL-to-worker control channels.
pub struct WorkLoopState {
    inner: Mutex<StateInner>,
    clock: Arc<dyn Clock>,
}

impl WorkLoopState {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(StateInner {
                phase: LoopPhase::Idle,
                iteration: 0,
                last_error: None,
                output: VecDeque::new(),
                guard_updates: HashMap::new(),
                config_reload: false,
                save_checkpoint_on_cancel: true,
            }),
            clock,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> LoopPhase {
        self.lock().phase
    }

    pub fn iteration(&self) -> u32 {
        self.lock().iteration
    }

    /// Bump and return the iteration counter.
    pub fn next_iteration(&self) -> u32 {
        let mut inner = self.lock();
        inner.iteration += 1;
        inner.iteration
    }

    /// Validate and apply a phase transition.
    pub fn transition(&self, to: LoopPhase) -> Result<LoopPhase, StateError> {
        let mut inner = self.lock();
        let from = inner.phase;

        let legal = matches!(
            (from, to),
            (LoopPhase::Idle, LoopPhase::Running)
                | (LoopPhase::Running, LoopPhase::Paused)
                | (LoopPhase::Paused, LoopPhase::Running)
                | (LoopPhase::Running | LoopPhase::Paused, LoopPhase::Cancelled)
                | (LoopPhase::Running | LoopPhase::Paused, LoopPhase::Completed)
                | (LoopPhase::Running | LoopPhase::Paused, LoopPhase::Error)
        );
        if !legal {
            return Err(StateError::IllegalTransition { from, to });
        }

        debug!(%from, %to, "WorkLoopState::transition");
        inner.phase = to;
        Ok(to)
    }

    /// Transition into `error` and record the message.
    pub fn error(&self, message: impl Into<String>) {
        let mut inner = self.lock();
        inner.last_error = Some(message.into());
        // Error is recorded even from a phase with no legal edge; the
        // snapshot must reflect what happened.
        inner.phase = LoopPhase::Error;
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Whether a cancel should record a final checkpoint.
    pub fn set_save_checkpoint_on_cancel(&self, save: bool) {
        self.lock().save_checkpoint_on_cancel = save;
    }

    pub fn save_checkpoint_on_cancel(&self) -> bool {
        self.lock().save_checkpoint_on_cancel
    }

    /// Buffer an output line; never blocks the worker.
    pub fn append_output(&self, message: impl Into<String>, kind: OutputKind) {
        let entry = OutputEntry {
            message: message.into(),
            kind,
            timestamp: self.clock.now(),
        };
        self.lock().output.push_back(entry);
    }

    /// Drain all buffered output, oldest first.
    pub fn drain_output(&self) -> Vec<OutputEntry> {
        self.lock().output.drain(..).collect()
    }

    /// Park a guard-policy update for the worker.
    pub fn request_guard_update(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().guard_updates.insert(key.into(), value.into());
    }

    /// Take pending guard updates; reading clears.
    pub fn take_guard_updates(&self) -> HashMap<String, String> {
        std::mem::take(&mut self.lock().guard_updates)
    }

    /// Ask the worker to reload configuration at the next boundary.
    pub fn request_config_reload(&self) {
        self.lock().config_reload = true;
    }

    /// Take the config-reload flag; reading clears.
    pub fn take_config_reload(&self) -> bool {
        std::mem::take(&mut self.lock().config_reload)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.lock();
        StateSnapshot {
            phase: inner.phase,
            iteration: inner.iteration,
            last_error: inner.last_error.clone(),
            buffered_output: inner.output.len(),
        }
    }
}
