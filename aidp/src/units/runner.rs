//! Runs one deterministic unit (command or wait)
//!
//! Command failures and runner exceptions both reduce to a failure
//! `UnitResult`; nothing here propagates into the work loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::domain::{UnitDefinition, UnitKind, UnitResult, UnitStatus};
use crate::exec::{CommandRunner, Sleeper};

/// How much stdout is carried inline in the result data.
const STDOUT_EXCERPT_LIMIT: usize = 4_000;

/// Per-run inputs beyond the definition itself
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Wakes a wait unit with `status=event`
    pub event_detected: bool,
}

/// Artifact written to the unit's `output_file`
#[derive(Debug, Serialize)]
struct UnitArtifact<'a> {
    name: &'a str,
    status: UnitStatus,
    started_at: chrono::DateTime<chrono::Utc>,
    finished_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stdout: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stderr: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Executes deterministic units against the external command runner.
pub struct UnitRunner {
    runner: Arc<dyn CommandRunner>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
    project_dir: PathBuf,
    working_dir: PathBuf,
}

impl UnitRunner {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        sleeper: Arc<dyn Sleeper>,
        clock: Arc<dyn Clock>,
        project_dir: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            sleeper,
            clock,
            project_dir: project_dir.into(),
            working_dir: working_dir.into(),
        }
    }

    /// Run one unit to a `UnitResult`. Never fails; runner exceptions become
    /// `status=failure` with `data.error`.
    pub async fn run(&self, definition: &UnitDefinition, ctx: &RunContext) -> UnitResult {
        debug!(unit = %definition.name, kind = ?definition.kind, "UnitRunner::run");
        match definition.kind {
            UnitKind::Command => self.run_command(definition).await,
            UnitKind::Wait => self.run_wait(definition, ctx).await,
        }
    }

    async fn run_command(&self, definition: &UnitDefinition) -> UnitResult {
        let started_at = self.clock.now();

        let Some(command) = definition.command.as_deref() else {
            let finished_at = self.clock.now();
            return UnitResult::new(&definition.name, UnitStatus::Failure, started_at, finished_at)
                .with_data("error", serde_json::json!("no command configured"));
        };

        match self.runner.run(command, &self.working_dir).await {
            Ok(output) => {
                let finished_at = self.clock.now();
                let status = if output.success() {
                    UnitStatus::Success
                } else {
                    UnitStatus::Failure
                };

                let mut result = UnitResult::new(&definition.name, status, started_at, finished_at)
                    .with_data("exit_status", serde_json::json!(output.exit_status))
                    .with_data("stdout", serde_json::json!(excerpt(&output.stdout)))
                    .with_data("stderr", serde_json::json!(output.stderr));

                if let Some(output_file) = &definition.output_file {
                    let artifact = UnitArtifact {
                        name: &definition.name,
                        status,
                        started_at,
                        finished_at,
                        exit_status: Some(output.exit_status),
                        stdout: Some(&output.stdout),
                        stderr: Some(&output.stderr),
                        error: None,
                    };
                    if let Some(path) = self.write_artifact(output_file, &artifact) {
                        result.output_path = Some(path);
                    }
                }

                debug!(unit = %definition.name, status = %status, "run_command: finished");
                result
            }
            Err(e) => {
                let finished_at = self.clock.now();
                warn!(unit = %definition.name, error = %e, "Command runner raised; folding into failure result");
                UnitResult::new(&definition.name, UnitStatus::Failure, started_at, finished_at)
                    .with_data("error", serde_json::json!(e.to_string()))
            }
        }
    }

    async fn run_wait(&self, definition: &UnitDefinition, ctx: &RunContext) -> UnitResult {
        let started_at = self.clock.now();

        if ctx.event_detected {
            let finished_at = self.clock.now();
            debug!(unit = %definition.name, "run_wait: event detected, skipping sleep");
            return UnitResult::new(&definition.name, UnitStatus::Event, started_at, finished_at);
        }

        let interval = Duration::from_secs(definition.wait_interval_seconds());
        self.sleeper.sleep(interval).await;

        let finished_at = self.clock.now();
        UnitResult::new(&definition.name, UnitStatus::Waiting, started_at, finished_at)
            .with_data("slept_seconds", serde_json::json!(interval.as_secs()))
    }

    fn write_artifact(&self, output_file: &str, artifact: &UnitArtifact<'_>) -> Option<String> {
        let path = self.project_dir.join(output_file);
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %path.display(), error = %e, "Failed to create artifact directory");
                return None;
            }
        }

        match serde_yaml::to_string(artifact) {
            Ok(yaml) => match std::fs::write(&path, yaml) {
                Ok(()) => Some(path.to_string_lossy().to_string()),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to write unit artifact");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "Failed to serialize unit artifact");
                None
            }
        }
    }
}

fn excerpt(s: &str) -> String {
    if s.len() <= STDOUT_EXCERPT_LIMIT {
        s.to_string()
    } else {
        let mut end = STDOUT_EXCERPT_LIMIT;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &s[..end])
    }
}
