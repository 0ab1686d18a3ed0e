//! Progress checkpoints
//!
//! Periodic snapshots of quantitative progress: repository size, estimated
//! coverage and quality, and task-ledger progress. The latest snapshot lives
//! in `.aidp/checkpoint.yml`; every snapshot is also appended to
//! `.aidp/checkpoint_history.jsonl` for trend computation.

mod metrics;

pub use metrics::{RepoMetrics, collect_repo_metrics};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::tasks::TaskCounts;

/// Latest-snapshot file under `.aidp/`.
pub const CHECKPOINT_FILE: &str = "checkpoint.yml";

/// History file under `.aidp/`.
pub const HISTORY_FILE: &str = "checkpoint_history.jsonl";

/// Snapshot health derived from metric thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    NeedsAttention,
}

/// Metrics captured in one checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetrics {
    pub lines_of_code: u64,
    pub file_count: u64,
    /// Estimated test coverage, 0-100
    pub test_coverage: f64,
    /// Estimated code quality, 0-100
    pub code_quality: f64,
    /// Share of ledger tasks done, 0-100
    pub prd_task_progress: f64,

    #[serde(default, flatten)]
    pub extra: HashMap<String, f64>,
}

/// One recorded checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub step_name: String,
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub metrics: CheckpointMetrics,
    pub status: HealthStatus,
}

impl ledger::Record for Checkpoint {
    fn id(&self) -> &str {
        &self.step_name
    }
}

/// Direction of a metric between the two latest snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

/// Per-metric change between the two latest snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub change: f64,
    pub change_percent: f64,
}

/// Summary returned by [`CheckpointManager::progress_summary`].
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    pub current: Checkpoint,
    pub previous: Option<Checkpoint>,
    pub trends: Option<HashMap<String, Trend>>,
    pub quality_score: f64,
}

/// Records and summarizes checkpoints for a project.
pub struct CheckpointManager {
    project_dir: PathBuf,
    aidp_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl CheckpointManager {
    pub fn new(project_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        let project_dir = project_dir.into();
        let aidp_dir = project_dir.join(".aidp");
        Self {
            project_dir,
            aidp_dir,
            clock,
        }
    }

    /// Capture a snapshot: repository metrics, task progress, and whatever
    /// extra metrics the caller supplies.
    pub fn record_checkpoint(
        &self,
        step_name: &str,
        iteration: u32,
        task_counts: &TaskCounts,
        extra: HashMap<String, f64>,
    ) -> Result<Checkpoint> {
        debug!(%step_name, iteration, "record_checkpoint");

        let repo = collect_repo_metrics(&self.project_dir);
        let prd_task_progress = if task_counts.total() == 0 {
            100.0
        } else {
            100.0 * task_counts.done as f64 / task_counts.total() as f64
        };

        let metrics = CheckpointMetrics {
            lines_of_code: repo.lines_of_code,
            file_count: repo.file_count,
            test_coverage: repo.test_coverage,
            code_quality: repo.code_quality,
            prd_task_progress,
            extra,
        };

        let checkpoint = Checkpoint {
            step_name: step_name.to_string(),
            iteration,
            timestamp: self.clock.now(),
            status: derive_status(&metrics),
            metrics,
        };

        self.persist(&checkpoint)?;
        info!(%step_name, iteration, status = ?checkpoint.status, "Recorded checkpoint");
        Ok(checkpoint)
    }

    fn persist(&self, checkpoint: &Checkpoint) -> Result<()> {
        std::fs::create_dir_all(&self.aidp_dir)
            .with_context(|| format!("creating {}", self.aidp_dir.display()))?;

        let yaml = serde_yaml::to_string(checkpoint)?;
        std::fs::write(self.aidp_dir.join(CHECKPOINT_FILE), yaml)?;

        let log = ledger::RecordLog::open(self.aidp_dir.join(HISTORY_FILE));
        log.append(checkpoint)?;
        Ok(())
    }

    /// Latest snapshot from `checkpoint.yml`, if one was recorded.
    pub fn latest(&self) -> Result<Option<Checkpoint>> {
        let path = self.aidp_dir.join(CHECKPOINT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        match serde_yaml::from_str(&content) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed checkpoint snapshot");
                Ok(None)
            }
        }
    }

    /// History, oldest-first.
    pub fn history(&self) -> Result<Vec<Checkpoint>> {
        let log = ledger::RecordLog::open(self.aidp_dir.join(HISTORY_FILE));
        Ok(log.read_all::<Checkpoint>()?)
    }

    /// Compare the two latest history entries.
    pub fn progress_summary(&self) -> Result<Option<ProgressSummary>> {
        let history = self.history()?;
        let Some(current) = history.last().cloned() else {
            return Ok(None);
        };
        let previous = history.len().checked_sub(2).and_then(|i| history.get(i)).cloned();

        let trends = previous.as_ref().map(|prev| {
            let mut trends = HashMap::new();
            for (name, now, then) in [
                (
                    "lines_of_code",
                    current.metrics.lines_of_code as f64,
                    prev.metrics.lines_of_code as f64,
                ),
                (
                    "file_count",
                    current.metrics.file_count as f64,
                    prev.metrics.file_count as f64,
                ),
                ("test_coverage", current.metrics.test_coverage, prev.metrics.test_coverage),
                ("code_quality", current.metrics.code_quality, prev.metrics.code_quality),
                (
                    "prd_task_progress",
                    current.metrics.prd_task_progress,
                    prev.metrics.prd_task_progress,
                ),
            ] {
                trends.insert(name.to_string(), trend_between(then, now));
            }
            trends
        });

        let quality_score = (current.metrics.test_coverage
            + current.metrics.code_quality
            + current.metrics.prd_task_progress)
            / 3.0;

        Ok(Some(ProgressSummary {
            current,
            previous,
            trends,
            quality_score,
        }))
    }
}

fn derive_status(metrics: &CheckpointMetrics) -> HealthStatus {
    if metrics.test_coverage < 50.0 || metrics.code_quality < 60.0 || metrics.prd_task_progress < 40.0 {
        HealthStatus::NeedsAttention
    } else if metrics.test_coverage >= 80.0 && metrics.code_quality >= 80.0 && metrics.prd_task_progress >= 70.0 {
        HealthStatus::Healthy
    } else {
        HealthStatus::Warning
    }
}

fn trend_between(then: f64, now: f64) -> Trend {
    let change = now - then;
    let direction = if change.abs() < f64::EPSILON {
        TrendDirection::Stable
    } else if change > 0.0 {
        TrendDirection::Up
    } else {
        TrendDirection::Down
    };
    let change_percent = if then.abs() < f64::EPSILON {
        if change.abs() < f64::EPSILON { 0.0 } else { 100.0 }
    } else {
        100.0 * change / then
    };
    Trend {
        direction,
        change,
        change_percent,
    }
}

/// Render a one-line summary for CLI/REPL display.
pub fn format_status_line(checkpoint: &Checkpoint) -> String {
    format!(
        "{} iter {} | {} LOC in {} files | coverage {:.0} | quality {:.0} | tasks {:.0}% | {:?}",
        checkpoint.step_name,
        checkpoint.iteration,
        checkpoint.metrics.lines_of_code,
        checkpoint.metrics.file_count,
        checkpoint.metrics.test_coverage,
        checkpoint.metrics.code_quality,
        checkpoint.metrics.prd_task_progress,
        checkpoint.status,
    )
}
