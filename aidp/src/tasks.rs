//! Task ledger over the append-only log
//!
//! Every mutation appends a full snapshot to `tasklist.jsonl`; reads replay
//! the log and keep the latest snapshot per id. Nothing is ever rewritten,
//! so the file doubles as an audit trail.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledger::RecordLog;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::domain::{MAX_DESCRIPTION_LEN, Task, TaskPriority, TaskStatus};

/// Ledger file name under `.aidp/`.
pub const TASKLIST_FILE: &str = "tasklist.jsonl";

/// Error kinds for ledger operations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error(transparent)]
    Storage(#[from] ledger::LogError),

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

/// Options accepted by [`TaskLedger::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub priority: TaskPriority,
    pub session: Option<String>,
    pub discovered_during: Option<String>,
    pub tags: Vec<String>,
}

/// Filters accepted by [`TaskLedger::all`].
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub tags: Vec<String>,
    pub since: Option<DateTime<Utc>>,
}

/// Per-status counts over latest task states
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    pub abandoned: usize,
}

impl TaskCounts {
    /// Total number of distinct tasks.
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.done + self.abandoned
    }
}

/// The project-wide task ledger.
pub struct TaskLedger {
    log: RecordLog,
    clock: Arc<dyn Clock>,
}

impl TaskLedger {
    /// Open the ledger under the given `.aidp` directory.
    pub fn open(aidp_dir: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Self {
        let path = aidp_dir.as_ref().join(TASKLIST_FILE);
        debug!(path = %path.display(), "TaskLedger::open");
        Self {
            log: RecordLog::open(path),
            clock,
        }
    }

    /// File a new task. Fails with `InvalidTask` when the description is
    /// empty after trimming or longer than 200 characters.
    pub fn create(&self, description: &str, options: CreateOptions) -> Result<Task, LedgerError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(LedgerError::InvalidTask("description must not be empty".to_string()));
        }
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(LedgerError::InvalidTask(format!(
                "description exceeds {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }

        let mut task = Task::new(description, self.clock.now()).with_priority(options.priority);
        if let Some(session) = options.session {
            task = task.with_session(session);
        }
        if let Some(context) = options.discovered_during {
            task = task.with_discovered_during(context);
        }
        task = task.with_tags(options.tags);

        self.log.append(&task)?;
        info!(task_id = %task.id, priority = %task.priority, "Filed task");
        Ok(task)
    }

    /// Transition a task to a new status, appending the updated snapshot.
    ///
    /// Fails with `TaskNotFound` when no prior record exists for the id.
    pub fn update_status(&self, id: &str, status: TaskStatus, reason: Option<String>) -> Result<Task, LedgerError> {
        let mut task = self.find(id)?.ok_or_else(|| LedgerError::TaskNotFound(id.to_string()))?;

        task.apply_status(status, reason, self.clock.now());
        self.log.append(&task)?;
        info!(task_id = %task.id, status = %task.status, "Updated task");
        Ok(task)
    }

    /// Latest state of a task by id, if one exists.
    pub fn find(&self, id: &str) -> Result<Option<Task>, LedgerError> {
        let mut found: Option<Task> = None;
        self.log.scan::<Task, _>(|task| {
            if task.id == id {
                found = Some(task);
            }
        })?;
        Ok(found)
    }

    /// Latest state of every task matching the filter, newest-created first.
    pub fn all(&self, filter: &TaskFilter) -> Result<Vec<Task>, LedgerError> {
        let mut tasks = self.log.replay_latest::<Task>()?;

        tasks.retain(|task| {
            filter.status.is_none_or(|s| task.status == s)
                && filter.priority.is_none_or(|p| task.priority == p)
                && filter.tags.iter().all(|t| task.tags.contains(t))
                && filter.since.is_none_or(|since| task.created_at >= since)
        });
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    /// Per-status counts across all tasks.
    pub fn counts(&self) -> Result<TaskCounts, LedgerError> {
        let mut counts = TaskCounts::default();
        for task in self.all(&TaskFilter::default())? {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Done => counts.done += 1,
                TaskStatus::Abandoned => counts.abandoned += 1,
            }
        }
        Ok(counts)
    }

    /// All tasks currently pending.
    pub fn pending(&self) -> Result<Vec<Task>, LedgerError> {
        self.all(&TaskFilter {
            status: Some(TaskStatus::Pending),
            ..Default::default()
        })
    }

    /// All tasks currently in progress.
    pub fn in_progress(&self) -> Result<Vec<Task>, LedgerError> {
        self.all(&TaskFilter {
            status: Some(TaskStatus::InProgress),
            ..Default::default()
        })
    }

    /// Number of appended records, history included.
    pub fn history_len(&self) -> Result<usize, LedgerError> {
        Ok(self.log.len()?)
    }
}

/// Completion verdict used by the engine's task gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCheck {
    pub complete: bool,
    pub message: Option<String>,
}

impl CompletionCheck {
    fn complete() -> Self {
        Self {
            complete: true,
            message: None,
        }
    }

    fn blocked(message: String) -> Self {
        Self {
            complete: false,
            message: Some(message),
        }
    }
}

impl TaskLedger {
    /// Project-scoped completion gate.
    ///
    /// An empty ledger counts as complete. Open tasks (pending or
    /// in-progress) block, as do abandoned tasks with no recorded reason.
    pub fn check_completion(&self) -> Result<CompletionCheck, LedgerError> {
        let tasks = self.all(&TaskFilter::default())?;
        if tasks.is_empty() {
            debug!("check_completion: no tasks, complete");
            return Ok(CompletionCheck::complete());
        }

        let open: Vec<&Task> = tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::InProgress))
            .collect();
        if !open.is_empty() {
            let listing = open
                .iter()
                .map(|t| format!("{} ({})", t.id, t.status))
                .collect::<Vec<_>>()
                .join(", ");
            return Ok(CompletionCheck::blocked(format!(
                "{} task(s) still open: {}",
                open.len(),
                listing
            )));
        }

        if tasks.iter().any(|t| t.abandoned_without_reason()) {
            return Ok(CompletionCheck::blocked(
                "Abandoned tasks require user confirmation".to_string(),
            ));
        }

        Ok(CompletionCheck::complete())
    }
}

/// Serialize the open backlog to `future_work.yml` (structured) and
/// `future_work.md` (human-readable), both under `.aidp/`.
pub fn write_future_work(aidp_dir: &Path, ledger: &TaskLedger) -> Result<(), LedgerError> {
    let mut open = ledger.pending()?;
    open.extend(ledger.in_progress()?);
    open.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));

    std::fs::create_dir_all(aidp_dir)
        .map_err(|e| LedgerError::Persistence(format!("cannot create {}: {}", aidp_dir.display(), e)))?;

    let yaml = serde_yaml::to_string(&open)
        .map_err(|e| LedgerError::Persistence(format!("backlog serialization failed: {}", e)))?;
    let yaml_result = std::fs::write(aidp_dir.join("future_work.yml"), yaml);

    let mut md = String::from("# Future Work\n\n");
    if open.is_empty() {
        md.push_str("Nothing outstanding.\n");
    }
    for task in &open {
        md.push_str(&format!(
            "- **[{}]** {} ({}{})\n",
            task.priority,
            task.description,
            task.status,
            task.session
                .as_deref()
                .map(|s| format!(", from {}", s))
                .unwrap_or_default(),
        ));
    }
    let md_result = std::fs::write(aidp_dir.join("future_work.md"), md);

    if let Err(e) = yaml_result.and(md_result) {
        debug!(error = %e, "write_future_work: write failed");
        return Err(LedgerError::Persistence(format!("backlog write failed: {}", e)));
    }
    Ok(())
}

/// Group latest tasks by session name (step), for status displays.
pub fn by_session(tasks: &[Task]) -> HashMap<String, Vec<&Task>> {
    let mut groups: HashMap<String, Vec<&Task>> = HashMap::new();
    for task in tasks {
        let key = task.session.clone().unwrap_or_else(|| "(none)".to_string());
        groups.entry(key).or_default().push(task);
    }
    groups
}
