//! Task records persisted in the append-only ledger
//!
//! Each ledger line is an immutable snapshot; the latest line for an id is
//! the task's current state and everything earlier is history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::trimmed_non_empty;

/// Maximum task description length after trimming.
pub const MAX_DESCRIPTION_LEN: usize = 200;

/// Task life-cycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Filed but not started
    #[default]
    Pending,
    /// Being worked on
    InProgress,
    /// Finished successfully
    Done,
    /// Given up; requires a reason to count as resolved
    Abandoned,
}

impl TaskStatus {
    /// True for states that no longer block completion (abandoned only counts
    /// when a reason was recorded; the gate checks that separately).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Abandoned)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Done => write!(f, "done"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown task priority: {}", s)),
        }
    }
}

/// A task record as appended to `tasklist.jsonl`.
///
/// Timestamps are ISO-8601 UTC; optional fields are omitted from the wire
/// when unset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Process-unique identity
    pub id: String,

    /// What needs doing (non-empty after trim, at most 200 chars)
    pub description: String,

    /// Current status
    pub status: TaskStatus,

    /// Scheduling priority
    pub priority: TaskPriority,

    /// Step name that filed the task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    /// Free-text labels, insertion-ordered and deduplicated
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Context in which the task surfaced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_during: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set on the first transition into `in_progress`, never overwritten
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abandoned_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abandoned_reason: Option<String>,
}

impl Task {
    /// Create a new pending task with a generated id.
    pub fn new(description: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            description: description.into(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            session: None,
            tags: Vec::new(),
            discovered_during: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            abandoned_at: None,
            abandoned_reason: None,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the owning session (step name).
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Set the discovery context.
    pub fn with_discovered_during(mut self, context: impl Into<String>) -> Self {
        self.discovered_during = Some(context.into());
        self
    }

    /// Set tags, deduplicating while preserving order.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        let mut seen = std::collections::HashSet::new();
        self.tags = tags.into_iter().filter(|t| seen.insert(t.clone())).collect();
        self
    }

    /// Apply a status change, maintaining the timestamp invariants.
    ///
    /// `started_at` is written only on the first transition into
    /// `in_progress`; `done` stamps `completed_at`; `abandoned` stamps
    /// `abandoned_at` and records the reason verbatim (possibly empty, which
    /// the completion gate treats as unresolved).
    pub fn apply_status(&mut self, status: TaskStatus, reason: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
        match status {
            TaskStatus::InProgress => {
                if self.started_at.is_none() {
                    self.started_at = Some(now);
                }
            }
            TaskStatus::Done => {
                self.completed_at = Some(now);
            }
            TaskStatus::Abandoned => {
                self.abandoned_at = Some(now);
                self.abandoned_reason = reason;
            }
            TaskStatus::Pending => {}
        }
    }

    /// True when the task is abandoned without a usable reason.
    pub fn abandoned_without_reason(&self) -> bool {
        self.status == TaskStatus::Abandoned
            && !self
                .abandoned_reason
                .as_deref()
                .is_some_and(|r| trimmed_non_empty(r))
    }
}

impl ledger::Record for Task {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in ["pending", "in_progress", "done", "abandoned"] {
            let status: TaskStatus = s.parse().unwrap();
            assert_eq!(status.to_string(), s);
        }
        assert!("bogus".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Low < TaskPriority::Medium);
        assert!(TaskPriority::Medium < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Critical);
    }

    #[test]
    fn test_started_at_written_once() {
        let t0 = Utc::now();
        let mut task = Task::new("write docs", t0);

        task.apply_status(TaskStatus::InProgress, None, t0 + chrono::Duration::seconds(5));
        let first_start = task.started_at.unwrap();

        task.apply_status(TaskStatus::Pending, None, t0 + chrono::Duration::seconds(10));
        task.apply_status(TaskStatus::InProgress, None, t0 + chrono::Duration::seconds(20));
        assert_eq!(task.started_at.unwrap(), first_start);
    }

    #[test]
    fn test_done_stamps_completed_at() {
        let t0 = Utc::now();
        let mut task = Task::new("ship it", t0);

        task.apply_status(TaskStatus::Done, None, t0);
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_abandoned_without_reason() {
        let t0 = Utc::now();
        let mut task = Task::new("maybe later", t0);

        task.apply_status(TaskStatus::Abandoned, None, t0);
        assert!(task.abandoned_without_reason());

        task.apply_status(TaskStatus::Abandoned, Some("  ".to_string()), t0);
        assert!(task.abandoned_without_reason());

        task.apply_status(TaskStatus::Abandoned, Some("superseded by #42".to_string()), t0);
        assert!(!task.abandoned_without_reason());
    }

    #[test]
    fn test_tags_deduplicated_in_order() {
        let task = Task::new("tagged", Utc::now()).with_tags(vec![
            "infra".to_string(),
            "ci".to_string(),
            "infra".to_string(),
        ]);
        assert_eq!(task.tags, vec!["infra".to_string(), "ci".to_string()]);
    }

    #[test]
    fn test_serde_omits_unset_optionals() {
        let task = Task::new("lean wire format", Utc::now());
        let json = serde_json::to_string(&task).unwrap();

        assert!(!json.contains("started_at"));
        assert!(!json.contains("abandoned_reason"));

        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }
}
