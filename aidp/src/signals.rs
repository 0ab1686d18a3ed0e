//! Structured directives extracted from agent text output
//!
//! Agents steer the loop with plain-text markers: `NEXT_UNIT: name`,
//! `File task: "..."`, `Update task: <id> status: <enum>`, and
//! `STATUS: COMPLETE`. Parsing is case-insensitive and tolerant of
//! surrounding prose; anything that does not match is ignored.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{TaskPriority, TaskStatus};

static NEXT_UNIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:NEXT_UNIT|NEXT_STEP)\s*[:=]\s*([A-Za-z0-9][A-Za-z0-9_-]*)").unwrap());

static FILE_TASK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?i)\bFile task:\s*"([^"]+)""#).unwrap());

static PRIORITY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bpriority:\s*([a-z]+)").unwrap());

static TAGS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\btags:\s*([A-Za-z0-9_,\- ]+)").unwrap());

static UPDATE_TASK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bUpdate task:\s*(\S+)\s+status:\s*([a-z_]+)(?:\s+reason:\s*"([^"]*)")?"#).unwrap()
});

static COMPLETE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bSTATUS:\s*COMPLETE\b").unwrap());

/// A `File task:` directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFiling {
    pub description: String,
    pub priority: TaskPriority,
    pub tags: Vec<String>,
}

/// An `Update task:` directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    pub id: String,
    pub status: TaskStatus,
    pub reason: Option<String>,
}

/// First `NEXT_UNIT`/`NEXT_STEP` target named in the text, if any.
pub fn extract_next_unit(text: &str) -> Option<String> {
    NEXT_UNIT_RE
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
}

/// All `File task:` directives, one per matching line.
///
/// `priority:` defaults to medium and `tags:` to empty; unknown priority
/// values fall back to the default rather than dropping the filing.
pub fn parse_task_filings(text: &str) -> Vec<TaskFiling> {
    let mut filings = Vec::new();
    for line in text.lines() {
        let Some(caps) = FILE_TASK_RE.captures(line) else {
            continue;
        };
        let rest = &line[caps.get(0).map(|m| m.end()).unwrap_or(0)..];

        let priority = PRIORITY_RE
            .captures(rest)
            .and_then(|c| TaskPriority::from_str(&c[1]).ok())
            .unwrap_or_default();

        let tags = TAGS_RE
            .captures(rest)
            .map(|c| {
                c[1].split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        filings.push(TaskFiling {
            description: caps[1].trim().to_string(),
            priority,
            tags,
        });
    }
    filings
}

/// All `Update task:` directives with a valid status.
pub fn parse_task_updates(text: &str) -> Vec<TaskUpdate> {
    UPDATE_TASK_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let status = TaskStatus::from_str(&caps[2]).ok()?;
            Some(TaskUpdate {
                id: caps[1].to_string(),
                status,
                reason: caps.get(3).map(|m| m.as_str().to_string()),
            })
        })
        .collect()
}

/// True iff the agent declared the step complete.
pub fn agent_marked_complete(text: &str) -> bool {
    COMPLETE_RE.is_match(text)
}
