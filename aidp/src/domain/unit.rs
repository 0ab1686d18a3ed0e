//! Scheduler units: definitions, results, and the routing table between them

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a deterministic unit does when it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Shell command through the external command runner
    #[default]
    Command,
    /// Sleep for `interval_seconds`, optionally waking on an event
    Wait,
}

/// Outcome status of a unit run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Success,
    Failure,
    Waiting,
    Event,
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Waiting => write!(f, "waiting"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// Routing table from a deterministic unit's status to the next unit name.
///
/// YAML accepts `if_pass`/`if_fail` as aliases for `success`/`failure`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NextMap {
    #[serde(default, alias = "if_pass", skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,

    #[serde(default, alias = "if_fail", skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    #[serde(default, rename = "else", skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<String>,
}

impl NextMap {
    /// Resolve the target for a status, falling back to `else`.
    pub fn resolve(&self, status: UnitStatus) -> Option<&str> {
        let keyed = match status {
            UnitStatus::Success => self.success.as_deref(),
            UnitStatus::Failure => self.failure.as_deref(),
            UnitStatus::Event => self.event.as_deref(),
            UnitStatus::Waiting => None,
        };
        keyed.or(self.otherwise.as_deref())
    }

    /// True when no route is configured at all.
    pub fn is_empty(&self) -> bool {
        self.success.is_none() && self.failure.is_none() && self.event.is_none() && self.otherwise.is_none()
    }
}

/// Configuration of one deterministic unit
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UnitDefinition {
    /// Unit name (keyed in the units config; set during config load)
    #[serde(default)]
    pub name: String,

    #[serde(default, rename = "type")]
    pub kind: UnitKind,

    /// Command line, required for `command` units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Artifact destination, relative to the project root
    #[serde(default, rename = "output_file", skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,

    /// Cooldown between runs, in seconds
    #[serde(default, rename = "min_interval_seconds")]
    pub min_interval_seconds: u64,

    /// Routing to the unit that runs after this one
    #[serde(default, skip_serializing_if = "NextMap::is_empty")]
    pub next: NextMap,

    /// Free-form settings (e.g. wait `interval_seconds`)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl UnitDefinition {
    /// Wait interval for `wait` units, from `metadata.interval_seconds`.
    pub fn wait_interval_seconds(&self) -> u64 {
        self.metadata
            .get("interval_seconds")
            .and_then(|v| v.as_u64())
            .unwrap_or(1)
    }
}

/// What the scheduler hands back: either call the agent or run a definition
#[derive(Debug, Clone, PartialEq)]
pub enum Unit {
    /// Invoke the external agent under the given unit name
    Agentic { name: String },
    /// Run a configured deterministic unit
    Deterministic { definition: UnitDefinition },
}

impl Unit {
    /// Name of the unit regardless of kind.
    pub fn name(&self) -> &str {
        match self {
            Self::Agentic { name } => name,
            Self::Deterministic { definition } => &definition.name,
        }
    }

    /// True for agentic units.
    pub fn is_agentic(&self) -> bool {
        matches!(self, Self::Agentic { .. })
    }
}

impl PartialEq for UnitDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Result of running one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitResult {
    pub name: String,
    pub status: UnitStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,

    /// Free map: exit status, stderr excerpt, error text, ...
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, serde_json::Value>,
}

impl UnitResult {
    /// Build a result with the given status and no extra data.
    pub fn new(name: impl Into<String>, status: UnitStatus, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            status,
            started_at,
            finished_at,
            output_path: None,
            data: HashMap::new(),
        }
    }

    /// Attach one data entry.
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}
