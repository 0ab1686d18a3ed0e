//! File-scope and change-size guard policy
//!
//! Consulted before accepting agent-produced edits: exclusion always wins,
//! inclusion (when configured) must match, and confirm-patterns hold a file
//! back until the user confirms it for the session. `validate_changes`
//! bounds the total diff size per iteration.

mod pattern;

pub use pattern::matches_pattern;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable that short-circuits enforcement.
pub const BYPASS_ENV: &str = "AIDP_BYPASS_GUARDS";

/// Guard section of `aidp.yml`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuardConfig {
    pub enabled: bool,

    /// When non-empty, a file must match one of these to be editable
    pub include: Vec<String>,

    /// Files matching any of these are never editable
    pub exclude: Vec<String>,

    /// Files matching any of these need a per-session confirmation
    pub confirm: Vec<String>,

    /// Cap on additions+deletions per iteration
    #[serde(rename = "max_lines_per_commit", skip_serializing_if = "Option::is_none")]
    pub max_lines_per_commit: Option<usize>,

    /// Config-level opt-out of enforcement
    pub bypass: bool,
}

/// Error kinds for guard violations
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("Change too large: {lines} lines exceeds the {max}-line limit")]
    ChangeTooLarge { lines: usize, max: usize },

    #[error("File is excluded by guard policy: {0}")]
    ExcludedFile(String),

    #[error("Unknown guard setting: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Verdict for a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub requires_confirmation: bool,
}

impl FileDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            requires_confirmation: false,
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            requires_confirmation: false,
        }
    }

    fn needs_confirmation(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            requires_confirmation: true,
        }
    }
}

/// Per-file diff statistics fed into [`GuardPolicy::validate_changes`].
#[derive(Debug, Clone)]
pub struct DiffStat {
    pub path: String,
    pub additions: usize,
    pub deletions: usize,
}

/// The active guard policy plus its runtime confirmed-files set.
pub struct GuardPolicy {
    config: GuardConfig,
    confirmed: HashSet<String>,
    env_bypass: bool,
}

impl GuardPolicy {
    /// Build from config; `env_bypass` is the `AIDP_BYPASS_GUARDS` check,
    /// read once at wiring time and injected here.
    pub fn new(config: GuardConfig, env_bypass: bool) -> Self {
        Self {
            config,
            confirmed: HashSet::new(),
            env_bypass,
        }
    }

    /// True when enforcement is switched off (env var or config opt-out).
    pub fn bypass(&self) -> bool {
        self.env_bypass || self.config.bypass
    }

    /// Decide whether the agent may modify `path`.
    pub fn can_modify_file(&self, path: &str) -> FileDecision {
        if !self.config.enabled || self.bypass() {
            return FileDecision::allow();
        }

        if let Some(pattern) = self.matching_pattern(&self.config.exclude, path) {
            debug!(%path, %pattern, "can_modify_file: excluded");
            return FileDecision::deny(format!("matches exclude pattern `{}`", pattern));
        }

        if !self.config.include.is_empty() && self.matching_pattern(&self.config.include, path).is_none() {
            debug!(%path, "can_modify_file: outside include set");
            return FileDecision::deny("does not match any include pattern".to_string());
        }

        if let Some(pattern) = self.matching_pattern(&self.config.confirm, path) {
            if !self.confirmed.contains(path) {
                debug!(%path, %pattern, "can_modify_file: confirmation required");
                return FileDecision::needs_confirmation(format!(
                    "matches confirm pattern `{}` and has not been confirmed",
                    pattern
                ));
            }
        }

        FileDecision::allow()
    }

    /// Record a user confirmation for `path`, lasting for this session.
    pub fn confirm_file(&mut self, path: impl Into<String>) {
        self.confirmed.insert(path.into());
    }

    /// Check an iteration's diff against the line budget and exclusions.
    pub fn validate_changes(&self, stats: &[DiffStat]) -> Result<(), GuardError> {
        if !self.config.enabled || self.bypass() {
            return Ok(());
        }

        for stat in stats {
            if self.matching_pattern(&self.config.exclude, &stat.path).is_some() {
                return Err(GuardError::ExcludedFile(stat.path.clone()));
            }
        }

        if let Some(max) = self.config.max_lines_per_commit {
            let lines: usize = stats.iter().map(|s| s.additions + s.deletions).sum();
            if lines > max {
                return Err(GuardError::ChangeTooLarge { lines, max });
            }
        }

        Ok(())
    }

    /// Apply a `key=value` update from the REPL.
    ///
    /// Updates land even while bypass is active; bypass suppresses
    /// enforcement, not policy edits.
    pub fn apply_update(&mut self, key: &str, value: &str) -> Result<(), GuardError> {
        debug!(%key, %value, "GuardPolicy::apply_update");
        match key {
            "enabled" => {
                self.config.enabled = parse_bool(key, value)?;
            }
            "bypass" => {
                self.config.bypass = parse_bool(key, value)?;
            }
            "max_lines_per_commit" => {
                if value.is_empty() || value == "none" {
                    self.config.max_lines_per_commit = None;
                } else {
                    let max = value.parse().map_err(|_| GuardError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                    })?;
                    self.config.max_lines_per_commit = Some(max);
                }
            }
            "include" => self.config.include = parse_list(value),
            "exclude" => self.config.exclude = parse_list(value),
            "confirm" => self.config.confirm = parse_list(value),
            _ => return Err(GuardError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Current config (for status displays).
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Replace the config wholesale (config reload), keeping the session's
    /// confirmed-files set.
    pub fn set_config(&mut self, config: GuardConfig) {
        self.config = config;
    }

    fn matching_pattern<'a>(&self, patterns: &'a [String], path: &str) -> Option<&'a str> {
        patterns
            .iter()
            .find(|p| matches_pattern(p, path))
            .map(|p| p.as_str())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, GuardError> {
    match value.to_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(GuardError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
