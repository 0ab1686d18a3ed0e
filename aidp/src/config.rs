//! aidp configuration types and loading
//!
//! Configuration lives at `<project>/.aidp/aidp.yml`. Every section defaults,
//! so a partial (or absent) file still yields a working setup.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::UnitDefinition;
use crate::guard::GuardConfig;

/// Config file name under `.aidp/`.
pub const CONFIG_FILE: &str = "aidp.yml";

/// Main aidp configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Harness limits and gates
    pub harness: HarnessConfig,

    /// Agent provider settings
    pub provider: ProviderConfig,

    /// Thinking-depth tiers for model selection
    pub thinking: ThinkingConfig,

    /// Work-loop units, defaults, and post-agent commands
    #[serde(rename = "work_loop")]
    pub work_loop: WorkLoopConfig,

    /// File-scope and change-size guards
    pub guard: GuardConfig,
}

impl Config {
    /// Load configuration with a fallback chain: explicit path, then the
    /// project's `.aidp/aidp.yml`, then the user config dir, then defaults.
    pub fn load(explicit: Option<&PathBuf>, project_dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = project_dir.join(".aidp").join(CONFIG_FILE);
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", project_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("aidp").join(CONFIG_FILE);
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.finalize();
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Patch derived fields after deserialization (unit names from map keys).
    pub fn finalize(&mut self) {
        for (name, definition) in self.work_loop.units.iter_mut() {
            definition.name = name.clone();
        }
    }
}

/// Harness limits and completion gating
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Maximum work-loop iterations before a terminal error
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    /// Gate `done` on the task ledger being fully resolved
    #[serde(rename = "task-completion-required")]
    pub task_completion_required: bool,

    /// Style-guide file read for the periodic reminder
    #[serde(rename = "style-guide", skip_serializing_if = "Option::is_none")]
    pub style_guide: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            task_completion_required: false,
            style_guide: None,
        }
    }
}

/// Agent provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider name (informational; the provider itself is injected)
    pub name: String,

    /// Whether the provider reads a repo-local instruction file on its own
    #[serde(rename = "instruction-file")]
    pub instruction_file: bool,

    /// Free-form provider settings passed through on each call
    pub settings: HashMap<String, String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "claude".to_string(),
            instruction_file: false,
            settings: HashMap::new(),
        }
    }
}

/// Thinking-depth tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThinkingConfig {
    /// Ordered tiers, shallowest first
    pub tiers: Vec<String>,

    /// Tier used when none is selected
    #[serde(rename = "default")]
    pub default_tier: String,

    /// Highest tier `/thinking set` may select
    #[serde(rename = "max")]
    pub max_tier: String,
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                "minimal".to_string(),
                "standard".to_string(),
                "deep".to_string(),
                "max".to_string(),
            ],
            default_tier: "standard".to_string(),
            max_tier: "deep".to_string(),
        }
    }
}

/// Phase in which a post-agent command runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommandPhase {
    /// After every iteration
    #[default]
    EachUnit,
    /// Only once the agent signals completion
    OnCompletion,
}

/// Category a post-agent command reports under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommandCategory {
    #[default]
    Tests,
    Lints,
    Formatters,
    Builds,
    Docs,
}

impl std::fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tests => write!(f, "tests"),
            Self::Lints => write!(f, "lints"),
            Self::Formatters => write!(f, "formatters"),
            Self::Builds => write!(f, "builds"),
            Self::Docs => write!(f, "docs"),
        }
    }
}

/// One post-agent command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostCommand {
    pub name: String,
    pub command: String,

    #[serde(default)]
    pub phase: CommandPhase,

    #[serde(default)]
    pub category: CommandCategory,

    /// Required commands gate the pass/fail verdict; optional ones only report
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// Named fallback units for the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkLoopDefaults {
    /// Agentic unit scheduled when no rule fires
    pub primary: String,

    /// Agentic fallback (the decider) when a requested unit is unavailable
    #[serde(rename = "fallback_agentic")]
    pub fallback_agentic: String,

    /// Unit scheduled once the decider cap trips (typically a wait)
    #[serde(rename = "on_no_next_step")]
    pub on_no_next_step: String,
}

impl Default for WorkLoopDefaults {
    fn default() -> Self {
        Self {
            primary: "implement_next".to_string(),
            fallback_agentic: "decide_whats_next".to_string(),
            on_no_next_step: "wait_for_input".to_string(),
        }
    }
}

/// Work-loop section of the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkLoopConfig {
    /// Deterministic unit definitions, keyed by name
    pub units: HashMap<String, UnitDefinition>,

    pub defaults: WorkLoopDefaults,

    /// Cap on consecutive decider turns
    #[serde(rename = "max_consecutive_deciders")]
    pub max_consecutive_deciders: u32,

    /// Recent-results window exposed for prompt templating
    #[serde(rename = "context_window")]
    pub context_window: usize,

    /// Post-agent commands, run in listed order per phase
    pub commands: Vec<PostCommand>,
}

impl Default for WorkLoopConfig {
    fn default() -> Self {
        Self {
            units: HashMap::new(),
            defaults: WorkLoopDefaults::default(),
            max_consecutive_deciders: 2,
            context_window: 5,
            commands: Vec::new(),
        }
    }
}
