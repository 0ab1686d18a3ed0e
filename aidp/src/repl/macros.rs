//! Slash-command macro interpreter
//!
//! Parses `/`-prefixed REPL input into structured actions and mutates the
//! session's constraints (pins, focus, halt patterns, split mode, thinking
//! tier, current workstream). Failures come back as `{success: false}` with
//! a usage message; nothing here raises.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use regex::RegexBuilder;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::config::{CONFIG_FILE, ThinkingConfig};
use crate::domain::{InstructionKind, InstructionPriority};
use crate::exec::VcsDriver;
use crate::guard::matches_pattern;
use crate::skills;
use crate::thinking::ThinkingTiers;
use crate::workstream::{WorkstreamManager, valid_slug};

/// Structured action attached to every macro outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    UpdateConstraints,
    SplitWork,
    PauseWorkLoop,
    ResumeWorkLoop,
    CancelWorkLoop,
    EnqueueInstruction,
    UpdateGuard,
    ReloadConfig,
    RollbackCommits,
    Workstream,
    Skill,
    Tools,
    Thinking,
    Status,
    Reset,
    Help,
    None,
}

/// Result of executing one macro
#[derive(Debug, Clone, Serialize)]
pub struct MacroOutcome {
    pub success: bool,
    pub message: String,
    pub action: Action,
    pub data: serde_json::Value,
}

impl MacroOutcome {
    fn ok(message: impl Into<String>, action: Action, data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            action,
            data,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            action: Action::None,
            data: serde_json::Value::Null,
        }
    }
}

/// The interpreter plus all session-scoped constraint state.
pub struct ReplMacroInterpreter {
    project_dir: PathBuf,
    workstreams: Arc<WorkstreamManager>,
    vcs: Arc<dyn VcsDriver>,
    pinned: BTreeSet<String>,
    focus: Vec<String>,
    halt_patterns: Vec<String>,
    split_mode: bool,
    thinking: ThinkingTiers,
    current_workstream: Option<String>,
}

impl ReplMacroInterpreter {
    pub fn new(
        project_dir: impl Into<PathBuf>,
        workstreams: Arc<WorkstreamManager>,
        vcs: Arc<dyn VcsDriver>,
        thinking: &ThinkingConfig,
    ) -> Self {
        Self {
            project_dir: project_dir.into(),
            workstreams,
            vcs,
            pinned: BTreeSet::new(),
            focus: Vec::new(),
            halt_patterns: Vec::new(),
            split_mode: false,
            thinking: ThinkingTiers::from_config(thinking),
            current_workstream: None,
        }
    }

    /// Working directory implied by the current workstream.
    pub fn current_path(&self) -> PathBuf {
        match &self.current_workstream {
            Some(slug) => self
                .workstreams
                .switch_path(slug)
                .unwrap_or_else(|_| self.project_dir.clone()),
            None => self.project_dir.clone(),
        }
    }

    /// Currently selected workstream slug.
    pub fn current_workstream(&self) -> Option<&str> {
        self.current_workstream.as_deref()
    }

    /// Selected thinking tier, for wiring into the engine.
    pub fn thinking_tier(&self) -> &str {
        self.thinking.current()
    }

    /// Pinned path patterns.
    pub fn pinned(&self) -> &BTreeSet<String> {
        &self.pinned
    }

    /// Execute one line of REPL input.
    pub async fn execute(&mut self, input: &str) -> MacroOutcome {
        let input = input.trim();
        if input.is_empty() {
            return MacroOutcome::fail("Empty command. Type /help for usage.");
        }
        if !input.starts_with('/') {
            return MacroOutcome::fail("Commands start with '/'. Type /help for usage.");
        }

        let tokens = tokenize(input);
        let command = tokens[0].as_str();
        let args = &tokens[1..];
        debug!(%command, args = args.len(), "ReplMacroInterpreter::execute");

        match command {
            "/pin" => self.cmd_pin(args),
            "/unpin" => self.cmd_unpin(args),
            "/focus" => self.cmd_focus(args),
            "/unfocus" => self.cmd_unfocus(),
            "/halt-on" => self.cmd_halt_on(args),
            "/unhalt" => self.cmd_unhalt(args),
            "/split" => self.cmd_split(),
            "/pause" => MacroOutcome::ok("Pausing work loop.", Action::PauseWorkLoop, json!({})),
            "/resume" => MacroOutcome::ok("Resuming work loop.", Action::ResumeWorkLoop, json!({})),
            "/cancel" => self.cmd_cancel(args),
            "/inject" => self.cmd_inject(args),
            "/merge" => self.cmd_merge(args),
            "/update" => self.cmd_update(args),
            "/reload" => self.cmd_reload(args),
            "/rollback" => self.cmd_rollback(args).await,
            "/undo" => self.cmd_undo(args).await,
            "/ws" => self.cmd_ws(args).await,
            "/skill" => self.cmd_skill(args),
            "/tools" => self.cmd_tools(args),
            "/thinking" => self.cmd_thinking(args),
            "/status" => self.cmd_status(),
            "/reset" => self.cmd_reset(),
            "/help" => self.cmd_help(args),
            _ => MacroOutcome::fail(format!("Unknown command {}. Type /help for usage.", command)),
        }
    }

    fn cmd_pin(&mut self, args: &[String]) -> MacroOutcome {
        if args.is_empty() {
            return MacroOutcome::fail("Usage: /pin <pattern...>");
        }
        let mut added = Vec::new();
        for arg in args {
            let normalized = normalize_path(arg);
            if self.pinned.insert(normalized.clone()) {
                added.push(normalized);
            }
        }
        MacroOutcome::ok(
            format!("Pinned {} pattern(s); {} total.", added.len(), self.pinned.len()),
            Action::UpdateConstraints,
            json!({ "added": added, "pinned": self.pinned }),
        )
    }

    fn cmd_unpin(&mut self, args: &[String]) -> MacroOutcome {
        if args.is_empty() {
            return MacroOutcome::fail("Usage: /unpin <pattern...>");
        }
        let mut removed = Vec::new();
        for arg in args {
            let normalized = normalize_path(arg);
            // Exact entries first, then pattern matches against the pins.
            if self.pinned.remove(&normalized) {
                removed.push(normalized);
                continue;
            }
            let matching: Vec<String> = self
                .pinned
                .iter()
                .filter(|p| matches_pattern(&normalized, p))
                .cloned()
                .collect();
            for m in matching {
                self.pinned.remove(&m);
                removed.push(m);
            }
        }
        if removed.is_empty() {
            return MacroOutcome::fail("No pinned patterns matched.");
        }
        MacroOutcome::ok(
            format!("Unpinned {} pattern(s).", removed.len()),
            Action::UpdateConstraints,
            json!({ "removed": removed, "pinned": self.pinned }),
        )
    }

    fn cmd_focus(&mut self, args: &[String]) -> MacroOutcome {
        if args.len() != 1 {
            return MacroOutcome::fail("Usage: /focus <pattern>");
        }
        let pattern = normalize_path(&args[0]);
        self.focus.push(pattern.clone());
        MacroOutcome::ok(
            format!("Focusing on {}.", pattern),
            Action::UpdateConstraints,
            json!({ "focus": self.focus }),
        )
    }

    fn cmd_unfocus(&mut self) -> MacroOutcome {
        let cleared = self.focus.len();
        self.focus.clear();
        MacroOutcome::ok(
            format!("Cleared {} focus pattern(s).", cleared),
            Action::UpdateConstraints,
            json!({ "focus": [] }),
        )
    }

    fn cmd_halt_on(&mut self, args: &[String]) -> MacroOutcome {
        if args.is_empty() {
            return MacroOutcome::fail("Usage: /halt-on <regex>");
        }
        let pattern = args.join(" ");
        if let Err(e) = RegexBuilder::new(&pattern).case_insensitive(true).build() {
            return MacroOutcome::fail(format!("Invalid regex: {}", e));
        }
        self.halt_patterns.push(pattern.clone());
        MacroOutcome::ok(
            format!("Halting on /{}/i.", pattern),
            Action::UpdateConstraints,
            json!({ "halt_patterns": self.halt_patterns }),
        )
    }

    fn cmd_unhalt(&mut self, args: &[String]) -> MacroOutcome {
        if args.is_empty() {
            let cleared = self.halt_patterns.len();
            self.halt_patterns.clear();
            return MacroOutcome::ok(
                format!("Cleared {} halt pattern(s).", cleared),
                Action::UpdateConstraints,
                json!({ "halt_patterns": [] }),
            );
        }
        let pattern = args.join(" ");
        let before = self.halt_patterns.len();
        self.halt_patterns.retain(|p| p != &pattern);
        if self.halt_patterns.len() == before {
            return MacroOutcome::fail(format!("No halt pattern matches /{}/.", pattern));
        }
        MacroOutcome::ok(
            format!("Removed halt pattern /{}/.", pattern),
            Action::UpdateConstraints,
            json!({ "halt_patterns": self.halt_patterns }),
        )
    }

    fn cmd_split(&mut self) -> MacroOutcome {
        self.split_mode = !self.split_mode;
        MacroOutcome::ok(
            format!("Split mode {}.", if self.split_mode { "on" } else { "off" }),
            Action::SplitWork,
            json!({ "split": self.split_mode }),
        )
    }

    fn cmd_cancel(&self, args: &[String]) -> MacroOutcome {
        let save_checkpoint = !args.iter().any(|a| a == "--no-checkpoint");
        MacroOutcome::ok(
            "Cancelling work loop.",
            Action::CancelWorkLoop,
            json!({ "save_checkpoint": save_checkpoint }),
        )
    }

    fn cmd_inject(&self, args: &[String]) -> MacroOutcome {
        let (text_args, priority) = match split_priority_flag(args) {
            Ok(parts) => parts,
            Err(message) => return MacroOutcome::fail(message),
        };
        if text_args.is_empty() {
            return MacroOutcome::fail("Usage: /inject <text> [--priority critical|high|normal|low]");
        }
        let content = text_args.join(" ");
        MacroOutcome::ok(
            format!("Queued instruction ({}).", priority),
            Action::EnqueueInstruction,
            json!({
                "content": content,
                "type": InstructionKind::UserInput,
                "priority": priority.to_string(),
            }),
        )
    }

    fn cmd_merge(&self, args: &[String]) -> MacroOutcome {
        if args.is_empty() {
            return MacroOutcome::fail("Usage: /merge <text>");
        }
        let content = args.join(" ");
        MacroOutcome::ok(
            "Queued plan update (high priority).",
            Action::EnqueueInstruction,
            json!({
                "content": content,
                "type": InstructionKind::PlanUpdate,
                "priority": InstructionPriority::High.to_string(),
            }),
        )
    }

    fn cmd_update(&self, args: &[String]) -> MacroOutcome {
        match args.first().map(String::as_str) {
            Some("guard") => {}
            _ => return MacroOutcome::fail("Usage: /update guard <key>=<value>"),
        }
        let Some(assignment) = args.get(1) else {
            return MacroOutcome::fail("Usage: /update guard <key>=<value>");
        };
        let Some((key, value)) = assignment.split_once('=') else {
            return MacroOutcome::fail("Usage: /update guard <key>=<value>");
        };
        MacroOutcome::ok(
            format!("Guard update queued: {}={}.", key, value),
            Action::UpdateGuard,
            json!({ "key": key, "value": value }),
        )
    }

    fn cmd_reload(&self, args: &[String]) -> MacroOutcome {
        if args.first().map(String::as_str) != Some("config") {
            return MacroOutcome::fail("Usage: /reload config");
        }
        MacroOutcome::ok("Config reload queued.", Action::ReloadConfig, json!({}))
    }

    async fn cmd_rollback(&self, args: &[String]) -> MacroOutcome {
        let Some(count_arg) = args.first() else {
            return MacroOutcome::fail("Usage: /rollback <n>");
        };
        let count: u32 = match count_arg.parse() {
            Ok(n) if n > 0 => n,
            _ => return MacroOutcome::fail("Usage: /rollback <n> (n must be a positive integer)"),
        };
        self.rollback_outcome(count).await
    }

    async fn cmd_undo(&self, args: &[String]) -> MacroOutcome {
        if args.first().map(String::as_str) != Some("last") {
            return MacroOutcome::fail("Usage: /undo last");
        }
        self.rollback_outcome(1).await
    }

    async fn rollback_outcome(&self, count: u32) -> MacroOutcome {
        let repo = self.current_path();
        let current = match self.vcs.current_branch(&repo).await {
            Ok(branch) => branch,
            Err(e) => return MacroOutcome::fail(format!("Cannot determine current branch: {}", e)),
        };
        let default = match self.vcs.default_branch(&repo).await {
            Ok(branch) => branch,
            Err(e) => return MacroOutcome::fail(format!("Cannot determine default branch: {}", e)),
        };
        if current == default {
            return MacroOutcome::fail(format!(
                "Refusing to rollback on the default branch ({}). Switch to a workstream first.",
                default
            ));
        }
        MacroOutcome::ok(
            format!("Rolling back {} commit(s) on {}.", count, current),
            Action::RollbackCommits,
            json!({ "count": count, "branch": current }),
        )
    }

    async fn cmd_ws(&mut self, args: &[String]) -> MacroOutcome {
        match args.first().map(String::as_str) {
            Some("list") => {
                let streams = self.workstreams.list();
                let listing: Vec<serde_json::Value> = streams
                    .iter()
                    .map(|w| {
                        json!({
                            "slug": w.slug,
                            "branch": w.branch,
                            "path": w.path,
                            "current": Some(w.slug.as_str()) == self.current_workstream.as_deref(),
                        })
                    })
                    .collect();
                MacroOutcome::ok(
                    format!("{} workstream(s).", streams.len()),
                    Action::Workstream,
                    json!({ "op": "list", "workstreams": listing }),
                )
            }
            Some("new") => {
                let Some(slug) = args.get(1) else {
                    return MacroOutcome::fail("Usage: /ws new <slug> [base-branch]");
                };
                if !valid_slug(slug) {
                    return MacroOutcome::fail(format!(
                        "Invalid slug `{}`: must match ^[a-z0-9][a-z0-9-]*$",
                        slug
                    ));
                }
                match self.workstreams.create(slug, args.get(2).map(String::as_str)).await {
                    Ok(ws) => MacroOutcome::ok(
                        format!("Created workstream {} on {}.", ws.slug, ws.branch),
                        Action::Workstream,
                        json!({ "op": "new", "slug": ws.slug, "path": ws.path }),
                    ),
                    Err(e) => MacroOutcome::fail(e.to_string()),
                }
            }
            Some("switch") => {
                let Some(slug) = args.get(1) else {
                    return MacroOutcome::fail("Usage: /ws switch <slug>");
                };
                match self.workstreams.switch_path(slug) {
                    Ok(path) => {
                        self.current_workstream = Some(slug.clone());
                        MacroOutcome::ok(
                            format!("Switched to workstream {} ({}).", slug, path.display()),
                            Action::Workstream,
                            json!({ "op": "switch", "slug": slug, "path": path }),
                        )
                    }
                    Err(e) => MacroOutcome::fail(e.to_string()),
                }
            }
            Some("rm") => {
                let Some(slug) = args.get(1) else {
                    return MacroOutcome::fail("Usage: /ws rm <slug> [--delete-branch]");
                };
                if Some(slug.as_str()) == self.current_workstream.as_deref() {
                    return MacroOutcome::fail(format!(
                        "Cannot remove the current workstream ({}). Switch away first.",
                        slug
                    ));
                }
                let delete_branch = args.iter().any(|a| a == "--delete-branch");
                match self.workstreams.remove(slug, delete_branch).await {
                    Ok(()) => MacroOutcome::ok(
                        format!("Removed workstream {}.", slug),
                        Action::Workstream,
                        json!({ "op": "rm", "slug": slug }),
                    ),
                    Err(e) => MacroOutcome::fail(e.to_string()),
                }
            }
            Some("status") => MacroOutcome::ok(
                match &self.current_workstream {
                    Some(slug) => format!("Current workstream: {} ({}).", slug, self.current_path().display()),
                    None => "No workstream selected; working at the project root.".to_string(),
                },
                Action::Workstream,
                json!({ "op": "status", "current": self.current_workstream }),
            ),
            Some("pause") => MacroOutcome::ok(
                "Pausing work loop for the current workstream.",
                Action::PauseWorkLoop,
                json!({ "workstream": self.current_workstream }),
            ),
            _ => MacroOutcome::fail("Usage: /ws list|new|switch|rm|status|pause"),
        }
    }

    fn cmd_skill(&self, args: &[String]) -> MacroOutcome {
        match args.first().map(String::as_str) {
            Some("use") | Some("show") => {
                let verb = args[0].as_str();
                let Some(id) = args.get(1) else {
                    return MacroOutcome::fail(format!("Usage: /skill {} <id>", verb));
                };
                match skills::load(&self.project_dir, id) {
                    Ok(pack) => MacroOutcome::ok(
                        format!(
                            "{} skill {}{}.",
                            if verb == "use" { "Loaded" } else { "Showing" },
                            pack.id,
                            if pack.meta.name.is_empty() {
                                String::new()
                            } else {
                                format!(" ({})", pack.meta.name)
                            }
                        ),
                        Action::Skill,
                        json!({
                            "op": verb,
                            "id": pack.id,
                            "name": pack.meta.name,
                            "body": pack.body,
                        }),
                    ),
                    Err(e) => MacroOutcome::fail(e.to_string()),
                }
            }
            Some("list") => {
                let packs = skills::list(&self.project_dir);
                let listing: Vec<serde_json::Value> = packs
                    .iter()
                    .map(|p| json!({ "id": p.id, "name": p.meta.name, "description": p.meta.description }))
                    .collect();
                MacroOutcome::ok(
                    format!("{} skill(s) available.", packs.len()),
                    Action::Skill,
                    json!({ "op": "list", "skills": listing }),
                )
            }
            Some("search") => {
                let Some(term) = args.get(1) else {
                    return MacroOutcome::fail("Usage: /skill search <term>");
                };
                let packs = skills::search(&self.project_dir, term);
                let ids: Vec<&str> = packs.iter().map(|p| p.id.as_str()).collect();
                MacroOutcome::ok(
                    format!("{} skill(s) match.", packs.len()),
                    Action::Skill,
                    json!({ "op": "search", "ids": ids }),
                )
            }
            _ => MacroOutcome::fail("Usage: /skill use|list|show|search"),
        }
    }

    fn cmd_tools(&self, args: &[String]) -> MacroOutcome {
        let tools = self.read_tools_section();
        match args.first().map(String::as_str) {
            Some("show") => MacroOutcome::ok(
                "Configured tools.",
                Action::Tools,
                json!({ "op": "show", "tools": tools }),
            ),
            Some("coverage") => match tools.get("coverage").and_then(|v| v.as_str()) {
                Some(command) => MacroOutcome::ok(
                    format!("Coverage command: {}", command),
                    Action::Tools,
                    json!({ "op": "coverage", "command": command }),
                ),
                None => MacroOutcome::fail("No coverage command configured under tools.coverage in aidp.yml."),
            },
            Some("test") => {
                let Some(kind) = args.get(1) else {
                    return MacroOutcome::fail("Usage: /tools test <type>");
                };
                match tools.get("test").and_then(|t| t.get(kind.as_str())).and_then(|v| v.as_str()) {
                    Some(command) => MacroOutcome::ok(
                        format!("Test command ({}): {}", kind, command),
                        Action::Tools,
                        json!({ "op": "test", "type": kind, "command": command }),
                    ),
                    None => MacroOutcome::fail(format!("No tools.test.{} command configured in aidp.yml.", kind)),
                }
            }
            _ => MacroOutcome::fail("Usage: /tools show|coverage|test <type>"),
        }
    }

    fn read_tools_section(&self) -> serde_json::Value {
        let path = self.project_dir.join(".aidp").join(CONFIG_FILE);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return json!({});
        };
        let Ok(value) = serde_yaml::from_str::<serde_json::Value>(&content) else {
            return json!({});
        };
        value.get("tools").cloned().unwrap_or_else(|| json!({}))
    }

    fn cmd_thinking(&mut self, args: &[String]) -> MacroOutcome {
        match args.first().map(String::as_str) {
            Some("show") | None => MacroOutcome::ok(
                format!(
                    "Thinking tier: {} (max {}; tiers: {}).",
                    self.thinking.current(),
                    self.thinking.max(),
                    self.thinking.tiers().join(", ")
                ),
                Action::Thinking,
                json!({ "op": "show", "current": self.thinking.current(), "max": self.thinking.max() }),
            ),
            Some("set") => {
                let Some(tier) = args.get(1) else {
                    return MacroOutcome::fail("Usage: /thinking set <tier>");
                };
                match self.thinking.set(tier) {
                    Ok(selected) => {
                        let selected = selected.to_string();
                        MacroOutcome::ok(
                            format!("Thinking tier set to {}.", selected),
                            Action::Thinking,
                            json!({ "op": "set", "current": selected }),
                        )
                    }
                    Err(e) => MacroOutcome::fail(e.to_string()),
                }
            }
            Some("max") => {
                let selected = self.thinking.set_max().to_string();
                MacroOutcome::ok(
                    format!("Thinking tier set to max ({}).", selected),
                    Action::Thinking,
                    json!({ "op": "max", "current": selected }),
                )
            }
            Some("reset") => {
                let selected = self.thinking.reset().to_string();
                MacroOutcome::ok(
                    format!("Thinking tier reset to {}.", selected),
                    Action::Thinking,
                    json!({ "op": "reset", "current": selected }),
                )
            }
            _ => MacroOutcome::fail("Usage: /thinking show|set|max|reset"),
        }
    }

    fn cmd_status(&self) -> MacroOutcome {
        let message = format!(
            "pins: {} | focus: {} | halts: {} | split: {} | thinking: {} | workstream: {}",
            self.pinned.len(),
            self.focus.len(),
            self.halt_patterns.len(),
            if self.split_mode { "on" } else { "off" },
            self.thinking.current(),
            self.current_workstream.as_deref().unwrap_or("(root)"),
        );
        MacroOutcome::ok(
            message,
            Action::Status,
            json!({
                "pinned": self.pinned,
                "focus": self.focus,
                "halt_patterns": self.halt_patterns,
                "split": self.split_mode,
                "thinking": self.thinking.current(),
                "workstream": self.current_workstream,
            }),
        )
    }

    fn cmd_reset(&mut self) -> MacroOutcome {
        self.pinned.clear();
        self.focus.clear();
        self.halt_patterns.clear();
        self.split_mode = false;
        self.thinking.reset();
        self.current_workstream = None;
        MacroOutcome::ok("All macro state reset.", Action::Reset, json!({}))
    }

    fn cmd_help(&self, args: &[String]) -> MacroOutcome {
        let topic = args.first().map(String::as_str);
        let text = help_text(topic);
        MacroOutcome::ok(text, Action::Help, json!({ "topic": topic }))
    }
}

fn normalize_path(raw: &str) -> String {
    raw.trim().trim_start_matches("./").to_string()
}

/// Split off a trailing `--priority <p>` flag.
fn split_priority_flag(args: &[String]) -> Result<(Vec<String>, InstructionPriority), String> {
    let mut text = Vec::new();
    let mut priority = InstructionPriority::Normal;
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        if arg == "--priority" {
            let Some(value) = iter.next() else {
                return Err("Usage: /inject <text> [--priority critical|high|normal|low]".to_string());
            };
            priority = InstructionPriority::from_str(value)
                .map_err(|_| format!("Unknown priority `{}`; use critical|high|normal|low.", value))?;
        } else {
            text.push(arg.clone());
        }
    }
    Ok((text, priority))
}

/// Split input on whitespace, honoring double quotes.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in input.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn help_text(topic: Option<&str>) -> String {
    match topic {
        Some("pin") => "/pin <pattern...> - protect paths from modification; /unpin removes.".to_string(),
        Some("ws") => "/ws list|new <slug>|switch <slug>|rm <slug>|status|pause - manage workstreams.".to_string(),
        Some("inject") => "/inject <text> [--priority critical|high|normal|low] - queue an instruction.".to_string(),
        Some("rollback") => "/rollback <n> - discard the last n commits (never on the default branch).".to_string(),
        Some(other) => format!("No detailed help for {}; try /help.", other),
        None => "\
Commands:
  /pin <pattern...>   /unpin <pattern...>    protect paths
  /focus <pattern>    /unfocus               narrow attention
  /halt-on <regex>    /unhalt [regex]        halt triggers
  /split                                     toggle split mode
  /pause /resume /cancel [--no-checkpoint]   control the work loop
  /inject <text> [--priority p]              queue an instruction
  /merge <text>                              queue a plan update
  /update guard <key>=<value>                adjust guard policy
  /reload config                             reload aidp.yml
  /rollback <n> | /undo last                 discard commits
  /ws list|new|switch|rm|status|pause        workstreams
  /skill use|list|show|search                skill packs
  /tools show|coverage|test <type>           configured tooling
  /thinking show|set|max|reset               thinking depth
  /status /reset /help [cmd]"
            .to_string(),
    }
}
