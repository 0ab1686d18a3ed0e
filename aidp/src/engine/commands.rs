//! Post-agent command execution and failure diagnosis
//!
//! After each agent turn the engine runs the configured commands in phase
//! order and folds the results into a bag; failures are summarized into the
//! fix-forward block appended to the prompt.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::{CommandCategory, CommandPhase, PostCommand};
use crate::exec::CommandRunner;

/// How much command output is carried into the prompt.
const OUTPUT_EXCERPT_LIMIT: usize = 2_000;

/// Outcome of one post-agent command
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub name: String,
    pub command: String,
    pub category: CommandCategory,
    pub phase: CommandPhase,
    pub required: bool,
    pub success: bool,
    pub exit_status: i32,
    pub output: String,
}

/// Result bag for an iteration's command runs
#[derive(Debug, Clone, Default)]
pub struct ResultBag {
    pub outcomes: Vec<CommandOutcome>,
}

impl ResultBag {
    /// True when every required command succeeded.
    pub fn all_required_passed(&self) -> bool {
        self.outcomes.iter().filter(|o| o.required).all(|o| o.success)
    }

    /// All failing outcomes, required or not.
    pub fn failures(&self) -> Vec<&CommandOutcome> {
        self.outcomes.iter().filter(|o| !o.success).collect()
    }
}

/// Run the configured commands for this iteration.
///
/// `each_unit` commands always run; `on_completion` commands run only when
/// the agent signaled completion. Runner exceptions reduce to failing
/// outcomes, consistent with deterministic units.
pub async fn run_post_commands(
    commands: &[PostCommand],
    runner: &dyn CommandRunner,
    working_dir: &Path,
    agent_completed: bool,
) -> ResultBag {
    let mut bag = ResultBag::default();

    for spec in commands {
        let run_it = match spec.phase {
            CommandPhase::EachUnit => true,
            CommandPhase::OnCompletion => agent_completed,
        };
        if !run_it {
            continue;
        }

        debug!(name = %spec.name, command = %spec.command, "run_post_commands: running");
        let outcome = match runner.run(&spec.command, working_dir).await {
            Ok(output) => CommandOutcome {
                name: spec.name.clone(),
                command: spec.command.clone(),
                category: spec.category,
                phase: spec.phase,
                required: spec.required,
                success: output.success(),
                exit_status: output.exit_status,
                output: excerpt(if output.success() || !output.stdout.is_empty() {
                    &output.stdout
                } else {
                    &output.stderr
                }),
            },
            Err(e) => {
                warn!(name = %spec.name, error = %e, "Post-agent command raised");
                CommandOutcome {
                    name: spec.name.clone(),
                    command: spec.command.clone(),
                    category: spec.category,
                    phase: spec.phase,
                    required: spec.required,
                    success: false,
                    exit_status: -1,
                    output: excerpt(&e.to_string()),
                }
            }
        };
        bag.outcomes.push(outcome);
    }

    bag
}

/// Group failing commands by category and summarize counts and names.
pub fn diagnose_failures(bag: &ResultBag) -> String {
    let mut by_category: BTreeMap<String, Vec<&CommandOutcome>> = BTreeMap::new();
    for outcome in bag.failures() {
        by_category.entry(outcome.category.to_string()).or_default().push(outcome);
    }

    if by_category.is_empty() {
        return "No failing commands.".to_string();
    }

    let mut lines = Vec::new();
    for (category, outcomes) in &by_category {
        let names: Vec<&str> = outcomes.iter().map(|o| o.name.as_str()).collect();
        lines.push(format!("{}: {} failing ({})", category, outcomes.len(), names.join(", ")));
    }
    lines.join("\n")
}

/// Build the "Fix-Forward Iteration N" block appended to the prompt after a
/// failing iteration.
pub fn build_fix_forward_block(
    iteration: u32,
    bag: &ResultBag,
    diagnostic: &str,
    style_reminder: Option<&str>,
) -> String {
    let mut block = String::new();
    block.push_str(&format!("\n## Fix-Forward Iteration {}\n\n", iteration));
    block.push_str("Fix-forward: repair the failures below in place. Do not rollback, revert, or reset any work.\n\n");

    block.push_str("### Diagnostic\n\n");
    block.push_str(diagnostic);
    block.push('\n');

    for outcome in bag.failures() {
        block.push_str(&format!(
            "\n### {} (`{}`, exit {})\n\n```\n{}\n```\n",
            outcome.name, outcome.command, outcome.exit_status, outcome.output
        ));
    }

    block.push_str("\n### Recovery Strategy\n\n");
    block.push_str("Rerun these until they pass:\n");
    for outcome in bag.failures() {
        block.push_str(&format!("- `{}`\n", outcome.command));
    }

    if let Some(reminder) = style_reminder {
        block.push_str("\n### Style Guide Reminder\n\n");
        block.push_str(reminder);
        block.push('\n');
    }

    block
}

/// Build the exception block appended when the agent call itself raises.
pub fn build_exception_block(error: &eyre::Report) -> String {
    let mut block = String::new();
    block.push_str("\n## Fix-Forward Exception\n\n");
    block.push_str("The agent invocation raised instead of returning a result. Continue from the current state; do not roll anything back.\n\n");
    block.push_str(&format!("- Kind: AgentCallFailure\n- Message: {}\n", error));

    let frames: Vec<String> = error.chain().skip(1).take(3).map(|cause| cause.to_string()).collect();
    if !frames.is_empty() {
        block.push_str("- Caused by:\n");
        for frame in frames {
            block.push_str(&format!("  - {}\n", frame));
        }
    }
    block
}

fn excerpt(s: &str) -> String {
    let s = s.trim_end();
    if s.len() <= OUTPUT_EXCERPT_LIMIT {
        return s.to_string();
    }
    let mut end = OUTPUT_EXCERPT_LIMIT;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &s[..end])
}
