//! Interactive REPL
//!
//! A rustyline-driven control surface over a running work loop: slash
//! commands go through the macro interpreter; anything else is queued as an
//! instruction for the worker's next iteration boundary.

pub mod macros;

pub use macros::{Action, MacroOutcome, ReplMacroInterpreter};

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::warn;

use crate::config::Config;
use crate::domain::{InstructionKind, InstructionPriority};
use crate::engine::{AsyncRunner, OutputKind};
use crate::exec::VcsDriver;
use crate::workstream::WorkstreamManager;

/// Result of handling one line of input
enum LineResult {
    Continue,
    Quit,
}

/// Interactive session wiring the interpreter to a work-loop runner.
pub struct ReplSession {
    interpreter: ReplMacroInterpreter,
    runner: Option<Arc<AsyncRunner>>,
    vcs: Arc<dyn VcsDriver>,
}

impl ReplSession {
    pub fn new(
        project_dir: impl Into<PathBuf>,
        workstreams: Arc<WorkstreamManager>,
        vcs: Arc<dyn VcsDriver>,
        config: &Config,
    ) -> Self {
        let project_dir = project_dir.into();
        Self {
            interpreter: ReplMacroInterpreter::new(project_dir, workstreams, vcs.clone(), &config.thinking),
            runner: None,
            vcs,
        }
    }

    /// Attach a running work loop to steer.
    pub fn with_runner(mut self, runner: Arc<AsyncRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Run the REPL main loop until quit or Ctrl-D.
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            self.flush_worker_output();

            let readline = rl.readline(&format!("{} ", "aidp>".bright_green()));
            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(input);

                    match self.handle_line(input).await {
                        LineResult::Continue => continue,
                        LineResult::Quit => break,
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        if let Some(runner) = &self.runner {
            if runner.running().await {
                println!("{}", "Cancelling running work loop...".yellow());
                let _ = runner.cancel(true);
                let summary = runner.wait().await;
                println!("Work loop ended: {}", summary.status);
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "aidp interactive REPL".bright_cyan().bold());
        println!(
            "Workstream: {}",
            self.interpreter
                .current_workstream()
                .unwrap_or("(project root)")
        );
        println!("Type {} for commands, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();
    }

    async fn handle_line(&mut self, input: &str) -> LineResult {
        if input == "/quit" || input == "/q" || input == "/exit" {
            return LineResult::Quit;
        }

        if input.starts_with('/') {
            let outcome = self.interpreter.execute(input).await;
            self.print_outcome(&outcome);
            if outcome.success {
                self.dispatch(&outcome).await;
            }
            return LineResult::Continue;
        }

        // Plain text: instruction for the running loop.
        match &self.runner {
            Some(runner) => {
                runner.enqueue_instruction(input, InstructionKind::UserInput, InstructionPriority::Normal);
                println!("{}", "Queued for the next iteration.".dimmed());
            }
            None => {
                println!(
                    "{}",
                    "No work loop attached; use /inject once one is running, or slash commands.".dimmed()
                );
            }
        }
        LineResult::Continue
    }

    fn print_outcome(&self, outcome: &MacroOutcome) {
        if outcome.success {
            println!("{}", outcome.message);
        } else {
            println!("{} {}", "!".red(), outcome.message);
        }
    }

    /// Route a successful macro outcome into the runner / VCS.
    async fn dispatch(&mut self, outcome: &MacroOutcome) {
        match outcome.action {
            Action::PauseWorkLoop => {
                if let Some(runner) = &self.runner {
                    match runner.pause() {
                        Ok(snapshot) => println!("Paused at iteration {}.", snapshot.iteration),
                        Err(e) => println!("{} {}", "!".red(), e),
                    }
                }
            }
            Action::ResumeWorkLoop => {
                if let Some(runner) = &self.runner {
                    match runner.resume() {
                        Ok(snapshot) => println!("Resumed at iteration {}.", snapshot.iteration),
                        Err(e) => println!("{} {}", "!".red(), e),
                    }
                }
            }
            Action::CancelWorkLoop => {
                if let Some(runner) = &self.runner {
                    let save = outcome.data["save_checkpoint"].as_bool().unwrap_or(true);
                    match runner.cancel(save) {
                        Ok(_) => {
                            let summary = runner.wait().await;
                            println!(
                                "Work loop {}: {} iteration(s).",
                                summary.status, summary.iterations
                            );
                        }
                        Err(e) => println!("{} {}", "!".red(), e),
                    }
                }
            }
            Action::EnqueueInstruction => {
                if let Some(runner) = &self.runner {
                    let content = outcome.data["content"].as_str().unwrap_or_default();
                    let kind = outcome.data["type"]
                        .as_str()
                        .and_then(|s| InstructionKind::from_str(s).ok())
                        .unwrap_or_default();
                    let priority = outcome.data["priority"]
                        .as_str()
                        .and_then(|s| InstructionPriority::from_str(s).ok())
                        .unwrap_or_default();
                    runner.enqueue_instruction(content, kind, priority);
                } else {
                    println!("{}", "No work loop attached; instruction dropped.".dimmed());
                }
            }
            Action::UpdateGuard => {
                if let Some(runner) = &self.runner {
                    let key = outcome.data["key"].as_str().unwrap_or_default();
                    let value = outcome.data["value"].as_str().unwrap_or_default();
                    runner.request_guard_update(key, value);
                }
            }
            Action::ReloadConfig => {
                if let Some(runner) = &self.runner {
                    runner.request_config_reload();
                }
            }
            Action::RollbackCommits => {
                let count = outcome.data["count"].as_u64().unwrap_or(0) as u32;
                let repo = self.interpreter.current_path();
                match self.vcs.rollback_commits(&repo, count).await {
                    Ok(()) => println!("Rolled back {} commit(s).", count),
                    Err(e) => {
                        warn!(error = %e, "Rollback failed");
                        println!("{} rollback failed: {}", "!".red(), e);
                    }
                }
            }
            Action::Skill => {
                // Using a skill while a loop runs injects its body as a
                // constraint for the next iteration.
                if outcome.data["op"] == "use" {
                    if let (Some(runner), Some(body)) = (&self.runner, outcome.data["body"].as_str()) {
                        runner.enqueue_instruction(body, InstructionKind::Constraint, InstructionPriority::Normal);
                        println!("{}", "Skill guidance queued for the next iteration.".dimmed());
                    }
                }
            }
            Action::Status => {
                if let Some(runner) = &self.runner {
                    let snapshot = runner.snapshot();
                    println!(
                        "Work loop: {} (iteration {}{})",
                        snapshot.phase,
                        snapshot.iteration,
                        snapshot
                            .last_error
                            .as_deref()
                            .map(|e| format!(", last error: {}", e))
                            .unwrap_or_default()
                    );
                }
            }
            _ => {}
        }
    }

    fn flush_worker_output(&self) {
        let Some(runner) = &self.runner else {
            return;
        };
        for entry in runner.drain_output() {
            let line = match entry.kind {
                OutputKind::Info => entry.message.normal(),
                OutputKind::Warn => entry.message.yellow(),
                OutputKind::Error => entry.message.red(),
                OutputKind::Agent => entry.message.cyan(),
            };
            println!("  {} {}", "|".dimmed(), line);
        }
    }
}
