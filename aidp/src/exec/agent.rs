//! Shell-command agent provider
//!
//! Drives an external agent CLI: the composed prompt goes to the command's
//! stdin, its stdout is the agent output. The command comes from
//! `provider.settings.command` in `aidp.yml`.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use eyre::{Context, eyre};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{AgentOptions, AgentProvider, AgentResult, AgentStatus};

/// Agent provider that pipes prompts through a shell command.
pub struct CommandAgent {
    command: String,
    instruction_file: bool,
}

impl CommandAgent {
    pub fn new(command: impl Into<String>, instruction_file: bool) -> Self {
        Self {
            command: command.into(),
            instruction_file,
        }
    }
}

#[async_trait]
impl AgentProvider for CommandAgent {
    async fn execute(&self, prompt: &str, working_dir: &Path, options: &AgentOptions) -> eyre::Result<AgentResult> {
        debug!(command = %self.command, prompt_len = prompt.len(), "CommandAgent::execute");

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(tier) = &options.thinking_tier {
            cmd.env("AIDP_THINKING_TIER", tier);
        }

        let mut child = cmd.spawn().context("spawning agent command")?;
        let mut stdin = child.stdin.take().ok_or_else(|| eyre!("agent stdin unavailable"))?;
        stdin.write_all(prompt.as_bytes()).await.context("writing prompt")?;
        drop(stdin);

        let output = child.wait_with_output().await.context("waiting for agent")?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            Ok(AgentResult {
                status: AgentStatus::Completed,
                output: stdout,
                message: None,
                error: None,
            })
        } else {
            Ok(AgentResult {
                status: AgentStatus::Error,
                output: stdout,
                message: Some(format!("agent exited {}", output.status.code().unwrap_or(-1))),
                error: Some(stderr),
            })
        }
    }

    fn has_instruction_file(&self) -> bool {
        self.instruction_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_pipes_prompt_and_captures_output() {
        let temp = tempdir().unwrap();
        let agent = CommandAgent::new("cat", false);

        let result = agent
            .execute("NEXT_UNIT: run_full_tests", temp.path(), &AgentOptions::default())
            .await
            .unwrap();
        assert_eq!(result.status, AgentStatus::Completed);
        assert_eq!(result.output, "NEXT_UNIT: run_full_tests");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error_result() {
        let temp = tempdir().unwrap();
        let agent = CommandAgent::new("echo partial; exit 3", false);

        let result = agent
            .execute("prompt", temp.path(), &AgentOptions::default())
            .await
            .unwrap();
        assert_eq!(result.status, AgentStatus::Error);
        assert_eq!(result.output.trim(), "partial");
        assert!(result.message.unwrap().contains("3"));
    }
}
