//! Shell command runner backed by `sh -c`

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use super::{CommandOutput, CommandRunner};

/// Runs commands through the system shell in a given working directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, cmd: &str, working_dir: &Path) -> eyre::Result<CommandOutput> {
        debug!(%cmd, working_dir = %working_dir.display(), "ShellRunner::run");

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .current_dir(working_dir)
            .output()
            .await?;

        let result = CommandOutput {
            exit_status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!(exit_status = result.exit_status, "ShellRunner::run: finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_run_captures_exit_and_output() {
        let temp = tempdir().unwrap();
        let runner = ShellRunner;

        let out = runner.run("echo hello", temp.path()).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");

        let out = runner.run("exit 3", temp.path()).await.unwrap();
        assert_eq!(out.exit_status, 3);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_run_captures_stderr() {
        let temp = tempdir().unwrap();
        let runner = ShellRunner;

        let out = runner.run("echo oops >&2; exit 1", temp.path()).await.unwrap();
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.exit_status, 1);
    }
}
