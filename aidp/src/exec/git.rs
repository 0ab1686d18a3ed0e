//! Git-CLI implementation of the VCS driver

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use eyre::eyre;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{VcsDriver, WorktreeEntry};

/// Drives git through the CLI, the same way worktrees are managed by hand.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitDriver;

impl GitDriver {
    async fn git(&self, repo: &Path, args: &[&str]) -> eyre::Result<String> {
        debug!(repo = %repo.display(), ?args, "GitDriver::git");
        let output = Command::new("git").args(args).current_dir(repo).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(eyre!("git {} failed: {}", args.first().unwrap_or(&""), stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl VcsDriver for GitDriver {
    async fn create_worktree(&self, repo: &Path, path: &Path, branch: &str, base: Option<&str>) -> eyre::Result<()> {
        let path_str = path.to_string_lossy();
        let mut args = vec!["worktree", "add", path_str.as_ref(), "-b", branch];
        let base = base.unwrap_or("HEAD");
        args.push(base);

        self.git(repo, &args).await?;
        info!(path = %path.display(), %branch, %base, "Created worktree");
        Ok(())
    }

    async fn remove_worktree(&self, repo: &Path, path: &Path, branch: &str, delete_branch: bool) -> eyre::Result<()> {
        let path_str = path.to_string_lossy();
        match self.git(repo, &["worktree", "remove", path_str.as_ref(), "--force"]).await {
            Ok(_) => {}
            // Already gone is not a failure.
            Err(e) if e.to_string().contains("is not a working tree") => {
                debug!(path = %path.display(), "GitDriver::remove_worktree: already removed");
            }
            Err(e) => return Err(e),
        }

        if delete_branch {
            if let Err(e) = self.git(repo, &["branch", "-D", branch]).await {
                warn!(%branch, error = %e, "Failed to delete branch");
            }
        }

        info!(path = %path.display(), "Removed worktree");
        Ok(())
    }

    async fn list_worktrees(&self, repo: &Path) -> eyre::Result<Vec<WorktreeEntry>> {
        let output = self.git(repo, &["worktree", "list", "--porcelain"]).await?;

        let mut entries = Vec::new();
        let mut path: Option<PathBuf> = None;
        for line in output.lines() {
            if let Some(p) = line.strip_prefix("worktree ") {
                path = Some(PathBuf::from(p));
            } else if let Some(b) = line.strip_prefix("branch ") {
                if let Some(p) = path.take() {
                    entries.push(WorktreeEntry {
                        path: p,
                        branch: b.trim_start_matches("refs/heads/").to_string(),
                    });
                }
            }
        }
        Ok(entries)
    }

    async fn rollback_commits(&self, repo: &Path, count: u32) -> eyre::Result<()> {
        let target = format!("HEAD~{}", count);
        self.git(repo, &["reset", "--hard", &target]).await?;
        info!(%count, "Rolled back commits");
        Ok(())
    }

    async fn current_branch(&self, repo: &Path) -> eyre::Result<String> {
        let output = self.git(repo, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Ok(output.trim().to_string())
    }

    async fn default_branch(&self, repo: &Path) -> eyre::Result<String> {
        // origin/HEAD when a remote exists, else the init.defaultBranch values.
        if let Ok(output) = self.git(repo, &["symbolic-ref", "refs/remotes/origin/HEAD", "--short"]).await {
            if let Some(branch) = output.trim().strip_prefix("origin/") {
                return Ok(branch.to_string());
            }
        }

        let branches = self.git(repo, &["branch", "--list", "main", "master"]).await?;
        for candidate in ["main", "master"] {
            if branches.lines().any(|l| l.trim_start_matches('*').trim() == candidate) {
                return Ok(candidate.to_string());
            }
        }
        self.current_branch(repo).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn init_repo(path: &Path) {
        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "user.name", "Test"],
            vec!["commit", "--allow-empty", "-m", "init"],
        ] {
            let status = Command::new("git").args(&args).current_dir(path).output().await.unwrap();
            assert!(status.status.success(), "git {:?} failed", args);
        }
    }

    #[tokio::test]
    async fn test_current_and_default_branch() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;
        let driver = GitDriver;

        assert_eq!(driver.current_branch(temp.path()).await.unwrap(), "main");
        assert_eq!(driver.default_branch(temp.path()).await.unwrap(), "main");
    }

    #[tokio::test]
    async fn test_worktree_lifecycle() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;
        let driver = GitDriver;

        let wt_path = temp.path().join(".worktrees").join("issue-42");
        driver
            .create_worktree(temp.path(), &wt_path, "aidp/issue-42", None)
            .await
            .unwrap();
        assert!(wt_path.exists());

        let listed = driver.list_worktrees(temp.path()).await.unwrap();
        assert!(listed.iter().any(|e| e.branch == "aidp/issue-42"));

        driver
            .remove_worktree(temp.path(), &wt_path, "aidp/issue-42", true)
            .await
            .unwrap();
        assert!(!wt_path.exists());
    }

    #[tokio::test]
    async fn test_rollback_commits() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;
        let driver = GitDriver;

        for i in 0..2 {
            Command::new("git")
                .args(["commit", "--allow-empty", "-m", &format!("c{}", i)])
                .current_dir(temp.path())
                .output()
                .await
                .unwrap();
        }

        driver.rollback_commits(temp.path(), 2).await.unwrap();

        let log = driver.git(temp.path(), &["log", "--oneline"]).await.unwrap();
        assert_eq!(log.lines().count(), 1);
    }
}
