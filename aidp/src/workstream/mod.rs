//! Multi-workstream (worktree) management
//!
//! A workstream is an isolated line of work: a git worktree under
//! `<project>/.worktrees/<slug>` on an `aidp/<slug>` branch, registered in
//! `.aidp/pr_worktrees.json`. The registry is the source of truth for the
//! REPL; the VCS driver owns the actual worktrees.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::exec::VcsDriver;

/// Registry file under `.aidp/`.
pub const REGISTRY_FILE: &str = "pr_worktrees.json";

/// Directory under the project root holding worktrees.
pub const WORKTREES_DIR: &str = ".worktrees";

/// Branch namespace for workstream branches.
pub const BRANCH_PREFIX: &str = "aidp";

/// Error kinds for workstream operations
#[derive(Debug, thiserror::Error)]
pub enum WorkstreamError {
    #[error("Invalid slug `{0}`: must match ^[a-z0-9][a-z0-9-]*$")]
    InvalidSlug(String),

    #[error("Workstream already exists: {0}")]
    AlreadyExists(String),

    #[error("Workstream not found: {0}")]
    NotFound(String),

    #[error("VCS operation failed: {0}")]
    Vcs(String),

    #[error("Registry I/O failed: {0}")]
    Registry(String),
}

/// One registered workstream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workstream {
    pub slug: String,
    pub branch: String,
    pub path: PathBuf,
    pub base_branch: String,
    pub created_at: DateTime<Utc>,
}

/// True when `slug` is lowercase-hyphen and starts alphanumeric.
pub fn valid_slug(slug: &str) -> bool {
    let mut chars = slug.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Registry of workstreams over the external VCS driver.
pub struct WorkstreamManager {
    project_dir: PathBuf,
    vcs: Arc<dyn VcsDriver>,
    clock: Arc<dyn Clock>,
    registry_lock: Mutex<()>,
}

impl WorkstreamManager {
    pub fn new(project_dir: impl Into<PathBuf>, vcs: Arc<dyn VcsDriver>, clock: Arc<dyn Clock>) -> Self {
        Self {
            project_dir: project_dir.into(),
            vcs,
            clock,
            registry_lock: Mutex::new(()),
        }
    }

    fn registry_path(&self) -> PathBuf {
        self.project_dir.join(".aidp").join(REGISTRY_FILE)
    }

    /// Load the registry; a missing or malformed file reads as empty.
    fn load_registry(&self) -> Vec<Workstream> {
        let path = self.registry_path();
        if !path.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Malformed workstream registry, treating as empty");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable workstream registry, treating as empty");
                Vec::new()
            }
        }
    }

    /// Atomically rewrite the registry (temp file + rename).
    fn save_registry(&self, entries: &[Workstream]) -> Result<(), WorkstreamError> {
        let path = self.registry_path();
        let parent = path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| WorkstreamError::Registry(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(entries).map_err(|e| WorkstreamError::Registry(e.to_string()))?;
        std::fs::write(&tmp, json).map_err(|e| WorkstreamError::Registry(e.to_string()))?;
        std::fs::rename(&tmp, &path).map_err(|e| WorkstreamError::Registry(e.to_string()))?;
        debug!(count = entries.len(), "save_registry: wrote registry");
        Ok(())
    }

    /// Create a workstream: provision the worktree and register it.
    ///
    /// `base_branch` defaults to the current HEAD's branch.
    pub async fn create(&self, slug: &str, base_branch: Option<&str>) -> Result<Workstream, WorkstreamError> {
        if !valid_slug(slug) {
            return Err(WorkstreamError::InvalidSlug(slug.to_string()));
        }

        let _guard = self.registry_lock.lock().await;
        let mut entries = self.load_registry();
        if entries.iter().any(|w| w.slug == slug) {
            return Err(WorkstreamError::AlreadyExists(slug.to_string()));
        }

        let base = match base_branch {
            Some(b) => b.to_string(),
            None => self
                .vcs
                .current_branch(&self.project_dir)
                .await
                .map_err(|e| WorkstreamError::Vcs(e.to_string()))?,
        };

        let path = self.project_dir.join(WORKTREES_DIR).join(slug);
        let branch = format!("{}/{}", BRANCH_PREFIX, slug);

        self.vcs
            .create_worktree(&self.project_dir, &path, &branch, base_branch)
            .await
            .map_err(|e| WorkstreamError::Vcs(e.to_string()))?;

        let workstream = Workstream {
            slug: slug.to_string(),
            branch,
            path,
            base_branch: base,
            created_at: self.clock.now(),
        };
        entries.push(workstream.clone());
        self.save_registry(&entries)?;

        info!(%slug, branch = %workstream.branch, "Created workstream");
        Ok(workstream)
    }

    /// Remove a workstream: unregister, drop the worktree, and optionally
    /// delete its branch.
    pub async fn remove(&self, slug: &str, delete_branch: bool) -> Result<(), WorkstreamError> {
        let _guard = self.registry_lock.lock().await;
        let mut entries = self.load_registry();
        let Some(index) = entries.iter().position(|w| w.slug == slug) else {
            return Err(WorkstreamError::NotFound(slug.to_string()));
        };
        let workstream = entries.remove(index);

        self.vcs
            .remove_worktree(&self.project_dir, &workstream.path, &workstream.branch, delete_branch)
            .await
            .map_err(|e| WorkstreamError::Vcs(e.to_string()))?;

        self.save_registry(&entries)?;
        info!(%slug, "Removed workstream");
        Ok(())
    }

    /// All registered workstreams.
    pub fn list(&self) -> Vec<Workstream> {
        self.load_registry()
    }

    /// One workstream by slug.
    pub fn info(&self, slug: &str) -> Result<Workstream, WorkstreamError> {
        self.load_registry()
            .into_iter()
            .find(|w| w.slug == slug)
            .ok_or_else(|| WorkstreamError::NotFound(slug.to_string()))
    }

    /// Absolute path for a slug, for the REPL's `/ws switch`.
    pub fn switch_path(&self, slug: &str) -> Result<PathBuf, WorkstreamError> {
        Ok(self.info(slug)?.path)
    }

    /// Worktree directories on disk with no registry entry.
    pub fn orphaned_paths(&self) -> Vec<PathBuf> {
        let pattern = format!("{}/{}/*", self.project_dir.display(), WORKTREES_DIR);
        let Ok(paths) = glob::glob(&pattern) else {
            return Vec::new();
        };
        let registered: Vec<PathBuf> = self.load_registry().into_iter().map(|w| w.path).collect();
        paths
            .flatten()
            .filter(|p| p.is_dir() && !registered.contains(p))
            .collect()
    }

    /// Drop registry entries whose worktree vanished or whose age exceeds
    /// `threshold_days`. Returns the removed slugs.
    pub async fn cleanup_stale(&self, threshold_days: i64) -> Result<Vec<String>, WorkstreamError> {
        for orphan in self.orphaned_paths() {
            warn!(path = %orphan.display(), "Worktree directory has no registry entry");
        }

        let _guard = self.registry_lock.lock().await;
        let entries = self.load_registry();
        let now = self.clock.now();

        let mut kept = Vec::new();
        let mut removed = Vec::new();
        for entry in entries {
            let age_days = (now - entry.created_at).num_days();
            let stale = !entry.path.exists() || age_days > threshold_days;
            if stale {
                debug!(slug = %entry.slug, age_days, "cleanup_stale: dropping");
                let _ = self
                    .vcs
                    .remove_worktree(&self.project_dir, &entry.path, &entry.branch, false)
                    .await;
                removed.push(entry.slug);
            } else {
                kept.push(entry);
            }
        }

        if !removed.is_empty() {
            self.save_registry(&kept)?;
            info!(?removed, "Cleaned up stale workstreams");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::exec::mock::FakeVcs;
    use tempfile::tempdir;

    fn manager_at(dir: &Path) -> (WorkstreamManager, Arc<FakeVcs>, Arc<ManualClock>) {
        let vcs = Arc::new(FakeVcs::new());
        let clock = Arc::new(ManualClock::default());
        (
            WorkstreamManager::new(dir, vcs.clone(), clock.clone()),
            vcs,
            clock,
        )
    }

    #[test]
    fn test_valid_slug() {
        assert!(valid_slug("issue-42"));
        assert!(valid_slug("a"));
        assert!(valid_slug("0hotfix"));
        assert!(!valid_slug("-leading"));
        assert!(!valid_slug("Upper"));
        assert!(!valid_slug("has_underscore"));
        assert!(!valid_slug(""));
    }

    #[tokio::test]
    async fn test_create_registers_and_provisions() {
        let temp = tempdir().unwrap();
        let (manager, vcs, _) = manager_at(temp.path());

        let ws = manager.create("issue-42", None).await.unwrap();
        assert_eq!(ws.branch, "aidp/issue-42");
        assert_eq!(ws.base_branch, "main");
        assert!(ws.path.ends_with(".worktrees/issue-42"));

        assert_eq!(vcs.worktree_paths(), vec![ws.path.clone()]);
        assert_eq!(manager.list().len(), 1);
        assert_eq!(manager.info("issue-42").unwrap(), ws);
    }

    #[tokio::test]
    async fn test_duplicate_slug_fails() {
        let temp = tempdir().unwrap();
        let (manager, _, _) = manager_at(temp.path());

        manager.create("dup", None).await.unwrap();
        assert!(matches!(
            manager.create("dup", None).await,
            Err(WorkstreamError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_slug_rejected() {
        let temp = tempdir().unwrap();
        let (manager, _, _) = manager_at(temp.path());

        assert!(matches!(
            manager.create("Bad_Slug", None).await,
            Err(WorkstreamError::InvalidSlug(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_unregisters() {
        let temp = tempdir().unwrap();
        let (manager, vcs, _) = manager_at(temp.path());

        manager.create("gone-soon", None).await.unwrap();
        manager.remove("gone-soon", true).await.unwrap();

        assert!(manager.list().is_empty());
        assert!(vcs.worktree_paths().is_empty());
        assert!(matches!(
            manager.remove("gone-soon", false).await,
            Err(WorkstreamError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_registry_treated_as_empty() {
        let temp = tempdir().unwrap();
        let (manager, _, _) = manager_at(temp.path());

        let registry = temp.path().join(".aidp").join(REGISTRY_FILE);
        std::fs::create_dir_all(registry.parent().unwrap()).unwrap();
        std::fs::write(&registry, "{not json").unwrap();

        assert!(manager.list().is_empty());
        // And it recovers on the next write.
        manager.create("fresh", None).await.unwrap();
        assert_eq!(manager.list().len(), 1);
    }

    #[tokio::test]
    async fn test_orphaned_paths() {
        let temp = tempdir().unwrap();
        let (manager, _, _) = manager_at(temp.path());

        let registered = manager.create("known", None).await.unwrap();
        std::fs::create_dir_all(&registered.path).unwrap();
        std::fs::create_dir_all(temp.path().join(WORKTREES_DIR).join("mystery")).unwrap();

        let orphans = manager.orphaned_paths();
        assert_eq!(orphans.len(), 1);
        assert!(orphans[0].ends_with("mystery"));
    }

    #[tokio::test]
    async fn test_cleanup_stale_by_age_and_missing_path() {
        let temp = tempdir().unwrap();
        let (manager, _, clock) = manager_at(temp.path());

        // This worktree directory exists on disk; the other never will
        // (FakeVcs does not touch the filesystem).
        let kept = manager.create("fresh", None).await.unwrap();
        std::fs::create_dir_all(&kept.path).unwrap();
        manager.create("old-one", None).await.unwrap();
        let old_path = temp.path().join(WORKTREES_DIR).join("old-one");
        std::fs::create_dir_all(&old_path).unwrap();

        // Age out only old-one by rewriting its created_at through the clock.
        clock.advance_secs(10 * 24 * 3600);
        let removed = manager.cleanup_stale(30).await.unwrap();
        assert!(removed.is_empty(), "both are younger than 30 days");

        clock.advance_secs(31 * 24 * 3600);
        let removed = manager.cleanup_stale(30).await.unwrap();
        assert_eq!(removed.len(), 2, "both aged out");
    }
}
