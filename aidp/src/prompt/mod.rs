//! Durable prompt document for the current step
//!
//! One markdown file at `.aidp/PROMPT.md`. The engine writes the step
//! prompt, appends fix-forward sections across iterations, and archives a
//! timestamped copy on termination.

use std::path::PathBuf;
use std::sync::Arc;

use eyre::{Context, Result};
use tracing::{debug, info, warn};

use crate::clock::Clock;

/// File name of the working prompt under `.aidp/`.
pub const PROMPT_FILE: &str = "PROMPT.md";

/// Archive directory under `.aidp/`.
pub const ARCHIVE_DIR: &str = "prompt_archive";

/// Context handed to a prompt optimizer.
#[derive(Debug, Clone)]
pub struct OptimizeContext {
    pub step_name: String,
    pub body: String,
    pub token_budget: usize,
}

/// Pluggable prompt composer with a token budget.
///
/// Failures fall back to the caller writing the unoptimized body.
pub trait PromptOptimizer: Send + Sync {
    fn compose(&self, ctx: &OptimizeContext) -> Result<String>;
}

/// Store for the step's prompt document.
pub struct PromptStore {
    aidp_dir: PathBuf,
    clock: Arc<dyn Clock>,
    optimizer: Option<Box<dyn PromptOptimizer>>,
}

impl PromptStore {
    pub fn new(aidp_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            aidp_dir: aidp_dir.into(),
            clock,
            optimizer: None,
        }
    }

    /// Attach an optimizer for budgeted prompt composition.
    pub fn with_optimizer(mut self, optimizer: Box<dyn PromptOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    /// Path of the working prompt.
    pub fn path(&self) -> PathBuf {
        self.aidp_dir.join(PROMPT_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Overwrite the prompt document.
    pub fn write(&self, body: &str) -> Result<()> {
        std::fs::create_dir_all(&self.aidp_dir)
            .with_context(|| format!("creating {}", self.aidp_dir.display()))?;
        std::fs::write(self.path(), body).with_context(|| format!("writing {}", self.path().display()))?;
        debug!(bytes = body.len(), "PromptStore::write");
        Ok(())
    }

    /// Read the prompt document; empty string when absent.
    pub fn read(&self) -> Result<String> {
        if !self.exists() {
            return Ok(String::new());
        }
        std::fs::read_to_string(self.path()).with_context(|| format!("reading {}", self.path().display()))
    }

    /// Append a section to the prompt document, creating it if needed.
    pub fn append(&self, section: &str) -> Result<()> {
        let mut body = self.read()?;
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }
        body.push_str(section);
        self.write(&body)
    }

    /// Prepend a block above the current prompt body.
    pub fn prepend(&self, block: &str) -> Result<()> {
        let body = self.read()?;
        let mut combined = String::with_capacity(block.len() + body.len() + 2);
        combined.push_str(block);
        if !block.ends_with('\n') {
            combined.push('\n');
        }
        combined.push('\n');
        combined.push_str(&body);
        self.write(&combined)
    }

    /// Delete the working prompt, tolerating its absence.
    pub fn delete(&self) -> Result<()> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(&path).with_context(|| format!("deleting {}", path.display()))?;
            debug!("PromptStore::delete: removed working prompt");
        }
        Ok(())
    }

    /// Copy the working prompt to the archive without removing the original.
    ///
    /// The archive name is `YYYYMMDD_HHMMSS_<stepName>_PROMPT.md`.
    pub fn archive(&self, step_name: &str) -> Result<Option<PathBuf>> {
        if !self.exists() {
            debug!("PromptStore::archive: nothing to archive");
            return Ok(None);
        }

        let archive_dir = self.aidp_dir.join(ARCHIVE_DIR);
        std::fs::create_dir_all(&archive_dir).with_context(|| format!("creating {}", archive_dir.display()))?;

        let stamp = self.clock.now().format("%Y%m%d_%H%M%S");
        let target = archive_dir.join(format!("{}_{}_PROMPT.md", stamp, step_name));
        std::fs::copy(self.path(), &target)
            .with_context(|| format!("archiving prompt to {}", target.display()))?;

        info!(archive = %target.display(), "Archived prompt");
        Ok(Some(target))
    }

    /// Compose the prompt through the optimizer when one is configured.
    ///
    /// Returns `Ok(true)` when the optimized body was written, `Ok(false)`
    /// when no optimizer is set or it failed — the caller then writes the
    /// unoptimized body itself.
    pub fn write_optimized(&self, ctx: &OptimizeContext) -> Result<bool> {
        let Some(optimizer) = &self.optimizer else {
            return Ok(false);
        };

        match optimizer.compose(ctx) {
            Ok(body) => {
                self.write(&body)?;
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "Prompt optimizer failed, falling back to unoptimized write");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use eyre::eyre;
    use std::path::Path;
    use tempfile::tempdir;

    fn store_at(dir: &Path) -> PromptStore {
        PromptStore::new(dir.join(".aidp"), Arc::new(ManualClock::default()))
    }

    #[test]
    fn test_write_read_delete() {
        let temp = tempdir().unwrap();
        let store = store_at(temp.path());

        assert!(!store.exists());
        assert_eq!(store.read().unwrap(), "");

        store.write("# Step prompt\n").unwrap();
        assert!(store.exists());
        assert_eq!(store.read().unwrap(), "# Step prompt\n");

        store.delete().unwrap();
        assert!(!store.exists());
        store.delete().unwrap();
    }

    #[test]
    fn test_append_and_prepend() {
        let temp = tempdir().unwrap();
        let store = store_at(temp.path());

        store.write("body").unwrap();
        store.append("## Fix-Forward Iteration 1\ndetails\n").unwrap();
        let content = store.read().unwrap();
        assert!(content.starts_with("body\n## Fix-Forward Iteration 1"));

        store.prepend("## User Instructions\n- do the thing\n").unwrap();
        let content = store.read().unwrap();
        assert!(content.starts_with("## User Instructions"));
        assert!(content.contains("body"));
    }

    #[test]
    fn test_archive_keeps_original() {
        let temp = tempdir().unwrap();
        let store = store_at(temp.path());

        store.write("archived content").unwrap();
        let target = store.archive("16_IMPLEMENTATION").unwrap().unwrap();

        assert!(target.exists());
        assert!(store.exists(), "archive copies, it does not move");

        let name = target.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("_16_IMPLEMENTATION_PROMPT.md"));
        assert_eq!(std::fs::read_to_string(target).unwrap(), "archived content");
    }

    #[test]
    fn test_archive_without_prompt_is_noop() {
        let temp = tempdir().unwrap();
        let store = store_at(temp.path());
        assert!(store.archive("STEP").unwrap().is_none());
    }

    struct FixedOptimizer(Option<&'static str>);

    impl PromptOptimizer for FixedOptimizer {
        fn compose(&self, _ctx: &OptimizeContext) -> Result<String> {
            self.0.map(|s| s.to_string()).ok_or_else(|| eyre!("budget overflow"))
        }
    }

    #[test]
    fn test_write_optimized_success() {
        let temp = tempdir().unwrap();
        let store = store_at(temp.path()).with_optimizer(Box::new(FixedOptimizer(Some("optimized"))));

        let ctx = OptimizeContext {
            step_name: "STEP".to_string(),
            body: "raw".to_string(),
            token_budget: 1000,
        };
        assert!(store.write_optimized(&ctx).unwrap());
        assert_eq!(store.read().unwrap(), "optimized");
    }

    #[test]
    fn test_write_optimized_falls_back_on_failure() {
        let temp = tempdir().unwrap();
        let store = store_at(temp.path()).with_optimizer(Box::new(FixedOptimizer(None)));

        let ctx = OptimizeContext {
            step_name: "STEP".to_string(),
            body: "raw".to_string(),
            token_budget: 1000,
        };
        assert!(!store.write_optimized(&ctx).unwrap());
        assert!(!store.exists(), "fallback leaves the write to the caller");
    }

    #[test]
    fn test_write_optimized_without_optimizer() {
        let temp = tempdir().unwrap();
        let store = store_at(temp.path());

        let ctx = OptimizeContext {
            step_name: "STEP".to_string(),
            body: "raw".to_string(),
            token_budget: 1000,
        };
        assert!(!store.write_optimized(&ctx).unwrap());
    }
}
