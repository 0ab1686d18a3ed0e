//! Repository metric collection
//!
//! Cheap static estimates, not tool output: line counts come from a source
//! walk, coverage from the test-to-code line ratio, quality from file-size
//! distribution. Good enough for trend direction between snapshots.

use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

/// Extensions counted as source code.
const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "rb", "py", "js", "ts", "tsx", "go", "java", "c", "cc", "cpp", "h", "hpp", "ex", "exs",
];

/// Directories skipped entirely.
const SKIP_DIRS: &[&str] = &[
    ".git",
    ".aidp",
    ".worktrees",
    "target",
    "node_modules",
    "vendor",
    "dist",
    "build",
];

/// Raw numbers from one repository walk
#[derive(Debug, Clone, Default)]
pub struct RepoMetrics {
    pub lines_of_code: u64,
    pub file_count: u64,
    pub test_coverage: f64,
    pub code_quality: f64,
}

/// Walk the project and compute size and estimate metrics.
pub fn collect_repo_metrics(project_dir: &Path) -> RepoMetrics {
    let mut code_lines = 0u64;
    let mut test_lines = 0u64;
    let mut file_count = 0u64;
    let mut oversized_files = 0u64;

    let walker = WalkDir::new(project_dir).into_iter().filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy();
        !(entry.file_type().is_dir() && SKIP_DIRS.contains(&name.as_ref()))
    });

    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !SOURCE_EXTENSIONS.contains(&ext) {
            continue;
        }

        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        let lines = content.lines().count() as u64;

        file_count += 1;
        code_lines += lines;
        if lines > 500 {
            oversized_files += 1;
        }
        if is_test_path(path, project_dir) {
            test_lines += lines;
        }
    }

    let non_test_lines = code_lines.saturating_sub(test_lines).max(1);
    let test_coverage = (100.0 * test_lines as f64 / non_test_lines as f64).clamp(0.0, 100.0);
    let code_quality = (100.0 - 5.0 * oversized_files as f64).clamp(0.0, 100.0);

    debug!(
        code_lines,
        test_lines, file_count, oversized_files, "collect_repo_metrics"
    );

    RepoMetrics {
        lines_of_code: code_lines,
        file_count,
        test_coverage,
        code_quality,
    }
}

fn is_test_path(path: &Path, root: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let in_test_dir = relative
        .components()
        .any(|c| matches!(c.as_os_str().to_str(), Some("tests" | "test" | "spec" | "specs")));
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    in_test_dir || name.ends_with("_test") || name.ends_with("_spec") || name.starts_with("test_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_counts_source_files_and_lines() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("lib.rs"), "fn a() {}\nfn b() {}\n").unwrap();
        std::fs::write(temp.path().join("notes.md"), "not code\n").unwrap();

        let metrics = collect_repo_metrics(temp.path());
        assert_eq!(metrics.file_count, 1);
        assert_eq!(metrics.lines_of_code, 2);
    }

    #[test]
    fn test_skips_ignored_directories() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("target/debug")).unwrap();
        std::fs::write(temp.path().join("target/debug/huge.rs"), "x\n".repeat(1000)).unwrap();
        std::fs::write(temp.path().join("lib.rs"), "fn a() {}\n").unwrap();

        let metrics = collect_repo_metrics(temp.path());
        assert_eq!(metrics.file_count, 1);
        assert_eq!(metrics.lines_of_code, 1);
    }

    #[test]
    fn test_test_lines_raise_coverage_estimate() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("tests")).unwrap();
        std::fs::write(temp.path().join("lib.rs"), "code\n".repeat(100)).unwrap();

        let bare = collect_repo_metrics(temp.path());
        std::fs::write(temp.path().join("tests/lib_test.rs"), "test\n".repeat(50)).unwrap();
        let with_tests = collect_repo_metrics(temp.path());

        assert!(with_tests.test_coverage > bare.test_coverage);
    }

    #[test]
    fn test_oversized_files_lower_quality() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("small.rs"), "fn a() {}\n").unwrap();
        let clean = collect_repo_metrics(temp.path());

        std::fs::write(temp.path().join("big.rs"), "line\n".repeat(600)).unwrap();
        let with_big = collect_repo_metrics(temp.path());

        assert!(with_big.code_quality < clean.code_quality);
    }
}
