//! Append-only JSONL record log
//!
//! One JSON object per line. Appends are serialized by an in-process mutex
//! plus an advisory file lock, so a reader never observes a torn line and two
//! processes never interleave writes.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use tracing::{debug, warn};

use crate::Record;

/// Error kinds for log operations
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// An append-only log of JSON records at a fixed path.
pub struct RecordLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RecordLog {
    /// Open (or lazily create) a log at the given path.
    ///
    /// The file itself is created on first append; a missing file reads as
    /// an empty log.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(path = %path.display(), "RecordLog::open");
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a newline-terminated JSON line.
    pub fn append<R: Record>(&self, record: &R) -> Result<(), LogError> {
        let line = serde_json::to_string(record)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;

        // Advisory lock serializes writers across processes.
        file.lock_exclusive().map_err(|e| self.io_err(e))?;
        let write_result = file
            .write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.flush());
        let _ = FileExt::unlock(&file);
        write_result.map_err(|e| self.io_err(e))?;

        debug!(path = %self.path.display(), record_id = %record.id(), "RecordLog::append: wrote record");
        Ok(())
    }

    /// Iterate all valid records oldest-first, calling `f` on each.
    ///
    /// Malformed lines are skipped with a warning so one bad record cannot
    /// block replay.
    pub fn scan<R, F>(&self, mut f: F) -> Result<(), LogError>
    where
        R: Record,
        F: FnMut(R),
    {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "RecordLog::scan: no file, empty log");
            return Ok(());
        }

        let file = File::open(&self.path).map_err(|e| self.io_err(e))?;
        let reader = BufReader::new(file);

        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| self.io_err(e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<R>(&line) {
                Ok(record) => f(record),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = line_no + 1,
                        error = %e,
                        "Skipping malformed record"
                    );
                }
            }
        }

        Ok(())
    }

    /// All valid records, oldest-first.
    pub fn read_all<R: Record>(&self) -> Result<Vec<R>, LogError> {
        let mut records = Vec::new();
        self.scan::<R, _>(|r| records.push(r))?;
        Ok(records)
    }

    /// Last `n` valid records, oldest-first within the window.
    pub fn tail<R: Record>(&self, n: usize) -> Result<Vec<R>, LogError> {
        let mut records = self.read_all::<R>()?;
        if records.len() > n {
            records.drain(..records.len() - n);
        }
        Ok(records)
    }

    /// Fold the log to latest-state-per-id, preserving first-seen order.
    ///
    /// The returned records are each id's most recently appended line; the
    /// earlier lines remain in the file as history.
    pub fn replay_latest<R: Record>(&self) -> Result<Vec<R>, LogError> {
        let mut order: Vec<String> = Vec::new();
        let mut latest: HashMap<String, R> = HashMap::new();

        self.scan::<R, _>(|record| {
            let id = record.id().to_string();
            if !latest.contains_key(&id) {
                order.push(id.clone());
            }
            latest.insert(id, record);
        })?;

        Ok(order.into_iter().filter_map(|id| latest.remove(&id)).collect())
    }

    /// Count all valid records, including history lines.
    pub fn len(&self) -> Result<usize, LogError> {
        let mut count = 0usize;
        self.scan::<serde_json::Value, _>(|_| count += 1)?;
        Ok(count)
    }

    /// True when the log holds no valid records.
    pub fn is_empty(&self) -> Result<bool, LogError> {
        Ok(self.len()? == 0)
    }

    fn io_err(&self, source: std::io::Error) -> LogError {
        LogError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Record for serde_json::Value {
    fn id(&self) -> &str {
        self.get("id").and_then(|v| v.as_str()).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Note {
        id: String,
        body: String,
        rev: u32,
    }

    impl Record for Note {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn note(id: &str, body: &str, rev: u32) -> Note {
        Note {
            id: id.to_string(),
            body: body.to_string(),
            rev,
        }
    }

    #[test]
    fn test_append_and_read_all() {
        let temp = tempdir().unwrap();
        let log = RecordLog::open(temp.path().join("notes.jsonl"));

        log.append(&note("a", "first", 1)).unwrap();
        log.append(&note("b", "second", 1)).unwrap();

        let all = log.read_all::<Note>().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "a");
        assert_eq!(all[1].id, "b");
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let temp = tempdir().unwrap();
        let log = RecordLog::open(temp.path().join("absent.jsonl"));

        assert!(log.read_all::<Note>().unwrap().is_empty());
        assert!(log.is_empty().unwrap());
    }

    #[test]
    fn test_replay_latest_keeps_last_record_per_id() {
        let temp = tempdir().unwrap();
        let log = RecordLog::open(temp.path().join("notes.jsonl"));

        log.append(&note("a", "v1", 1)).unwrap();
        log.append(&note("b", "other", 1)).unwrap();
        log.append(&note("a", "v2", 2)).unwrap();
        log.append(&note("a", "v3", 3)).unwrap();

        let latest = log.replay_latest::<Note>().unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0], note("a", "v3", 3));
        assert_eq!(latest[1], note("b", "other", 1));

        // History is preserved in the file.
        assert_eq!(log.len().unwrap(), 4);
    }

    #[test]
    fn test_scan_skips_malformed_lines() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("notes.jsonl");
        let log = RecordLog::open(&path);

        log.append(&note("a", "good", 1)).unwrap();
        // Inject a torn line between two good records.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"{\"id\": \"broken\", \"body\"\n").unwrap();
        }
        log.append(&note("b", "also good", 1)).unwrap();

        let all = log.read_all::<Note>().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "a");
        assert_eq!(all[1].id, "b");
    }

    #[test]
    fn test_tail_returns_last_n() {
        let temp = tempdir().unwrap();
        let log = RecordLog::open(temp.path().join("notes.jsonl"));

        for i in 0..5 {
            log.append(&note(&format!("n{}", i), "body", i)).unwrap();
        }

        let tail = log.tail::<Note>(2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].id, "n3");
        assert_eq!(tail[1].id, "n4");

        // Tail larger than the log returns everything.
        let tail = log.tail::<Note>(50).unwrap();
        assert_eq!(tail.len(), 5);
    }

    #[test]
    fn test_concurrent_appends_are_not_torn() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("notes.jsonl");
        let log = std::sync::Arc::new(RecordLog::open(&path));

        let mut handles = Vec::new();
        for t in 0..4 {
            let log = log.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    log.append(&note(&format!("t{}-{}", t, i), "body", i)).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let all = log.read_all::<Note>().unwrap();
        assert_eq!(all.len(), 100);
    }
}
