//! Generic persistent record storage over append-only JSONL files.
//!
//! A [`RecordLog`] is a single newline-delimited JSON file. Writers append one
//! record per line under an advisory file lock; readers replay the file
//! oldest-first and fold to latest-state-per-id. Records are never rewritten
//! or deleted, so every line before the latest one for an id is history.

mod log;

pub use log::{LogError, RecordLog};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A record that can live in a [`RecordLog`].
///
/// Identity is an opaque string; the latest appended line for an id is the
/// record's current state.
pub trait Record: Serialize + DeserializeOwned {
    /// Stable identity of this record.
    fn id(&self) -> &str;
}

/// Current Unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
