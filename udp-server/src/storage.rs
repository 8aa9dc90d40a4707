//! The on-disk message log: one JSON object keyed by arrival timestamp.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Local;
use log::warn;
use missive::{LogRecord, Submission};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use thiserror::Error;

/// Local time, microsecond precision, no offset.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize message log: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Exclusive owner of the log file.
///
/// Every append re-reads and rewrites the whole file. The mutex serializes
/// appends within one process; separate processes sharing a file will lose
/// updates.
#[derive(Debug)]
pub struct LogStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores `submission` under the current local time.
    pub fn append(&self, submission: &Submission) -> Result<LogRecord, StorageError> {
        self.append_at(now_timestamp(), submission)
    }

    /// Stores `submission` under `timestamp`, replacing any entry already there.
    pub fn append_at(
        &self,
        timestamp: String,
        submission: &Submission,
    ) -> Result<LogRecord, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut log = self.read_log();
        log.insert(timestamp.clone(), serde_json::to_value(submission)?);
        self.write_log(&log)?;

        Ok(LogRecord::new(timestamp, submission.clone()))
    }

    /// All records in file order. Entries that are not submissions are skipped.
    pub fn load(&self) -> Vec<LogRecord> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.read_log()
            .into_iter()
            .filter_map(|(timestamp, value)| {
                serde_json::from_value::<Submission>(value)
                    .ok()
                    .map(|submission| LogRecord::new(timestamp, submission))
            })
            .collect()
    }

    // Anything we cannot make sense of counts as an empty log.
    fn read_log(&self) -> Map<String, Value> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Map::new(),
            Err(err) => {
                warn!("cannot read {}, starting a new log: {}", self.path.display(), err);
                return Map::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(log)) => log,
            Ok(_) => {
                warn!("{} is not a JSON object, starting a new log", self.path.display());
                Map::new()
            }
            Err(err) => {
                warn!("cannot parse {}, starting a new log: {}", self.path.display(), err);
                Map::new()
            }
        }
    }

    fn write_log(&self, log: &Map<String, Value>) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        log.serialize(&mut ser)?;

        fs::write(&self.path, buf).map_err(io_err)
    }
}

pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
fn store_in(dir: &tempfile::TempDir) -> LogStore {
    LogStore::new(dir.path().join("storage").join("data.json"))
}

#[test]
fn test_append_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    let record = store.append(&Submission::new("alice", "hello")).unwrap();

    assert!(store.path().exists());
    assert_eq!(store.load(), vec![record]);
}

#[test]
fn test_appends_keep_earlier_entries_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store
        .append_at("2024-05-01T10:00:00.000002".into(), &Submission::new("b", "second"))
        .unwrap();
    store
        .append_at("2024-05-01T10:00:00.000001".into(), &Submission::new("a", "first"))
        .unwrap();

    let timestamps: Vec<_> = store.load().into_iter().map(|r| r.timestamp).collect();
    // Arrival order, not timestamp order.
    assert_eq!(
        timestamps,
        vec!["2024-05-01T10:00:00.000002", "2024-05-01T10:00:00.000001"]
    );
}

#[test]
fn test_same_timestamp_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let ts = "2024-05-01T10:00:00.000000".to_string();

    store.append_at(ts.clone(), &Submission::new("a", "one")).unwrap();
    store.append_at(ts.clone(), &Submission::new("a", "two")).unwrap();

    assert_eq!(store.load(), vec![LogRecord::new(ts, Submission::new("a", "two"))]);
}

#[test]
fn test_corrupt_log_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    fs::create_dir_all(store.path().parent().unwrap()).unwrap();

    for garbage in ["{ not json", "[1, 2, 3]"] {
        fs::write(store.path(), garbage).unwrap();
        store.append(&Submission::new("alice", "hello")).unwrap();

        let log: Map<String, Value> =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(log.len(), 1);
    }
}

#[test]
fn test_file_format() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store
        .append_at("2024-05-01T10:00:00.123456".into(), &Submission::new("Олена", "Привіт, світ"))
        .unwrap();

    let written = fs::read_to_string(store.path()).unwrap();
    assert_eq!(
        written,
        "{\n    \"2024-05-01T10:00:00.123456\": {\n        \"username\": \"Олена\",\n        \"message\": \"Привіт, світ\"\n    }\n}"
    );
}

#[test]
fn test_foreign_entries_survive() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    fs::create_dir_all(store.path().parent().unwrap()).unwrap();
    fs::write(store.path(), r#"{"note": 42}"#).unwrap();

    store.append(&Submission::new("alice", "hello")).unwrap();

    let log: Map<String, Value> =
        serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log["note"], Value::from(42));
    // load() only reports submissions.
    assert_eq!(store.load().len(), 1);
}

#[test]
fn test_timestamp_format() {
    let ts = now_timestamp();
    assert!(chrono::NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).is_ok(), "{}", ts);
    assert_eq!(ts.len(), "2024-05-01T10:00:00.123456".len());
}
