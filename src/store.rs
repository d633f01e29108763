//! Append-only CSV progress log.
//!
//! Every attempt outcome is appended as one row
//! (`filename,status,attempts,error`). The log is never rewritten: reading it
//! back folds rows in file order into a [`Snapshot`] where the last row for a
//! filename wins. A file whose latest row says `success` is skipped by the
//! next run; anything else is retried.

use crate::error::BatchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome stored in the `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Error,
}

/// One row of the progress log; field order is the column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Path relative to the input root, `/`-separated.
    pub filename: String,
    pub status: RecordStatus,
    /// 1-based attempt number this row was written for.
    pub attempts: u32,
    /// Failure message; empty on success.
    pub error: String,
}

impl ProgressRecord {
    pub fn success(filename: impl Into<String>, attempts: u32) -> Self {
        Self {
            filename: filename.into(),
            status: RecordStatus::Success,
            attempts,
            error: String::new(),
        }
    }

    pub fn error(filename: impl Into<String>, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: RecordStatus::Error,
            attempts,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }
}

/// Latest record per filename, as read back from the log.
pub type Snapshot = BTreeMap<String, ProgressRecord>;

/// Number of files whose latest record is a success.
pub fn succeeded_count(snapshot: &Snapshot) -> usize {
    snapshot.values().filter(|r| r.is_success()).count()
}

/// Handle on the progress log file.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the log into a snapshot. A missing log is an empty snapshot.
    ///
    /// Rows that fail to parse are skipped with a warning; an I/O failure is
    /// fatal.
    pub fn load(&self) -> Result<Snapshot, BatchError> {
        let mut snapshot = Snapshot::new();
        if !self.path.exists() {
            debug!("No progress log at {}", self.path.display());
            return Ok(snapshot);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|e| self.read_err(e))?;

        for row in reader.deserialize::<ProgressRecord>() {
            match row {
                Ok(record) => {
                    snapshot.insert(record.filename.clone(), record);
                }
                Err(e) if e.is_io_error() => return Err(self.read_err(e)),
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or(0);
                    warn!(
                        "Skipping malformed row {} in {}: {}",
                        line,
                        self.path.display(),
                        e
                    );
                }
            }
        }

        debug!(
            "Loaded {} progress records from {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(snapshot)
    }

    /// Append one record, writing the header row first if the log is new or
    /// empty. The row is flushed before returning.
    pub fn append(&self, record: &ProgressRecord) -> Result<(), BatchError> {
        let needs_header = fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.write_err(e.into()))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.write_err(e.into()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(record).map_err(|e| self.write_err(e))?;
        writer.flush().map_err(|e| self.write_err(e.into()))?;
        Ok(())
    }

    fn read_err(&self, source: csv::Error) -> BatchError {
        BatchError::ProgressReadFailed {
            path: self.path.clone(),
            source,
        }
    }

    fn write_err(&self, source: csv::Error) -> BatchError {
        BatchError::ProgressWriteFailed {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ProgressStore {
        ProgressStore::new(dir.path().join("processed_files.csv"))
    }

    #[test]
    fn missing_log_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.load().unwrap().is_empty());
        assert!(!store.path().exists(), "load must not create the log");
    }

    #[test]
    fn first_append_writes_header() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append(&ProgressRecord::success("a.pdf", 1)).unwrap();
        store
            .append(&ProgressRecord::error("b.pdf", 2, "boom"))
            .unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "filename,status,attempts,error");
        assert_eq!(lines[1], "a.pdf,success,1,");
        assert_eq!(lines[2], "b.pdf,error,2,boom");
        assert_eq!(lines.len(), 3, "header must be written only once");
    }

    #[test]
    fn last_row_per_filename_wins() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append(&ProgressRecord::success("a.pdf", 1)).unwrap();
        store.append(&ProgressRecord::error("a.pdf", 1, "later failure")).unwrap();
        store.append(&ProgressRecord::error("b.pdf", 1, "x")).unwrap();
        store.append(&ProgressRecord::success("b.pdf", 2)).unwrap();

        let snap = store.load().unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap["a.pdf"].status, RecordStatus::Error);
        assert_eq!(snap["b.pdf"].status, RecordStatus::Success);
        assert_eq!(snap["b.pdf"].attempts, 2);
        assert_eq!(succeeded_count(&snap), 1);
    }

    #[test]
    fn errors_with_commas_quotes_and_newlines_survive() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let msg = "HTTP 500: {\"detail\": \"a, b\"}\nsecond line";
        store.append(&ProgressRecord::error("dir/x,y.pdf", 3, msg)).unwrap();

        let snap = store.load().unwrap();
        let rec = &snap["dir/x,y.pdf"];
        assert_eq!(rec.error, msg);
        assert_eq!(rec.attempts, 3);
    }

    #[test]
    fn reads_crlf_log_with_empty_error_fields() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            "filename,status,attempts,error\r\n\
             a.pdf,error,1,Unauthorized\r\n\
             a.pdf,success,2,\r\n",
        )
        .unwrap();

        let snap = store.load().unwrap();
        assert!(snap["a.pdf"].is_success());
        assert_eq!(snap["a.pdf"].attempts, 2);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            "filename,status,attempts,error\n\
             a.pdf,success,1,\n\
             b.pdf,finished,1,\n\
             c.pdf,error,not-a-number,x\n\
             d.pdf,error,2,y\n",
        )
        .unwrap();

        let snap = store.load().unwrap();
        let keys: Vec<&str> = snap.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a.pdf", "d.pdf"]);
    }

    #[test]
    fn empty_existing_file_gets_header() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "").unwrap();
        store.append(&ProgressRecord::success("a.pdf", 1)).unwrap();
        let snap = store.load().unwrap();
        assert!(snap["a.pdf"].is_success());
    }

    #[test]
    fn append_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("state/nested/progress.csv"));
        store.append(&ProgressRecord::success("a.pdf", 1)).unwrap();
        assert!(store.path().exists());
    }
}
