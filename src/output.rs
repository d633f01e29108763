//! Result types returned by a batch run.

use crate::store::RecordStatus;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What a run is going to do, computed before any conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    /// Inputs discovered under the input root, in walk order.
    pub found: Vec<String>,
    /// Records in the progress log whose latest status is success.
    pub already_converted: usize,
    /// Files whose latest record is an error.
    pub previously_failed: usize,
    /// Inputs not yet converted, in walk order.
    pub to_do: Vec<String>,
}

/// Terminal outcome for one file in this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub filename: String,
    pub status: RecordStatus,
    /// Attempts made during this run.
    pub attempts: u32,
    /// Last failure message, if the file failed.
    pub error: Option<String>,
    /// Written document, if the file converted.
    pub output_path: Option<PathBuf>,
    /// Pages returned by the OCR service.
    pub pages: usize,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub found: usize,
    pub already_converted: usize,
    /// Size of the to-do set.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub files: Vec<FileOutcome>,
}

impl RunSummary {
    /// Files that exhausted every attempt this run.
    pub fn failed_files(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| !f.is_success())
    }
}
