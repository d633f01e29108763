//! Error types for the ocr-batch library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BatchError`] (**fatal**): the run cannot proceed at all (input root
//!   missing, no API key, progress log unwritable). Returned as
//!   `Err(BatchError)` from [`crate::batch::BatchRunner::run`].
//!
//! * [`AttemptError`] (**non-fatal**): a single conversion attempt for one
//!   file failed. It is recorded in the progress log, reported to the
//!   progress callback, and the file is retried until the attempt ceiling.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the ocr-batch library.
///
/// Per-attempt failures use [`AttemptError`] and never escape a file's
/// retry loop.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Setup errors ──────────────────────────────────────────────────────
    /// The input root does not exist or is not a directory.
    #[error("Input directory '{path}' not found.\nCreate it or pass --input-dir <DIR>.")]
    InputDirNotFound { path: PathBuf },

    /// No credential for the OCR service was supplied.
    #[error("{var} is not set.\nExport it or pass --api-key <KEY>.")]
    MissingCredential { var: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client for the OCR service could not be constructed.
    #[error("Failed to initialise OCR client: {0}")]
    ClientInit(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the output root directory.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The progress log exists but could not be read.
    #[error("Failed to read progress log '{path}': {source}")]
    ProgressReadFailed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A record could not be appended to the progress log.
    #[error("Failed to append to progress log '{path}': {source}")]
    ProgressWriteFailed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// A non-fatal error for one conversion attempt.
///
/// The `Display` form is what lands in the `error` column of the progress
/// log, so messages stay on one line.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum AttemptError {
    /// The input file could not be read.
    #[error("failed to read '{path}': {detail}")]
    ReadFailed { path: PathBuf, detail: String },

    /// The file extension has no known MIME type.
    #[error("unsupported input type '{extension}'")]
    UnsupportedInput { extension: String },

    /// The input file has no bytes; nothing is sent to the service.
    #[error("input file is empty, nothing to encode")]
    EmptyInput,

    /// The service rejected the credential (HTTP 401/403).
    #[error("authentication failed (HTTP {status}): {detail}")]
    Unauthorized { status: u16, detail: String },

    /// The service returned HTTP 429.
    #[error("rate limited by OCR service{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-success HTTP status.
    #[error("OCR service returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Connection, TLS or timeout failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body was not a valid OCR result.
    #[error("malformed OCR response: {0}")]
    MalformedResponse(String),

    /// The output document could not be written.
    #[error("failed to write '{path}': {detail}")]
    OutputWriteFailed { path: PathBuf, detail: String },
}

fn retry_hint(secs: &Option<u64>) -> String {
    match secs {
        Some(s) => format!(" (retry after {s}s)"),
        None => String::new(),
    }
}
