//! # ocr-batch
//!
//! Batch-convert a folder of PDFs and images to Markdown through a remote
//! OCR service, resuming where the previous run stopped.
//!
//! ## Pipeline Overview
//!
//! ```text
//! progress log ─┐
//!               ├─▶ to-do set ─▶ for each file (sequential):
//! input root ───┘                  read ─▶ base64 ─▶ OCR ─▶ ## Page N … ─▶ .md
//!                                    ╰─ on failure: error row, backoff, retry
//! ```
//!
//! Every attempt outcome is appended to a CSV progress log. The next run
//! skips files whose latest row is `success` and retries everything else.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr_batch::{run_batch, BatchConfig, MistralOcrClient};
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads MISTRAL_API_KEY
//!     let client = MistralOcrClient::from_env()?;
//!     let config = BatchConfig::builder()
//!         .input_dir("docs_import")
//!         .output_dir("docs_exports")
//!         .build()?;
//!     let summary = run_batch(config, Arc::new(client)).await?;
//!     eprintln!("{}/{} converted", summary.succeeded, summary.attempted);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-batch` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{plan, run_batch, BatchRunner, Sleeper, TokioSleeper};
pub use config::{BatchConfig, BatchConfigBuilder, DEFAULT_MODEL};
pub use error::{AttemptError, BatchError};
pub use output::{BatchPlan, FileOutcome, RunSummary};
pub use pipeline::ocr::{
    DocumentRef, MistralOcrClient, MistralOcrClientBuilder, OcrClient, OcrPage, OcrRequest,
    OcrResponse,
};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use store::{ProgressRecord, ProgressStore, RecordStatus, Snapshot};
