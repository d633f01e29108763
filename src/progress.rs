//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the runner works through the to-do set. The CLI uses this to drive its
//! progress bar; library users can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use ocr_batch::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     converted: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, filename: &str, attempts: u32) {
//!         self.converted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{index}/{total}] {filename} ok after {attempts} attempt(s)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { converted: AtomicUsize::new(0) });
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;
use std::time::Duration;

/// Called by the batch runner as it processes each file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `index` is 1-based within the to-do set.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after the progress log and input root have been read.
    ///
    /// # Arguments
    /// * `found`: inputs discovered under the input root
    /// * `converted`: records in the progress log whose status is success
    /// * `remaining`: size of the to-do set
    fn on_run_start(&self, found: usize, converted: usize, remaining: usize) {
        let _ = (found, converted, remaining);
    }

    /// Called before the first attempt for a file.
    fn on_file_start(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called after every failed attempt.
    ///
    /// `retry_in` is the backoff about to be slept, or `None` when this was
    /// the last attempt.
    fn on_attempt_failed(
        &self,
        filename: &str,
        attempt: u32,
        error: &str,
        retry_in: Option<Duration>,
    ) {
        let _ = (filename, attempt, error, retry_in);
    }

    /// Called when a file converts successfully.
    fn on_file_complete(&self, index: usize, total: usize, filename: &str, attempts: u32) {
        let _ = (index, total, filename, attempts);
    }

    /// Called when a file exhausts all attempts.
    fn on_file_failed(&self, index: usize, total: usize, filename: &str, attempts: u32) {
        let _ = (index, total, filename, attempts);
    }

    /// Called once after every file in the to-do set has been processed.
    ///
    /// # Arguments
    /// * `attempted`: size of the to-do set
    /// * `succeeded`: files converted during this run
    fn on_run_complete(&self, attempted: usize, succeeded: usize) {
        let _ = (attempted, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
