//! Batch driver: convert every not-yet-converted input, one at a time.
//!
//! A run reads the progress log, enumerates the input root, and works
//! through the to-do set sequentially. Each file goes through a bounded
//! retry loop:
//!
//! ```text
//! Pending ──▶ Attempting ──┬──▶ Success   (row: success, attempts = k)
//!               ▲    │     │
//!               └────┘     └──▶ Failed    (after max_attempts error rows)
//!         error row + backoff
//! ```
//!
//! Every attempt outcome is appended to the progress log before anything
//! else happens, so a killed process loses at most the attempt in flight.
//! Backoff starts at `initial_backoff_ms` and doubles after each failure
//! (1 s → 2 s → 4 s → 8 s with defaults). A successful file is followed by
//! the fixed inter-file delay; a failed one is not.

use crate::config::BatchConfig;
use crate::error::{AttemptError, BatchError};
use crate::output::{BatchPlan, FileOutcome, RunSummary};
use crate::pipeline::ocr::{OcrClient, OcrRequest};
use crate::pipeline::{encode, input, render};
use crate::progress::{BatchProgressCallback, NoopProgressCallback};
use crate::store::{succeeded_count, ProgressRecord, ProgressStore, RecordStatus, Snapshot};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Blocking wait used for backoff and the inter-file delay.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Retry state for one file, dropped once the file reaches a terminal state.
#[derive(Debug)]
struct ConversionTask<'a> {
    filename: &'a str,
    attempts_made: u32,
    backoff: Duration,
}

impl<'a> ConversionTask<'a> {
    fn new(filename: &'a str, initial_backoff: Duration) -> Self {
        Self {
            filename,
            attempts_made: 0,
            backoff: initial_backoff,
        }
    }

    /// Start the next attempt and return its 1-based number.
    fn begin_attempt(&mut self) -> u32 {
        self.attempts_made += 1;
        self.attempts_made
    }

    /// Current backoff; doubles the next one.
    fn take_backoff(&mut self) -> Duration {
        let wait = self.backoff;
        self.backoff = self.backoff.saturating_mul(2);
        wait
    }
}

/// A successful attempt.
struct Converted {
    output_path: PathBuf,
    pages: usize,
}

/// Compute the to-do set: inputs whose latest record is not a success.
pub fn build_plan(found: Vec<String>, snapshot: &Snapshot) -> BatchPlan {
    let to_do = found
        .iter()
        .filter(|f| !snapshot.get(f.as_str()).is_some_and(|r| r.is_success()))
        .cloned()
        .collect();

    BatchPlan {
        already_converted: succeeded_count(snapshot),
        previously_failed: snapshot.values().filter(|r| !r.is_success()).count(),
        found,
        to_do,
    }
}

/// Read the progress log and enumerate inputs without converting anything.
///
/// Does not need an OCR client, so it backs the CLI's status mode.
pub fn plan(config: &BatchConfig) -> Result<BatchPlan, BatchError> {
    let snapshot = ProgressStore::new(&config.progress_file).load()?;
    let found = input::list_inputs(&config.input_dir, &config.extensions)?;
    Ok(build_plan(found, &snapshot))
}

/// Run a whole batch with the default sleeper.
///
/// Convenience wrapper around [`BatchRunner::run`].
pub async fn run_batch(
    config: BatchConfig,
    client: Arc<dyn OcrClient>,
) -> Result<RunSummary, BatchError> {
    BatchRunner::new(config, client).run().await
}

/// Drives a batch run. Owns the configuration, OCR client and sleeper.
pub struct BatchRunner {
    config: BatchConfig,
    client: Arc<dyn OcrClient>,
    sleeper: Arc<dyn Sleeper>,
    store: ProgressStore,
}

impl BatchRunner {
    pub fn new(config: BatchConfig, client: Arc<dyn OcrClient>) -> Self {
        let store = ProgressStore::new(&config.progress_file);
        Self {
            config,
            client,
            sleeper: Arc::new(TokioSleeper),
            store,
        }
    }

    /// Replace the sleeper used for backoff and inter-file delays.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    /// See [`plan`].
    pub fn plan(&self) -> Result<BatchPlan, BatchError> {
        plan(&self.config)
    }

    /// Convert every file in the to-do set.
    ///
    /// # Errors
    /// Only fatal conditions: missing input root, unreadable or unwritable
    /// progress log, two inputs that cannot be given distinct output
    /// documents, output root that cannot be created. Files that exhaust
    /// their attempts are reported in the summary, not as errors.
    pub async fn run(&self) -> Result<RunSummary, BatchError> {
        let start = Instant::now();
        let plan = self.plan()?;
        let outputs = render::output_paths(
            &self.config.output_dir,
            &plan.found,
            &self.config.output_extension,
        )?;
        self.ensure_output_dir()?;

        let total = plan.to_do.len();
        info!(
            "Found {} inputs in '{}': {} already converted, {} remaining",
            plan.found.len(),
            self.config.input_dir.display(),
            plan.already_converted,
            total
        );

        let cb = self.callback();
        cb.on_run_start(plan.found.len(), plan.already_converted, total);

        let mut files = Vec::with_capacity(total);
        for (i, filename) in plan.to_do.iter().enumerate() {
            let index = i + 1;
            cb.on_file_start(index, total, filename);
            info!("[{}/{}] Processing {}", index, total, filename);

            let output_path = match outputs.get(filename) {
                Some(p) => p.clone(),
                None => render::output_path_for(
                    &self.config.output_dir,
                    filename,
                    &self.config.output_extension,
                ),
            };
            let outcome = self
                .convert_file(filename, &output_path, cb.as_ref())
                .await?;

            if outcome.is_success() {
                cb.on_file_complete(index, total, filename, outcome.attempts);
                debug!("Waiting {}ms before next file", self.config.inter_file_delay_ms);
                self.sleeper
                    .sleep(Duration::from_millis(self.config.inter_file_delay_ms))
                    .await;
            } else {
                cb.on_file_failed(index, total, filename, outcome.attempts);
            }
            files.push(outcome);
        }

        let succeeded = files.iter().filter(|f| f.is_success()).count();
        let summary = RunSummary {
            found: plan.found.len(),
            already_converted: plan.already_converted,
            attempted: total,
            succeeded,
            failed: total - succeeded,
            duration_ms: start.elapsed().as_millis() as u64,
            files,
        };

        info!(
            "Run complete: {}/{} converted, {}ms",
            summary.succeeded, summary.attempted, summary.duration_ms
        );
        cb.on_run_complete(summary.attempted, summary.succeeded);

        Ok(summary)
    }

    /// Run the retry loop for one file.
    ///
    /// Returns `Err` only when the progress log cannot be appended to.
    async fn convert_file(
        &self,
        filename: &str,
        output_path: &Path,
        cb: &dyn BatchProgressCallback,
    ) -> Result<FileOutcome, BatchError> {
        let max = self.config.max_attempts;
        let mut task = ConversionTask::new(
            filename,
            Duration::from_millis(self.config.initial_backoff_ms),
        );
        let mut last_error = None;

        while task.attempts_made < max {
            let attempt = task.begin_attempt();

            match self.attempt(task.filename, output_path).await {
                Ok(converted) => {
                    self.store
                        .append(&ProgressRecord::success(task.filename, attempt))?;
                    info!(
                        "Converted {} on attempt {} ({} pages) → {}",
                        task.filename,
                        attempt,
                        converted.pages,
                        converted.output_path.display()
                    );
                    return Ok(FileOutcome {
                        filename: task.filename.to_string(),
                        status: RecordStatus::Success,
                        attempts: attempt,
                        error: None,
                        output_path: Some(converted.output_path),
                        pages: converted.pages,
                    });
                }
                Err(e) => {
                    let msg = e.to_string();
                    self.store
                        .append(&ProgressRecord::error(task.filename, attempt, &msg))?;
                    warn!("{} attempt {}/{} failed: {}", task.filename, attempt, max, msg);

                    let retry_in = (attempt < max).then(|| task.take_backoff());
                    cb.on_attempt_failed(task.filename, attempt, &msg, retry_in);
                    if let Some(wait) = retry_in {
                        debug!("Retrying {} in {:?}", task.filename, wait);
                        self.sleeper.sleep(wait).await;
                    }
                    last_error = Some(msg);
                }
            }
        }

        error!(
            "Failed: {} after {} attempts",
            task.filename, task.attempts_made
        );
        Ok(FileOutcome {
            filename: task.filename.to_string(),
            status: RecordStatus::Error,
            attempts: task.attempts_made,
            error: last_error,
            output_path: None,
            pages: 0,
        })
    }

    /// One attempt: read, encode, OCR, write.
    async fn attempt(&self, filename: &str, output_path: &Path) -> Result<Converted, AttemptError> {
        let bytes = input::read_input(&self.config.input_dir, filename).await?;
        let ext = input::extension_of(filename).unwrap_or_default();
        let document = encode::encode_document(&ext, &bytes)?;

        let request = OcrRequest {
            model: self.config.model.clone(),
            document,
            include_image_base64: self.config.include_image_base64,
        };
        let response = self.client.process(&request).await?;
        if response.pages.is_empty() {
            warn!("OCR returned no pages for {}", filename);
        }

        render::write_document(output_path, &render::render_document(&response.pages))?;

        Ok(Converted {
            output_path: output_path.to_path_buf(),
            pages: response.pages.len(),
        })
    }

    fn ensure_output_dir(&self) -> Result<(), BatchError> {
        let dir = &self.config.output_dir;
        if dir.is_dir() {
            return Ok(());
        }
        std::fs::create_dir_all(dir).map_err(|source| BatchError::OutputDirFailed {
            path: dir.clone(),
            source,
        })?;
        info!("Created output directory: {}", dir.display());
        Ok(())
    }

    fn callback(&self) -> Arc<dyn BatchProgressCallback> {
        self.config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(rows: &[ProgressRecord]) -> Snapshot {
        rows.iter()
            .map(|r| (r.filename.clone(), r.clone()))
            .collect()
    }

    #[test]
    fn backoff_doubles_from_initial() {
        let mut task = ConversionTask::new("a.pdf", Duration::from_secs(1));
        let waits: Vec<u64> = (0..5).map(|_| task.take_backoff().as_secs()).collect();
        assert_eq!(waits, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn attempts_count_from_one() {
        let mut task = ConversionTask::new("a.pdf", Duration::ZERO);
        assert_eq!(task.begin_attempt(), 1);
        assert_eq!(task.begin_attempt(), 2);
        assert_eq!(task.attempts_made, 2);
    }

    #[test]
    fn plan_skips_only_successes() {
        let snap = snapshot(&[
            ProgressRecord::success("done.pdf", 1),
            ProgressRecord::error("failed.pdf", 5, "boom"),
            ProgressRecord::success("gone.pdf", 2),
        ]);
        let found = vec![
            "done.pdf".to_string(),
            "failed.pdf".to_string(),
            "new.pdf".to_string(),
        ];

        let plan = build_plan(found, &snap);
        assert_eq!(plan.to_do, vec!["failed.pdf", "new.pdf"]);
        assert_eq!(plan.already_converted, 2);
        assert_eq!(plan.previously_failed, 1);
        assert_eq!(plan.found.len(), 3);
    }

    #[test]
    fn plan_with_empty_log_does_everything() {
        let found = vec!["b.pdf".to_string(), "a.pdf".to_string()];
        let plan = build_plan(found.clone(), &Snapshot::new());
        assert_eq!(plan.to_do, found);
        assert_eq!(plan.already_converted, 0);
    }

    #[test]
    fn tokio_sleeper_sleeps() {
        tokio_test::block_on(async {
            let start = Instant::now();
            TokioSleeper.sleep(Duration::from_millis(5)).await;
            assert!(start.elapsed() >= Duration::from_millis(5));
        });
    }
}
