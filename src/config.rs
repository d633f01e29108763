//! Configuration types for a batch OCR run.
//!
//! Every knob of a run lives in [`BatchConfig`], built once at process start
//! via [`BatchConfigBuilder`] and handed to [`crate::batch::BatchRunner`].
//! Nothing in the library reads globals or the environment on its own.

use crate::error::BatchError;
use crate::pipeline::encode::mime_for_extension;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Default OCR model identifier.
pub const DEFAULT_MODEL: &str = "mistral-ocr-latest";

/// Configuration for a batch conversion run.
///
/// # Example
/// ```rust
/// use ocr_batch::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .input_dir("scans")
///     .output_dir("markdown")
///     .max_attempts(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 3);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Root directory scanned recursively for inputs. Default: `docs_import`.
    pub input_dir: PathBuf,

    /// Root directory receiving converted documents. Default: `docs_exports`.
    pub output_dir: PathBuf,

    /// Append-only CSV progress log. Default: `processed_files.csv`.
    pub progress_file: PathBuf,

    /// Input extensions (lower-case, no dot) matched case-insensitively.
    /// Default: `["pdf"]`.
    pub extensions: Vec<String>,

    /// Extension given to converted documents. Default: `md`.
    pub output_extension: String,

    /// OCR model identifier. Default: `mistral-ocr-latest`.
    pub model: String,

    /// Attempts per file before it is recorded as failed. Default: 5.
    pub max_attempts: u32,

    /// Delay after the first failed attempt, doubled after each further
    /// failure. Default: 1000 ms (1 s → 2 s → 4 s → 8 s).
    pub initial_backoff_ms: u64,

    /// Pause after every successful file. Default: 3000 ms.
    pub inter_file_delay_ms: u64,

    /// Ask the service to return base64 images embedded in pages. Default: false.
    pub include_image_base64: bool,

    /// Optional progress callback for per-file events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("docs_import"),
            output_dir: PathBuf::from("docs_exports"),
            progress_file: PathBuf::from("processed_files.csv"),
            extensions: vec!["pdf".to_string()],
            output_extension: "md".to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_attempts: 5,
            initial_backoff_ms: 1000,
            inter_file_delay_ms: 3000,
            include_image_base64: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .field("progress_file", &self.progress_file)
            .field("extensions", &self.extensions)
            .field("output_extension", &self.output_extension)
            .field("model", &self.model)
            .field("max_attempts", &self.max_attempts)
            .field("initial_backoff_ms", &self.initial_backoff_ms)
            .field("inter_file_delay_ms", &self.inter_file_delay_ms)
            .field("include_image_base64", &self.include_image_base64)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn progress_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.progress_file = path.into();
        self
    }

    /// Replace the accepted input extensions. Leading dots are stripped and
    /// values are lower-cased.
    pub fn extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.extensions = exts
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn output_extension(mut self, ext: impl AsRef<str>) -> Self {
        self.config.output_extension = ext.as_ref().trim().trim_start_matches('.').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn initial_backoff_ms(mut self, ms: u64) -> Self {
        self.config.initial_backoff_ms = ms;
        self
    }

    pub fn inter_file_delay_ms(mut self, ms: u64) -> Self {
        self.config.inter_file_delay_ms = ms;
        self
    }

    pub fn include_image_base64(mut self, v: bool) -> Self {
        self.config.include_image_base64 = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(BatchError::InvalidConfig(
                "max attempts must be ≥ 1".into(),
            ));
        }
        if c.extensions.is_empty() {
            return Err(BatchError::InvalidConfig(
                "at least one input extension is required".into(),
            ));
        }
        if let Some(bad) = c.extensions.iter().find(|e| mime_for_extension(e).is_none()) {
            return Err(BatchError::InvalidConfig(format!(
                "unsupported input extension '{bad}' (expected pdf, png, jpg, jpeg or webp)"
            )));
        }
        if c.output_extension.is_empty() {
            return Err(BatchError::InvalidConfig(
                "output extension must not be empty".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(BatchError::InvalidConfig("model must not be empty".into()));
        }
        Ok(self.config)
    }
}
