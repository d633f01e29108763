//! CLI binary for ocr-batch.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`,
//! sets up logging (stderr + diagnostics file) and prints progress.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ocr_batch::{
    plan, BatchConfig, BatchProgressCallback, BatchRunner, MistralOcrClient, ProgressCallback,
    RunSummary, DEFAULT_MODEL,
};
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn truncate(msg: &str, max: usize) -> String {
    if msg.chars().count() > max {
        let cut: String = msg.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        msg.to_string()
    }
}

// ── Progress bar callback ────────────────────────────────────────────────────

/// Terminal progress callback: a bar over the to-do set plus one log line
/// per file and per failed attempt.
struct BarProgressCallback {
    bar: ProgressBar,
    file_started: Mutex<Option<Instant>>,
}

impl BarProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading progress log…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            file_started: Mutex::new(None),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    /// Remove the bar if the run ended without `on_run_complete`.
    fn clear(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }

    fn file_elapsed(&self) -> String {
        let secs = self
            .file_started
            .lock()
            .ok()
            .and_then(|mut g| g.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl BatchProgressCallback for BarProgressCallback {
    fn on_run_start(&self, found: usize, converted: usize, remaining: usize) {
        self.activate_bar(remaining);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Found {found} files. {converted} already converted. {remaining} remaining."
            ))
        ));
    }

    fn on_file_start(&self, _index: usize, _total: usize, filename: &str) {
        if let Ok(mut g) = self.file_started.lock() {
            *g = Some(Instant::now());
        }
        self.bar.set_message(filename.to_string());
    }

    fn on_attempt_failed(
        &self,
        filename: &str,
        attempt: u32,
        error: &str,
        retry_in: Option<Duration>,
    ) {
        let retry = match retry_in {
            Some(d) => dim(&format!("retrying in {}s", d.as_secs_f64())),
            None => dim("no attempts left"),
        };
        self.bar.println(format!(
            "  {} {}  attempt {}  {}  {}",
            yellow("↻"),
            filename,
            attempt,
            red(&truncate(error, 80)),
            retry,
        ));
    }

    fn on_file_complete(&self, index: usize, total: usize, filename: &str, attempts: u32) {
        self.bar.println(format!(
            "  {} [{:>3}/{:<3}] {}  {}  {}",
            green("✓"),
            index,
            total,
            filename,
            dim(&format!("attempt {attempts}")),
            self.file_elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_file_failed(&self, index: usize, total: usize, filename: &str, attempts: u32) {
        self.bar.println(format!(
            "  {} [{:>3}/{:<3}] {}  {}  {}",
            red("✗"),
            index,
            total,
            filename,
            red(&format!("failed after {attempts} attempts")),
            self.file_elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, attempted: usize, succeeded: usize) {
        self.bar.finish_and_clear();
        let failed = attempted.saturating_sub(succeeded);
        let mark = if failed == 0 {
            green("✔")
        } else if succeeded == 0 {
            red("✘")
        } else {
            cyan("⚠")
        };
        eprintln!(
            "{} {}/{} files converted{}",
            mark,
            bold(&succeeded.to_string()),
            attempted,
            if failed > 0 {
                format!("  ({} failed)", red(&failed.to_string()))
            } else {
                String::new()
            }
        );
    }
}

// ── Plain-line callback (--no-progress) ──────────────────────────────────────

/// One line per event on stdout, for logs and non-interactive terminals.
struct PlainProgressCallback;

impl BatchProgressCallback for PlainProgressCallback {
    fn on_run_start(&self, found: usize, converted: usize, remaining: usize) {
        println!("Found {found} files. {converted} already converted. {remaining} remaining.");
    }

    fn on_file_start(&self, index: usize, total: usize, filename: &str) {
        println!("[{index}/{total}] Processing: {filename}");
    }

    fn on_attempt_failed(
        &self,
        filename: &str,
        attempt: u32,
        error: &str,
        retry_in: Option<Duration>,
    ) {
        println!("Error converting {filename} on attempt {attempt}: {error}");
        if let Some(d) = retry_in {
            println!("Retrying in {} seconds...", d.as_secs_f64());
        }
    }

    fn on_file_complete(&self, _index: usize, _total: usize, filename: &str, attempts: u32) {
        println!("Success: {filename} (attempt {attempts})");
    }

    fn on_file_failed(&self, _index: usize, _total: usize, filename: &str, attempts: u32) {
        println!("Failed: {filename} after {attempts} attempts.");
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every PDF under ./docs_import into ./docs_exports
  ocr-batch

  # Custom folders, PDFs and scanned images
  ocr-batch --input-dir scans --output-dir text --ext pdf,png,jpg

  # Show what is left to do without calling the OCR service
  ocr-batch --status-only

  # Plain log lines instead of a progress bar (e.g. under cron)
  ocr-batch --no-progress

RESUMING:
  Every attempt is appended to the progress log (processed_files.csv by
  default). Re-running skips files whose latest row is `success` and
  retries everything else. Delete the log to convert everything again.

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY         OCR service API key (required unless --status-only)
  MISTRAL_BASE_URL        Override the service root URL
  RUST_LOG                Override the stderr log filter
"#;

/// Batch-convert PDFs and images to Markdown with a remote OCR service.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-batch",
    version,
    about = "Batch-convert PDFs and images to Markdown with a remote OCR service",
    long_about = "Walks an input folder, sends every PDF (or image) to the Mistral OCR API and \
writes one Markdown file per input. Progress is tracked in a CSV log so interrupted or \
partially failed runs can simply be started again.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Folder scanned recursively for inputs.
    #[arg(short, long, env = "OCR_BATCH_INPUT_DIR", default_value = "docs_import")]
    input_dir: PathBuf,

    /// Folder receiving converted documents.
    #[arg(short, long, env = "OCR_BATCH_OUTPUT_DIR", default_value = "docs_exports")]
    output_dir: PathBuf,

    /// Append-only CSV progress log.
    #[arg(long, env = "OCR_BATCH_PROGRESS_FILE", default_value = "processed_files.csv")]
    progress_file: PathBuf,

    /// Diagnostics log (timestamped, appended).
    #[arg(long, env = "OCR_BATCH_LOG_FILE", default_value = "conversion.log")]
    log_file: PathBuf,

    /// Input extensions: pdf, png, jpg, jpeg, webp (comma-separated).
    #[arg(long = "ext", env = "OCR_BATCH_EXTENSIONS", value_delimiter = ',', default_value = "pdf")]
    extensions: Vec<String>,

    /// Extension for converted documents.
    #[arg(long, env = "OCR_BATCH_OUTPUT_EXT", default_value = "md")]
    output_ext: String,

    /// OCR model identifier.
    #[arg(long, env = "OCR_BATCH_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// OCR service API key.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OCR service root URL.
    #[arg(long, env = "MISTRAL_BASE_URL", default_value = ocr_batch::pipeline::ocr::DEFAULT_BASE_URL)]
    base_url: String,

    /// Per-request timeout in seconds (default: HTTP client default).
    #[arg(long, env = "OCR_BATCH_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// Attempts per file before giving up.
    #[arg(long, env = "OCR_BATCH_MAX_ATTEMPTS", default_value_t = 5,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Initial retry backoff in seconds (doubles after each failure).
    #[arg(long, env = "OCR_BATCH_BACKOFF", default_value_t = 1.0)]
    backoff: f64,

    /// Pause after each converted file, in seconds.
    #[arg(long, env = "OCR_BATCH_DELAY", default_value_t = 3.0)]
    delay: f64,

    /// Ask the service to embed extracted images as base64.
    #[arg(long)]
    include_images: bool,

    /// Print progress-log counts only; do not convert.
    #[arg(long)]
    status_only: bool,

    /// Print the run summary (or status) as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar; print plain lines instead.
    #[arg(long, env = "OCR_BATCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs on stderr.
    #[arg(short, long, env = "OCR_BATCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCR_BATCH_QUIET")]
    quiet: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.status_only;
    init_logging(&cli, show_progress)?;

    let result = run(&cli, show_progress).await;
    if let Err(ref e) = result {
        error!("Fatal: {e:#}");
    }
    result
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    let bar = show_progress.then(BarProgressCallback::new);
    let progress_cb: Option<ProgressCallback> = match &bar {
        Some(bar) => Some(bar.clone() as Arc<dyn BatchProgressCallback>),
        None if !cli.quiet && !cli.json && !cli.status_only => {
            Some(Arc::new(PlainProgressCallback))
        }
        None => None,
    };

    let result = convert(cli, progress_cb).await;
    if result.is_err() {
        // Don't leave the spinner above the error message.
        if let Some(bar) = &bar {
            bar.clear();
        }
    }
    result
}

async fn convert(cli: &Cli, progress_cb: Option<ProgressCallback>) -> Result<()> {
    let config = build_config(cli, progress_cb)?;

    // ── Status-only mode ─────────────────────────────────────────────────
    if cli.status_only {
        return print_status(&config, cli.json);
    }

    // ── Convert ──────────────────────────────────────────────────────────
    let client = MistralOcrClient::builder()
        .api_key(cli.api_key.clone())
        .base_url(&cli.base_url)
        .timeout_secs(cli.api_timeout)
        .build()
        .context("Cannot start conversion")?;

    let summary = BatchRunner::new(config.clone(), Arc::new(client))
        .run()
        .await
        .context("Batch conversion aborted")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        print_summary(&summary, &config);
    }

    Ok(())
}

/// Stderr layer filtered like the `-v`/`-q` flags; file layer always at
/// INFO for this crate, WARN for dependencies.
fn init_logging(cli: &Cli, show_progress: bool) -> Result<()> {
    // The progress bar already tells the user what matters.
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cli.log_file)
        .with_context(|| format!("Failed to open log file {:?}", cli.log_file))?;
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .with_filter(EnvFilter::new("warn,ocr_batch=info"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .input_dir(&cli.input_dir)
        .output_dir(&cli.output_dir)
        .progress_file(&cli.progress_file)
        .extensions(&cli.extensions)
        .output_extension(&cli.output_ext)
        .model(&cli.model)
        .max_attempts(cli.max_attempts)
        .initial_backoff_ms(secs_to_ms(cli.backoff, "--backoff")?)
        .inter_file_delay_ms(secs_to_ms(cli.delay, "--delay")?)
        .include_image_base64(cli.include_images);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn secs_to_ms(secs: f64, flag: &str) -> Result<u64> {
    if !secs.is_finite() || secs < 0.0 {
        anyhow::bail!("{flag} must be a non-negative number of seconds (got {secs})");
    }
    Ok((secs * 1000.0).round() as u64)
}

fn print_status(config: &BatchConfig, json: bool) -> Result<()> {
    let plan = plan(config).context("Failed to read status")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&plan).context("Failed to serialise status")?
        );
        return Ok(());
    }

    println!("Input:         {} ({} files)", config.input_dir.display(), plan.found.len());
    println!("Output:        {}", config.output_dir.display());
    println!("Progress log:  {}", config.progress_file.display());
    println!("Converted:     {}", plan.already_converted);
    println!("Failed:        {}", plan.previously_failed);
    println!("Remaining:     {}", plan.to_do.len());
    for f in &plan.to_do {
        println!("  {f}");
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, config: &BatchConfig) {
    println!(
        "\nConversion complete. Total successful conversions: {} out of {}.",
        summary.succeeded, summary.attempted
    );
    println!(
        "All converted files are saved in '{}/' directory.",
        config.output_dir.display()
    );
    for f in summary.failed_files() {
        println!(
            "  {} {}: {}",
            red("✗"),
            f.filename,
            f.error.as_deref().unwrap_or("unknown error")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["ocr-batch"]);
        assert_eq!(cli.input_dir, PathBuf::from("docs_import"));
        assert_eq!(cli.extensions, vec!["pdf"]);
        assert_eq!(cli.max_attempts, 5);
        assert_eq!(cli.delay, 3.0);
    }

    #[test]
    fn extensions_split_on_commas() {
        let cli = Cli::parse_from(["ocr-batch", "--ext", "pdf,PNG,jpg"]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.extensions, vec!["pdf", "png", "jpg"]);
    }

    #[test]
    fn zero_attempts_rejected_by_parser() {
        assert!(Cli::try_parse_from(["ocr-batch", "--max-attempts", "0"]).is_err());
    }

    #[test]
    fn seconds_convert_to_millis() {
        assert_eq!(secs_to_ms(1.5, "--delay").unwrap(), 1500);
        assert!(secs_to_ms(-1.0, "--delay").is_err());
    }

    #[test]
    fn clearing_an_unfinished_bar_finishes_it() {
        let cb = BarProgressCallback::new();
        assert!(!cb.bar.is_finished());
        cb.clear();
        assert!(cb.bar.is_finished());
        // Idempotent once finished.
        cb.clear();
        assert!(cb.bar.is_finished());
    }

    #[test]
    fn truncate_long_messages() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 5).chars().count(), 5);
    }
}
