//! CLI binary for qbank-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs the batch and prints the incomplete files.

use anyhow::{Context, Result};
use clap::Parser;
use qbank_extract::pipeline::input::{file_name, list_pdfs};
use qbank_extract::{
    parse_file, BatchReport, ExtractionConfig, ExtractionProgressCallback, Extractor,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
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

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished document.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
    incomplete: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
            incomplete: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_documents} quiz files…"))
        ));
    }

    fn on_document_start(&self, _index: usize, _total: usize, filename: &str) {
        if let Ok(mut s) = self.started.lock() {
            *s = Some(Instant::now());
        }
        self.bar.set_message(filename.to_string());
    }

    fn on_document_stored(&self, index: usize, total: usize, filename: &str) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:>4}/{:<4}  {}  {}",
            green("✓"),
            index,
            total,
            filename,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_incomplete(&self, index: usize, total: usize, filename: &str, reason: &str) {
        let secs = self.elapsed_secs();
        self.incomplete.fetch_add(1, Ordering::SeqCst);

        let msg: String = if reason.chars().count() > 80 {
            let cut: String = reason.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            reason.to_string()
        };

        self.bar.println(format!(
            "  {} {:>4}/{:<4}  {}  {}  {}",
            red("✗"),
            index,
            total,
            filename,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, stored: usize) {
        self.bar.finish_and_clear();
        let failed = total_documents.saturating_sub(stored);
        if failed == 0 {
            eprintln!("{} {} records stored", green("✔"), bold(&stored.to_string()));
        } else {
            eprintln!(
                "{} {}/{} records stored  ({} incomplete)",
                if stored == 0 { red("✘") } else { cyan("⚠") },
                bold(&stored.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract every quiz PDF in a directory
  qbank-extract quizzes/

  # Tag records with a bank and write elsewhere
  qbank-extract --bank CARDIO --output-dir out/ --assets-dir out/assets quizzes/

  # Check what the parser sees, without any model call
  qbank-extract --parse-only quizzes/ > parsed.jsonl

  # Machine-readable batch report
  qbank-extract --json quizzes/ > report.json

OUTPUT:
  {output-dir}/questions.jsonl              one record per line
  {output-dir}/questions_with_tables.jsonl  records where a table was found
  {assets-dir}/question-assets/{bank}/{record-id}/...  extracted images

EXIT STATUS:
  0  every document was stored
  1  a fatal error stopped the run
  2  one or more documents ended incomplete

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Override the log filter
"#;

/// Extract structured questions from exported quiz PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "qbank-extract",
    version,
    about = "Extract structured questions from exported quiz PDFs",
    long_about = "Parse a directory of exported medical-board quiz PDFs into question records \
(stem, choices, correct answers, per-choice explanations), format embedded tables and \
rephrase the prose with an LLM, then append each record to a JSON-lines store.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing quiz PDF files.
    input_dir: PathBuf,

    /// Directory for the JSON-lines record files.
    #[arg(long, env = "QBANK_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Root directory for extracted images.
    #[arg(long, env = "QBANK_ASSETS_DIR", default_value = "assets")]
    assets_dir: PathBuf,

    /// LLM model ID (e.g. gpt-4o, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "QBANK_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "QBANK_PROVIDER")]
    provider: Option<String>,

    /// Table-check attempts per field when the reply is malformed.
    #[arg(long, env = "QBANK_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Delay before the second attempt in ms; doubles for each further one.
    #[arg(long, env = "QBANK_RETRY_BACKOFF_MS", default_value_t = 2000)]
    retry_backoff_ms: u64,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "QBANK_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "QBANK_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "QBANK_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Question bank label stamped on every record.
    #[arg(long, env = "QBANK_BANK", default_value = "CUSTOM")]
    bank: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "QBANK_PASSWORD")]
    password: Option<String>,

    /// Print the parsed question of each file as JSON lines; no model calls,
    /// nothing stored.
    #[arg(long)]
    parse_only: bool,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "QBANK_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "QBANK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "QBANK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "QBANK_QUIET")]
    quiet: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParsedLine<'a> {
    filename: String,
    #[serde(flatten)]
    question: &'a qbank_extract::ParsedQuestion,
    warnings: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.parse_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let paths = list_pdfs(&cli.input_dir)
        .with_context(|| format!("Failed to list {}", cli.input_dir.display()))?;

    // ── Parse-only mode ──────────────────────────────────────────────────
    if cli.parse_only {
        let mut failed = 0usize;
        for path in &paths {
            match parse_file(path, &config).await {
                Ok(question) => {
                    let line = ParsedLine {
                        filename: file_name(path),
                        question: &question,
                        warnings: question
                            .consistency_warnings()
                            .iter()
                            .map(|w| w.to_string())
                            .collect(),
                    };
                    println!(
                        "{}",
                        serde_json::to_string(&line).context("Failed to serialise question")?
                    );
                }
                Err(e) => {
                    failed += 1;
                    eprintln!("{} {}: {}", red("✗"), path.display(), e);
                }
            }
        }
        if failed > 0 {
            std::process::exit(2);
        }
        return Ok(());
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let extractor = Extractor::from_config(config)
        .await
        .context("Failed to initialise the language model")?;
    let report = extractor.process_paths(&paths).await;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        print_summary(&report, show_progress, &cli.output_dir);
    }

    if !report.is_complete() {
        std::process::exit(2);
    }
    Ok(())
}

fn print_summary(report: &BatchReport, show_progress: bool, output_dir: &std::path::Path) {
    if !show_progress {
        eprintln!(
            "Stored {}/{} records in {}ms",
            report.stored,
            report.total(),
            report.duration_ms
        );
    }
    if report.stored > 0 {
        eprintln!("   →  {}", bold(&output_dir.display().to_string()));
    }
    if !report.incomplete.is_empty() {
        eprintln!("{}", bold("Incomplete files:"));
        for doc in &report.incomplete {
            eprintln!("  {}  {}", doc.filename, dim(&doc.reason));
        }
    }
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .max_attempts(cli.max_attempts)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .bank(cli.bank.clone())
        .output_dir(cli.output_dir.clone())
        .assets_dir(cli.assets_dir.clone());

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
