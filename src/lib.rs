//! # qbank-extract
//!
//! Turn exported medical-board quiz PDFs into structured question records.
//!
//! ## Why this crate?
//!
//! Quiz platforms export each question as a rendered page: a points badge,
//! a numbered stem, numbered choices with check marks, a CORRECT/INCORRECT
//! banner and a free-form explanation that refers back to choices as
//! "(Choice 2)". None of it is marked up. This crate recovers the structure
//! with an ordered set of text passes, then has a language model format any
//! flattened tables and tidy the prose before the record is stored.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      page text up to "NEXT" + embedded images (pdfium)
//!  ├─ 2. Normalize  drop preamble, URLs, doubled words
//!  ├─ 3. Segment    points → stem → choices → verdict + justification
//!  ├─ 4. Map        correct ids + per-choice explanations
//!  ├─ 5. Assemble   one answer per choice
//!  ├─ 6. Rephrase   table check + paraphrase per field, bounded retry
//!  └─ 7. Store      upload images, append the record
//! ```
//!
//! A document with any field that could not be rephrased is reported as
//! incomplete and nothing of it is stored. The batch always continues.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use qbank_extract::{extract_dir, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ExtractionConfig::builder().bank("CARDIO").build()?;
//!     let report = extract_dir("quizzes/", &config).await?;
//!     eprintln!("{} stored", report.stored);
//!     for name in report.incomplete_files() {
//!         eprintln!("incomplete: {name}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `qbank-extract` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod question;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{DocumentFailure, FieldError, QbankError, RephraseStage};
pub use extract::{extract_dir, extract_dir_sync, parse_file, resolve_model, Extractor};
pub use output::{
    AnswerRecord, AssetRecord, BatchReport, DocumentOutcome, FinalRecord, IncompleteDocument,
};
pub use pipeline::input::{ImageBlob, RawDocument};
pub use pipeline::llm::{ModelError, ProviderModel, QuestionModel};
pub use pipeline::rephrase::{RephraseState, TableRephraseResult};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use question::{Choice, ConsistencyWarning, ParsedQuestion, Verdict};
pub use store::{AssetStore, JsonLinesStore, LocalAssetStore, MemoryRecordStore, RecordStore, StoredAsset};
pub use stream::{extract_dir_stream, extract_stream, DocumentStream};
