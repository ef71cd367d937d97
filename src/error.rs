//! Error types for the qbank-extract library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`QbankError`] is **fatal for the operation that returns it**: the input
//!   directory is missing, a PDF cannot be opened, no provider is configured,
//!   an asset upload or record write failed.
//!
//! * [`FieldError`] is **non-fatal and scoped to one free-text field**: the table-check /
//!   rephrase stage could not process the question stem or one explanation.
//!   Other fields of the same document are still attempted.
//!
//! * [`DocumentFailure`] says **why one document ended incomplete**. Stored in
//!   [`crate::output::DocumentOutcome`]; the batch never aborts on it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the qbank-extract library.
#[derive(Debug, Error)]
pub enum QbankError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file or directory was not found at the given path.
    #[error("Not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// A batch was pointed at something that is not a directory.
    #[error("'{path}' is not a directory of PDF files")]
    NotADirectory { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// The asset-storage collaborator rejected an image. Never retried.
    #[error("Failed to upload asset '{name}': {detail}")]
    AssetUploadFailed { name: String, detail: String },

    /// The record store could not append a finished record.
    #[error("Failed to write record to '{path}': {source}")]
    RecordWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The two model calls of the table-aware rephraser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RephraseStage {
    TableCheck,
    Rephrase,
}

impl fmt::Display for RephraseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RephraseStage::TableCheck => f.write_str("table check"),
            RephraseStage::Rephrase => f.write_str("rephrase"),
        }
    }
}

/// A non-fatal error for a single free-text field.
///
/// One failed field marks the whole document incomplete, but the remaining
/// fields are still processed so the failure report is complete.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum FieldError {
    /// The table-check envelope was malformed on every attempt.
    #[error("{field}: table-check response malformed after {attempts} attempts: {detail}")]
    MalformedEnvelope {
        field: String,
        attempts: u32,
        detail: String,
    },

    /// A model call failed in a way retrying cannot fix (network, auth, timeout).
    #[error("{field}: {stage} call failed: {detail}")]
    CallFailed {
        field: String,
        stage: RephraseStage,
        detail: String,
    },
}

/// Why a document was excluded from persistence.
#[derive(Debug, Error)]
pub enum DocumentFailure {
    /// One or more free-text fields could not be rephrased.
    #[error("{} field(s) failed: {}", .0.len(), join_field_errors(.0))]
    FieldsFailed(Vec<FieldError>),

    /// The source PDF could not be read.
    #[error("load failed: {0}")]
    LoadFailed(#[source] QbankError),

    /// An image could not be stored; the record is not written.
    #[error("asset upload failed: {0}")]
    AssetUploadFailed(#[source] QbankError),

    /// The record store rejected the finished record.
    #[error("persist failed: {0}")]
    PersistFailed(#[source] QbankError),
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
