//! Progress-callback trait for per-document extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the batch driver works through each source file.
//!
//! # Example
//!
//! ```rust
//! use qbank_extract::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     stored: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_document_stored(&self, index: usize, total: usize, filename: &str) {
//!         self.stored.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} stored: {}", index, total, filename);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { stored: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(cb as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch driver as it processes each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Documents are processed one at a time, so events
/// for a batch arrive strictly in order.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before the first document is loaded.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called before a document is loaded and parsed.
    ///
    /// # Arguments
    /// * `index`:    1-indexed position in the batch
    /// * `total`:    documents in the batch
    /// * `filename`: source file name
    fn on_document_start(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called after a record was appended to the record store.
    fn on_document_stored(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called when a document ends incomplete and nothing was persisted.
    ///
    /// `reason` is a human-readable description of the failure.
    fn on_document_incomplete(&self, index: usize, total: usize, filename: &str, reason: &str) {
        let _ = (index, total, filename, reason);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, total_documents: usize, stored: usize) {
        let _ = (total_documents, stored);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
