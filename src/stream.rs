//! Streaming batch API: emit each document's outcome as soon as it is done.
//!
//! ## Why stream?
//!
//! A batch of a few hundred quiz PDFs takes a long time with two model calls
//! per field. A stream lets callers show progress, tally failures or stop
//! early without waiting for the whole batch. Unlike
//! [`crate::extract::Extractor::process_paths`], nothing is accumulated; the
//! caller sees each [`DocumentOutcome`] and decides what to keep.
//!
//! Documents are still processed strictly one after another, in path order.
//! Dropping the stream stops the batch before the next document starts.

use crate::config::ExtractionConfig;
use crate::error::QbankError;
use crate::extract::Extractor;
use crate::output::DocumentOutcome;
use crate::pipeline::input;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-document outcomes.
pub type DocumentStream = Pin<Box<dyn Stream<Item = DocumentOutcome> + Send>>;

/// Stream outcomes for `paths`, in order.
pub fn extract_stream(extractor: Extractor, paths: Vec<PathBuf>) -> DocumentStream {
    let total = paths.len();
    if let Some(ref cb) = extractor.config().progress_callback {
        cb.on_batch_start(total);
    }

    let s = stream::iter(paths.into_iter().enumerate()).then(move |(i, path)| {
        let extractor = extractor.clone();
        async move { extractor.process_indexed(i + 1, total, &path).await }
    });
    Box::pin(s)
}

/// Stream outcomes for every PDF in `dir`, using the stores named by `config`.
///
/// # Errors
/// Returns `Err` only when the directory cannot be listed or no model can be
/// resolved.
pub async fn extract_dir_stream(
    dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<DocumentStream, QbankError> {
    let dir = dir.as_ref();
    info!("Starting streaming extraction: {}", dir.display());
    let paths = input::list_pdfs(dir)?;
    let extractor = Extractor::from_config(config.clone()).await?;
    Ok(extract_stream(extractor, paths))
}
