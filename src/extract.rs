//! Document and batch driver.
//!
//! ## Per-document flow
//!
//! ```text
//! RawDocument
//!  ├─ 1. assign the record id
//!  ├─ 2. parse: normalise → segments → justifications → answers
//!  ├─ 3. rephrase the question, then each explanation (never stops early)
//!  ├─ 4. any field failed?  → incomplete, nothing uploaded or written
//!  ├─ 5. upload images under the record id
//!  └─ 6. append the record
//! ```
//!
//! Images are uploaded only after every field succeeded, so an incomplete
//! document leaves no orphaned assets behind.
//!
//! ## Batches
//!
//! Documents run one at a time. A document that fails, for whatever reason,
//! becomes an [`IncompleteDocument`](crate::output::IncompleteDocument) in
//! the [`BatchReport`] and the next document starts as usual.

use crate::config::{ExtractionConfig, DEFAULT_MODEL};
use crate::error::{DocumentFailure, QbankError};
use crate::output::{AssetRecord, BatchReport, DocumentOutcome, FinalRecord};
use crate::pipeline::assemble::assemble_answers;
use crate::pipeline::input::{self, RawDocument};
use crate::pipeline::llm::{ProviderModel, QuestionModel};
use crate::pipeline::rephrase::rephrase_field;
use crate::question::ParsedQuestion;
use crate::store::{AssetStore, JsonLinesStore, LocalAssetStore, RecordStore};
use chrono::Utc;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Turns raw documents into stored question records.
///
/// Cheap to clone; every collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct Extractor {
    config: Arc<ExtractionConfig>,
    model: Arc<dyn QuestionModel>,
    assets: Arc<dyn AssetStore>,
    records: Arc<dyn RecordStore>,
}

impl Extractor {
    pub fn new(
        config: ExtractionConfig,
        model: Arc<dyn QuestionModel>,
        assets: Arc<dyn AssetStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            model,
            assets,
            records,
        }
    }

    /// Build an extractor with the configured model and the local stores
    /// under `config.assets_dir` and `config.output_dir`.
    pub async fn from_config(config: ExtractionConfig) -> Result<Self, QbankError> {
        let model = resolve_model(&config).await?;
        let assets = Arc::new(LocalAssetStore::new(&config.assets_dir, &config.bank));
        let records = Arc::new(JsonLinesStore::new(&config.output_dir));
        Ok(Self::new(config, model, assets, records))
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Process one document end to end. Never panics on bad input; every
    /// failure is reported in the outcome.
    pub async fn process_document(&self, doc: RawDocument) -> DocumentOutcome {
        let filename = doc.filename.clone();
        let result = self.build_and_store(doc).await;
        DocumentOutcome { filename, result }
    }

    /// Process already-loaded documents in order.
    pub async fn process_batch(&self, docs: Vec<RawDocument>) -> BatchReport {
        let start = Instant::now();
        let total = docs.len();
        self.batch_started(total);

        let mut report = BatchReport::default();
        for (i, doc) in docs.into_iter().enumerate() {
            self.document_started(i + 1, total, &doc.filename);
            let outcome = self.process_document(doc).await;
            self.document_finished(i + 1, total, &outcome);
            report.record(&outcome);
        }

        self.batch_finished(report, start)
    }

    /// Load and process PDF files in order.
    pub async fn process_paths(&self, paths: &[PathBuf]) -> BatchReport {
        let start = Instant::now();
        let total = paths.len();
        self.batch_started(total);

        let mut report = BatchReport::default();
        for (i, path) in paths.iter().enumerate() {
            let outcome = self.process_indexed(i + 1, total, path).await;
            report.record(&outcome);
        }

        self.batch_finished(report, start)
    }

    /// Load, process and report one file of a batch.
    pub(crate) async fn process_indexed(
        &self,
        index: usize,
        total: usize,
        path: &Path,
    ) -> DocumentOutcome {
        let filename = input::file_name(path);
        self.document_started(index, total, &filename);

        let outcome = match input::load_pdf(path, &self.config).await {
            Ok(doc) => self.process_document(doc).await,
            Err(e) => DocumentOutcome {
                filename,
                result: Err(DocumentFailure::LoadFailed(e)),
            },
        };

        self.document_finished(index, total, &outcome);
        outcome
    }

    async fn build_and_store(&self, doc: RawDocument) -> Result<FinalRecord, DocumentFailure> {
        let cfg = &*self.config;
        let record_id = Uuid::new_v4();

        let parsed = ParsedQuestion::parse(&doc.text, &cfg.preamble_marker);
        for w in parsed.consistency_warnings() {
            warn!("{}: {}", doc.filename, w);
        }
        let mut answers = assemble_answers(&parsed);

        let mut failures = Vec::new();
        let mut consist_tables = false;

        let question =
            rephrase_field(self.model.as_ref(), "question", &parsed.question_text, cfg).await;
        consist_tables |= question.table_detected.unwrap_or(false);
        if let Some(e) = question.error {
            failures.push(e);
        }

        for (i, answer) in answers.iter_mut().enumerate() {
            let field = format!("answer {} explanation", i + 1);
            let result = rephrase_field(self.model.as_ref(), &field, &answer.explanation, cfg).await;
            consist_tables |= result.table_detected.unwrap_or(false);
            match (result.content, result.error) {
                (_, Some(e)) => failures.push(e),
                (Some(text), None) => answer.explanation = text,
                (None, None) => {}
            }
        }

        if !failures.is_empty() {
            return Err(DocumentFailure::FieldsFailed(failures));
        }

        let mut assets = Vec::with_capacity(doc.images.len());
        for image in &doc.images {
            let stored = self
                .assets
                .upload(&image.bytes, &image.suggested_name, record_id)
                .await
                .map_err(DocumentFailure::AssetUploadFailed)?;
            assets.push(AssetRecord {
                id: Uuid::new_v4(),
                url: stored.url,
                path: stored.path,
                size_bytes: stored.size_bytes,
            });
        }

        let now = Utc::now();
        let record = FinalRecord {
            id: record_id,
            filename: doc.filename,
            question: question.content.unwrap_or_default(),
            points: parsed.points,
            answers,
            assets,
            consist_tables,
            bank: cfg.bank.clone(),
            status: cfg.status.clone(),
            added_by: cfg.added_by.clone(),
            created_at: now,
            updated_at: now,
        };

        self.records
            .append(&record)
            .await
            .map_err(DocumentFailure::PersistFailed)?;
        Ok(record)
    }

    // ── Progress + logging ───────────────────────────────────────────────

    fn batch_started(&self, total: usize) {
        info!("Starting batch of {} documents", total);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }
    }

    fn document_started(&self, index: usize, total: usize, filename: &str) {
        info!("[{}/{}] {}", index, total, filename);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_start(index, total, filename);
        }
    }

    fn document_finished(&self, index: usize, total: usize, outcome: &DocumentOutcome) {
        let cb = self.config.progress_callback.as_ref();
        match &outcome.result {
            Ok(record) => {
                info!("[{}/{}] {} stored as {}", index, total, outcome.filename, record.id);
                if let Some(cb) = cb {
                    cb.on_document_stored(index, total, &outcome.filename);
                }
            }
            Err(e) => {
                warn!("[{}/{}] {} incomplete: {}", index, total, outcome.filename, e);
                if let Some(cb) = cb {
                    cb.on_document_incomplete(index, total, &outcome.filename, &e.to_string());
                }
            }
        }
    }

    fn batch_finished(&self, mut report: BatchReport, start: Instant) -> BatchReport {
        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Batch complete: {}/{} stored, {}ms",
            report.stored,
            report.total(),
            report.duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(report.total(), report.stored);
        }
        report
    }
}

// ── Entry points ─────────────────────────────────────────────────────────────

/// Extract every PDF in `dir` into the local stores named by `config`.
///
/// # Errors
/// Only for problems that prevent the batch from starting: a missing
/// directory or no usable model. Per-document failures are in the report.
pub async fn extract_dir(
    dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<BatchReport, QbankError> {
    let paths = input::list_pdfs(dir.as_ref())?;
    let extractor = Extractor::from_config(config.clone()).await?;
    Ok(extractor.process_paths(&paths).await)
}

/// Synchronous wrapper around [`extract_dir`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_dir_sync(
    dir: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<BatchReport, QbankError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| QbankError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_dir(dir, config))
}

/// Load and parse one PDF without calling any model or store.
pub async fn parse_file(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ParsedQuestion, QbankError> {
    let doc = input::load_pdf(path.as_ref(), config).await?;
    Ok(ParsedQuestion::parse(&doc.text, &config.preamble_marker))
}

// ── Model resolution ─────────────────────────────────────────────────────────

/// Resolve the question model, from most-specific to least-specific:
///
/// 1. `config.question_model`, used as-is
/// 2. `config.provider`, wrapped in a [`ProviderModel`]
/// 3. `config.provider_name` with `config.model`
/// 4. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set
/// 5. OpenAI when `OPENAI_API_KEY` is set
/// 6. whatever `ProviderFactory::from_env` detects
pub async fn resolve_model(config: &ExtractionConfig) -> Result<Arc<dyn QuestionModel>, QbankError> {
    if let Some(ref model) = config.question_model {
        return Ok(Arc::clone(model));
    }
    let provider = resolve_provider(config)?;
    Ok(Arc::new(ProviderModel::new(provider, config)))
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, QbankError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        QbankError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, QbankError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_provider("openai", model);
    }

    let (llm, _embedding) =
        ProviderFactory::from_env().map_err(|e| QbankError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(llm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::input::ImageBlob;
    use crate::pipeline::llm::ModelError;
    use crate::store::{MemoryRecordStore, StoredAsset};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct EchoModel;

    #[async_trait]
    impl QuestionModel for EchoModel {
        async fn detect_and_format_tables(&self, text: &str) -> Result<String, ModelError> {
            Ok(serde_json::json!({ "content": text, "table_detected": false }).to_string())
        }

        async fn rephrase(&self, text: &str) -> Result<String, ModelError> {
            Ok(text.to_uppercase())
        }
    }

    #[derive(Default)]
    struct RecordingAssets {
        parents: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl AssetStore for RecordingAssets {
        async fn upload(
            &self,
            bytes: &[u8],
            suggested_name: &str,
            parent_id: Uuid,
        ) -> Result<StoredAsset, QbankError> {
            self.parents.lock().unwrap().push(parent_id);
            Ok(StoredAsset {
                url: format!("mem://{suggested_name}"),
                path: suggested_name.to_string(),
                size_bytes: bytes.len() as u64,
            })
        }
    }

    fn config() -> ExtractionConfig {
        ExtractionConfig::builder().retry_backoff_ms(0).bank("TEST").build().unwrap()
    }

    #[tokio::test]
    async fn assets_reference_the_record_id() {
        let assets = Arc::new(RecordingAssets::default());
        let records = Arc::new(MemoryRecordStore::new());
        let extractor = Extractor::new(config(), Arc::new(EchoModel), assets.clone(), records.clone());

        let doc = RawDocument {
            filename: "q.pdf".into(),
            text: "1. Question Stem\n1. A\n2. B\nCORRECT The correct answer is 2. Yes.".into(),
            images: vec![ImageBlob {
                suggested_name: "q.pdf_image_page1_img1.png".into(),
                bytes: vec![1, 2, 3],
            }],
        };
        let outcome = extractor.process_document(doc).await;
        let record = outcome.result.unwrap();

        assert_eq!(record.question, "STEM");
        assert_eq!(record.bank, "TEST");
        assert_eq!(record.assets.len(), 1);
        assert_eq!(record.assets[0].size_bytes, 3);
        assert_eq!(*assets.parents.lock().unwrap(), vec![record.id]);
        assert_eq!(records.records().await.len(), 1);
    }

    #[tokio::test]
    async fn configured_question_model_wins() {
        let model: Arc<dyn QuestionModel> = Arc::new(EchoModel);
        let cfg = ExtractionConfig::builder()
            .question_model(Arc::clone(&model))
            .build()
            .unwrap();
        let resolved = resolve_model(&cfg).await.unwrap();
        assert!(Arc::ptr_eq(&resolved, &model));
    }
}
