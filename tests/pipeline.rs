//! Integration tests for the document and batch driver.
//!
//! Every collaborator is an in-process mock, so these run without pdfium,
//! network access or API keys.

use async_trait::async_trait;
use qbank_extract::{
    AssetStore, DocumentFailure, ExtractionConfig, ExtractionProgressCallback, Extractor,
    FieldError, ImageBlob, MemoryRecordStore, ModelError, QbankError, QuestionModel, RawDocument,
    RecordStore, StoredAsset,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const SAMPLE: &str = "Quiz 3 Answered Review question Quiz-summary\n\
5 point(s)\n1. Question Stem text\n1. Choice one\n2. Choice two\n\
CORRECT The correct answer is 1. Because reasons. (Choice 2) Wrong because X.";

// ── Mocks ────────────────────────────────────────────────────────────────────

/// Valid envelopes that echo the input; rephrase prefixes "R:".
/// Any input containing `poison` gets a malformed table-check reply.
struct MockModel {
    poison: Option<&'static str>,
    table_flag_for: Option<&'static str>,
    calls: AtomicUsize,
}

impl MockModel {
    fn healthy() -> Self {
        Self {
            poison: None,
            table_flag_for: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn poisoned(word: &'static str) -> Self {
        Self {
            poison: Some(word),
            ..Self::healthy()
        }
    }
}

#[async_trait]
impl QuestionModel for MockModel {
    async fn detect_and_format_tables(&self, text: &str) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.poison.is_some_and(|p| text.contains(p)) {
            return Ok("```json\n{\"content\": \"half".to_string());
        }
        let table = self.table_flag_for.is_some_and(|t| text.contains(t));
        Ok(serde_json::json!({ "content": text, "table_detected": table }).to_string())
    }

    async fn rephrase(&self, text: &str) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("R:{text}"))
    }
}

#[derive(Default)]
struct MockAssets {
    uploads: Mutex<Vec<(String, Uuid)>>,
    fail: bool,
}

#[async_trait]
impl AssetStore for MockAssets {
    async fn upload(
        &self,
        bytes: &[u8],
        suggested_name: &str,
        parent_id: Uuid,
    ) -> Result<StoredAsset, QbankError> {
        if self.fail {
            return Err(QbankError::AssetUploadFailed {
                name: suggested_name.to_string(),
                detail: "bucket unavailable".into(),
            });
        }
        self.uploads
            .lock()
            .unwrap()
            .push((suggested_name.to_string(), parent_id));
        Ok(StoredAsset {
            url: format!("https://assets.test/{parent_id}/{suggested_name}"),
            path: format!("question-assets/TEST/{parent_id}/{suggested_name}"),
            size_bytes: bytes.len() as u64,
        })
    }
}

struct FailingRecords;

#[async_trait]
impl RecordStore for FailingRecords {
    async fn append(&self, _record: &qbank_extract::FinalRecord) -> Result<(), QbankError> {
        Err(QbankError::Internal("store offline".into()))
    }
}

#[derive(Default)]
struct EventLog {
    events: Mutex<VecDeque<String>>,
}

impl ExtractionProgressCallback for EventLog {
    fn on_batch_start(&self, total_documents: usize) {
        self.events.lock().unwrap().push_back(format!("batch {total_documents}"));
    }
    fn on_document_start(&self, index: usize, _total: usize, filename: &str) {
        self.events.lock().unwrap().push_back(format!("start {index} {filename}"));
    }
    fn on_document_stored(&self, index: usize, _total: usize, filename: &str) {
        self.events.lock().unwrap().push_back(format!("stored {index} {filename}"));
    }
    fn on_document_incomplete(&self, index: usize, _total: usize, filename: &str, _reason: &str) {
        self.events.lock().unwrap().push_back(format!("incomplete {index} {filename}"));
    }
    fn on_batch_complete(&self, total_documents: usize, stored: usize) {
        self.events
            .lock()
            .unwrap()
            .push_back(format!("done {stored}/{total_documents}"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config() -> ExtractionConfig {
    ExtractionConfig::builder()
        .retry_backoff_ms(0)
        .bank("TEST")
        .build()
        .unwrap()
}

fn doc(filename: &str, text: &str, images: usize) -> RawDocument {
    RawDocument {
        filename: filename.to_string(),
        text: text.to_string(),
        images: (0..images)
            .map(|i| ImageBlob {
                suggested_name: format!("{filename}_image_page1_img{}.png", i + 1),
                bytes: vec![0u8; 8],
            })
            .collect(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reference_document_becomes_one_record() {
    let records = Arc::new(MemoryRecordStore::new());
    let extractor = Extractor::new(
        config(),
        Arc::new(MockModel::healthy()),
        Arc::new(MockAssets::default()),
        records.clone(),
    );

    let report = extractor.process_batch(vec![doc("q1.pdf", SAMPLE, 0)]).await;
    assert_eq!(report.stored, 1);
    assert!(report.is_complete());

    let stored = records.records().await;
    let record = &stored[0];
    assert_eq!(record.filename, "q1.pdf");
    assert_eq!(record.question, "R:Stem text");
    assert_eq!(record.points, Some(5));
    assert_eq!(record.bank, "TEST");
    assert!(!record.consist_tables);

    let answers: Vec<_> = record
        .answers
        .iter()
        .map(|a| (a.text.as_str(), a.is_correct, a.explanation.as_str()))
        .collect();
    assert_eq!(
        answers,
        vec![
            ("Choice one", true, "R:Because reasons."),
            ("Choice two", false, "R:Wrong because X."),
        ]
    );
}

#[tokio::test]
async fn failed_field_marks_document_incomplete_and_writes_nothing() {
    let records = Arc::new(MemoryRecordStore::new());
    let assets = Arc::new(MockAssets::default());
    let extractor = Extractor::new(
        config(),
        Arc::new(MockModel::poisoned("Wrong because")),
        assets.clone(),
        records.clone(),
    );

    let report = extractor.process_batch(vec![doc("bad.pdf", SAMPLE, 2)]).await;

    assert_eq!(report.stored, 0);
    assert_eq!(report.incomplete_files(), vec!["bad.pdf"]);
    assert!(records.records().await.is_empty());
    assert!(assets.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn every_field_is_attempted_before_failing() {
    let model = Arc::new(MockModel::poisoned("Stem"));
    let extractor = Extractor::new(
        config(),
        model.clone(),
        Arc::new(MockAssets::default()),
        Arc::new(MemoryRecordStore::new()),
    );

    let outcome = extractor.process_document(doc("q.pdf", SAMPLE, 0)).await;

    match outcome.result {
        Err(DocumentFailure::FieldsFailed(errors)) => {
            assert_eq!(errors.len(), 1);
            assert!(matches!(
                &errors[0],
                FieldError::MalformedEnvelope { field, attempts: 3, .. } if field == "question"
            ));
        }
        other => panic!("expected FieldsFailed, got {other:?}"),
    }
    // 3 malformed table checks for the stem, 2 calls for each explanation.
    assert_eq!(model.calls.load(Ordering::SeqCst), 3 + 2 + 2);
}

#[tokio::test]
async fn batch_continues_after_incomplete_document() {
    let records = Arc::new(MemoryRecordStore::new());
    let events = Arc::new(EventLog::default());
    let cfg = ExtractionConfig::builder()
        .retry_backoff_ms(0)
        .progress_callback(events.clone())
        .build()
        .unwrap();
    let extractor = Extractor::new(
        cfg,
        Arc::new(MockModel::poisoned("poison")),
        Arc::new(MockAssets::default()),
        records.clone(),
    );

    let poisoned = SAMPLE.replace("Stem text", "poison stem");
    let report = extractor
        .process_batch(vec![
            doc("a.pdf", SAMPLE, 0),
            doc("b.pdf", &poisoned, 0),
            doc("c.pdf", SAMPLE, 0),
        ])
        .await;

    assert_eq!(report.stored, 2);
    assert_eq!(report.incomplete_files(), vec!["b.pdf"]);
    let names: Vec<_> = records.records().await.into_iter().map(|r| r.filename).collect();
    assert_eq!(names, vec!["a.pdf", "c.pdf"]);

    let log: Vec<_> = events.events.lock().unwrap().iter().cloned().collect();
    assert_eq!(
        log,
        vec![
            "batch 3",
            "start 1 a.pdf",
            "stored 1 a.pdf",
            "start 2 b.pdf",
            "incomplete 2 b.pdf",
            "start 3 c.pdf",
            "stored 3 c.pdf",
            "done 2/3",
        ]
    );
}

#[tokio::test]
async fn assets_are_uploaded_under_record_id() {
    let records = Arc::new(MemoryRecordStore::new());
    let assets = Arc::new(MockAssets::default());
    let extractor = Extractor::new(
        config(),
        Arc::new(MockModel::healthy()),
        assets.clone(),
        records.clone(),
    );

    let outcome = extractor.process_document(doc("img.pdf", SAMPLE, 2)).await;
    let record = outcome.result.unwrap();

    let uploads = assets.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 2);
    assert!(uploads.iter().all(|(_, parent)| *parent == record.id));
    assert_eq!(record.assets.len(), 2);
    assert!(record.assets[0].path.contains(&record.id.to_string()));
    assert_eq!(record.assets[1].size_bytes, 8);
}

#[tokio::test]
async fn asset_failure_blocks_persistence() {
    let records = Arc::new(MemoryRecordStore::new());
    let assets = Arc::new(MockAssets {
        fail: true,
        ..Default::default()
    });
    let extractor = Extractor::new(config(), Arc::new(MockModel::healthy()), assets, records.clone());

    let outcome = extractor.process_document(doc("img.pdf", SAMPLE, 1)).await;

    assert!(matches!(outcome.result, Err(DocumentFailure::AssetUploadFailed(_))));
    assert!(records.records().await.is_empty());
}

#[tokio::test]
async fn record_store_failure_is_reported() {
    let extractor = Extractor::new(
        config(),
        Arc::new(MockModel::healthy()),
        Arc::new(MockAssets::default()),
        Arc::new(FailingRecords),
    );

    let report = extractor.process_batch(vec![doc("q.pdf", SAMPLE, 0)]).await;

    assert_eq!(report.incomplete.len(), 1);
    assert!(report.incomplete[0].reason.contains("persist failed"));
}

#[tokio::test]
async fn detected_table_flags_the_record() {
    let records = Arc::new(MemoryRecordStore::new());
    let model = MockModel {
        table_flag_for: Some("Wrong because"),
        ..MockModel::healthy()
    };
    let extractor = Extractor::new(
        config(),
        Arc::new(model),
        Arc::new(MockAssets::default()),
        records.clone(),
    );

    extractor.process_document(doc("t.pdf", SAMPLE, 0)).await.result.unwrap();

    assert!(records.records().await[0].consist_tables);
}

#[tokio::test]
async fn unparseable_text_still_stores_an_empty_record() {
    let records = Arc::new(MemoryRecordStore::new());
    let model = Arc::new(MockModel::healthy());
    let extractor = Extractor::new(
        config(),
        model.clone(),
        Arc::new(MockAssets::default()),
        records.clone(),
    );

    let outcome = extractor
        .process_document(doc("blank.pdf", "nothing recognisable here", 0))
        .await;
    let record = outcome.result.unwrap();

    assert_eq!(record.question, "");
    assert!(record.answers.is_empty());
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}
