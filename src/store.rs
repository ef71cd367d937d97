//! Storage collaborators: where images and finished records go.
//!
//! [`AssetStore`] receives each extracted image once its parent record has an
//! id; [`RecordStore`] receives each finished record exactly once. Neither is
//! retried by the extractor: a failure ends that document incomplete.
//!
//! The local implementations write under plain directories so a run can be
//! inspected and imported elsewhere. [`MemoryRecordStore`] keeps records in
//! memory for embedding and tests.

use crate::error::QbankError;
use crate::output::FinalRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Where an uploaded asset ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub url: String,
    pub path: String,
    pub size_bytes: u64,
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn upload(
        &self,
        bytes: &[u8],
        suggested_name: &str,
        parent_id: Uuid,
    ) -> Result<StoredAsset, QbankError>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Durably append one record. Records are never read back or updated.
    async fn append(&self, record: &FinalRecord) -> Result<(), QbankError>;
}

// ── Local assets ─────────────────────────────────────────────────────────────

/// Writes assets to `{root}/question-assets/{bank}/{parent_id}/{name}`.
#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    root: PathBuf,
    bank: String,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>, bank: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bank: bank.into(),
        }
    }

    fn relative_path(&self, parent_id: Uuid, name: &str) -> PathBuf {
        Path::new("question-assets")
            .join(&self.bank)
            .join(parent_id.to_string())
            .join(sanitize_name(name))
    }
}

/// Keep only the final component so a suggested name cannot escape the root.
fn sanitize_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    if base.is_empty() || base == "." || base == ".." {
        "asset.bin".to_string()
    } else {
        base.to_string()
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn upload(
        &self,
        bytes: &[u8],
        suggested_name: &str,
        parent_id: Uuid,
    ) -> Result<StoredAsset, QbankError> {
        let relative = self.relative_path(parent_id, suggested_name);
        let full = self.root.join(&relative);
        let fail = |e: std::io::Error| QbankError::AssetUploadFailed {
            name: suggested_name.to_string(),
            detail: e.to_string(),
        };

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(fail)?;
        }
        tokio::fs::write(&full, bytes).await.map_err(fail)?;

        let absolute = std::path::absolute(&full).unwrap_or_else(|_| full.clone());
        debug!("Stored asset {} ({} bytes)", full.display(), bytes.len());

        Ok(StoredAsset {
            url: format!("file://{}", absolute.display()),
            path: relative.to_string_lossy().replace('\\', "/"),
            size_bytes: bytes.len() as u64,
        })
    }
}

// ── JSON lines records ───────────────────────────────────────────────────────

/// File for records without tables.
pub const QUESTIONS_FILE: &str = "questions.jsonl";
/// File for records where a table was detected in any field.
pub const TABLE_QUESTIONS_FILE: &str = "questions_with_tables.jsonl";

/// Appends one JSON object per line to a file in `dir`.
///
/// Records with `consist_tables` go to [`TABLE_QUESTIONS_FILE`] so tables can
/// be reviewed separately; the rest go to [`QUESTIONS_FILE`]. Appends are
/// serialised so a line is never interleaved with another.
#[derive(Debug)]
pub struct JsonLinesStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path_for(&self, record: &FinalRecord) -> PathBuf {
        let name = if record.consist_tables {
            TABLE_QUESTIONS_FILE
        } else {
            QUESTIONS_FILE
        };
        self.dir.join(name)
    }
}

#[async_trait]
impl RecordStore for JsonLinesStore {
    async fn append(&self, record: &FinalRecord) -> Result<(), QbankError> {
        let path = self.path_for(record);
        let mut line = serde_json::to_string(record)
            .map_err(|e| QbankError::Internal(format!("record serialisation failed: {}", e)))?;
        line.push('\n');

        let write_err = |source: std::io::Error| QbankError::RecordWriteFailed {
            path: path.clone(),
            source,
        };

        let _guard = self.lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await.map_err(write_err)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(write_err)?;
        file.write_all(line.as_bytes()).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;

        debug!("Appended record {} to {}", record.id, path.display());
        Ok(())
    }
}

// ── In-memory records ────────────────────────────────────────────────────────

/// Keeps appended records in memory.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<FinalRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record appended so far, in append order.
    pub async fn records(&self) -> Vec<FinalRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn append(&self, record: &FinalRecord) -> Result<(), QbankError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}
