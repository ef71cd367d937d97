//! Output types: the persisted question record and per-batch reporting.

use crate::error::DocumentFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One answer option as persisted, in choice order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub text: String,
    pub is_correct: bool,
    pub explanation: String,
}

/// An image stored by the asset collaborator, owned by one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub url: String,
    pub path: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

/// The terminal artifact of one document. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub filename: String,
    pub question: String,
    pub points: Option<u32>,
    pub answers: Vec<AnswerRecord>,
    pub assets: Vec<AssetRecord>,
    /// True when any rephrased field contained a table.
    pub consist_tables: bool,
    pub bank: String,
    pub status: String,
    pub added_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of processing one source document.
#[derive(Debug)]
pub struct DocumentOutcome {
    pub filename: String,
    pub result: Result<FinalRecord, DocumentFailure>,
}

impl DocumentOutcome {
    pub fn is_stored(&self) -> bool {
        self.result.is_ok()
    }
}

/// A document that was attempted but not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteDocument {
    pub filename: String,
    pub reason: String,
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Records appended to the record store.
    pub stored: usize,
    /// Documents that ended incomplete, in processing order.
    pub incomplete: Vec<IncompleteDocument>,
    /// Wall-clock duration of the batch in milliseconds.
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn incomplete_files(&self) -> Vec<&str> {
        self.incomplete.iter().map(|d| d.filename.as_str()).collect()
    }

    pub fn total(&self) -> usize {
        self.stored + self.incomplete.len()
    }

    pub fn is_complete(&self) -> bool {
        self.incomplete.is_empty()
    }

    /// Fold one outcome into the report.
    pub fn record(&mut self, outcome: &DocumentOutcome) {
        match &outcome.result {
            Ok(_) => self.stored += 1,
            Err(e) => self.incomplete.push(IncompleteDocument {
                filename: outcome.filename.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
