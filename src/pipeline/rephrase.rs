//! Table-aware rephraser: two model calls per free-text field with a bounded
//! retry on malformed replies.
//!
//! ## States
//!
//! ```text
//! Pending ──▶ TableCheck ──▶ Rephrase ──▶ Done
//!                 │  ▲            │
//!                 └──┘ malformed  └──▶ Failed (call error)
//!                 │
//!                 └──▶ Failed (call error, or attempts exhausted)
//! ```
//!
//! Only a malformed table-check envelope is retried: bad JSON, a non-object,
//! a missing key or a wrong value type. Any [`ModelError`] ends the field on
//! the spot. Attempt `n` waits `retry_backoff_ms * 2^(n-2)` first; the first
//! attempt never waits and nothing waits after the last one.
//!
//! A failed field never falls back to the original text. The caller gets
//! `content: None` and must mark the document incomplete.

use crate::config::ExtractionConfig;
use crate::error::{FieldError, RephraseStage};
use crate::pipeline::llm::QuestionModel;
use crate::pipeline::postprocess::{strip_code_fences, tidy_tables};
use serde_json::Value;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Where a field's rephrase ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RephraseState {
    Pending,
    TableCheck,
    Rephrase,
    Done,
    Failed,
}

/// Outcome of rephrasing one field.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRephraseResult {
    /// Rephrased text. `None` unless [`Self::succeeded`].
    pub content: Option<String>,
    /// Whether the table check found a table. `None` when it never produced
    /// a valid envelope.
    pub table_detected: Option<bool>,
    /// Table-check attempts made.
    pub attempts: u32,
    pub state: RephraseState,
    pub error: Option<FieldError>,
}

impl TableRephraseResult {
    pub fn succeeded(&self) -> bool {
        self.state == RephraseState::Done
    }

    fn done(content: String, table_detected: bool, attempts: u32) -> Self {
        Self {
            content: Some(content),
            table_detected: Some(table_detected),
            attempts,
            state: RephraseState::Done,
            error: None,
        }
    }

    fn failed(error: FieldError, table_detected: Option<bool>, attempts: u32) -> Self {
        Self {
            content: None,
            table_detected,
            attempts,
            state: RephraseState::Failed,
            error: Some(error),
        }
    }
}

// ── Envelope ─────────────────────────────────────────────────────────────────

/// Why a table-check reply could not be used. Always worth another attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("reply is not a JSON object")]
    NotAnObject,

    #[error("missing key '{0}'")]
    MissingKey(&'static str),

    #[error("key '{0}' has the wrong type")]
    WrongType(&'static str),
}

/// The parsed `{"content": string, "table_detected": bool}` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEnvelope {
    pub content: String,
    pub table_detected: bool,
}

/// Parse a raw table-check reply.
///
/// Code fences around the JSON are stripped first. `table_detected` also
/// accepts the strings "true" and "false", which some models emit despite
/// the prompt.
pub fn parse_envelope(raw: &str) -> Result<TableEnvelope, EnvelopeError> {
    let body = strip_code_fences(raw);
    let value: Value =
        serde_json::from_str(&body).map_err(|e| EnvelopeError::InvalidJson(e.to_string()))?;
    let obj = value.as_object().ok_or(EnvelopeError::NotAnObject)?;

    let content = obj
        .get("content")
        .ok_or(EnvelopeError::MissingKey("content"))?
        .as_str()
        .ok_or(EnvelopeError::WrongType("content"))?
        .to_string();

    let table_detected = match obj
        .get("table_detected")
        .ok_or(EnvelopeError::MissingKey("table_detected"))?
    {
        Value::Bool(b) => *b,
        Value::String(s) if s.eq_ignore_ascii_case("true") => true,
        Value::String(s) if s.eq_ignore_ascii_case("false") => false,
        _ => return Err(EnvelopeError::WrongType("table_detected")),
    };

    Ok(TableEnvelope {
        content,
        table_detected,
    })
}

// ── Driver ───────────────────────────────────────────────────────────────────

/// Rephrase one free-text field.
///
/// `field` names the field in logs and errors ("question",
/// "answer 2 explanation"). Empty text needs no model call and succeeds
/// as-is.
pub async fn rephrase_field(
    model: &dyn QuestionModel,
    field: &str,
    text: &str,
    config: &ExtractionConfig,
) -> TableRephraseResult {
    if text.trim().is_empty() {
        return TableRephraseResult::done(String::new(), false, 0);
    }

    let max_attempts = config.max_attempts.max(1);
    let mut last_detail = String::new();

    for attempt in 1..=max_attempts {
        let backoff = config.backoff_before(attempt);
        if backoff > 0 {
            warn!(
                "{}: retry {}/{} after {}ms",
                field, attempt, max_attempts, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        debug!("{}: {:?} (attempt {})", field, RephraseState::TableCheck, attempt);
        let raw = match model.detect_and_format_tables(text).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("{}: table check failed: {}", field, e);
                let error = FieldError::CallFailed {
                    field: field.to_string(),
                    stage: RephraseStage::TableCheck,
                    detail: e.to_string(),
                };
                return TableRephraseResult::failed(error, None, attempt);
            }
        };

        let envelope = match parse_envelope(&raw) {
            Ok(env) => env,
            Err(e) => {
                warn!("{}: malformed table-check reply on attempt {}: {}", field, attempt, e);
                last_detail = e.to_string();
                continue;
            }
        };

        let formatted = if envelope.table_detected {
            tidy_tables(&envelope.content)
        } else {
            envelope.content
        };

        debug!(
            "{}: {:?} (table_detected={})",
            field,
            RephraseState::Rephrase,
            envelope.table_detected
        );
        return match model.rephrase(&formatted).await {
            Ok(text) => {
                debug!("{}: {:?}", field, RephraseState::Done);
                TableRephraseResult::done(text.trim().to_string(), envelope.table_detected, attempt)
            }
            Err(e) => {
                warn!("{}: rephrase failed: {}", field, e);
                let error = FieldError::CallFailed {
                    field: field.to_string(),
                    stage: RephraseStage::Rephrase,
                    detail: e.to_string(),
                };
                TableRephraseResult::failed(error, Some(envelope.table_detected), attempt)
            }
        };
    }

    let error = FieldError::MalformedEnvelope {
        field: field.to_string(),
        attempts: max_attempts,
        detail: last_detail,
    };
    TableRephraseResult::failed(error, None, max_attempts)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::ModelError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays scripted table-check replies; rephrase echoes with a prefix.
    struct ScriptedModel {
        table_replies: Mutex<VecDeque<Result<String, ModelError>>>,
        rephrase_reply: Option<ModelError>,
        table_calls: AtomicU32,
        rephrase_inputs: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String, ModelError>>) -> Self {
            Self {
                table_replies: Mutex::new(replies.into()),
                rephrase_reply: None,
                table_calls: AtomicU32::new(0),
                rephrase_inputs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QuestionModel for ScriptedModel {
        async fn detect_and_format_tables(&self, _text: &str) -> Result<String, ModelError> {
            self.table_calls.fetch_add(1, Ordering::SeqCst);
            self.table_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("not json".to_string()))
        }

        async fn rephrase(&self, text: &str) -> Result<String, ModelError> {
            self.rephrase_inputs.lock().unwrap().push(text.to_string());
            match &self.rephrase_reply {
                Some(e) => Err(e.clone()),
                None => Ok(format!("  rephrased: {text}\n")),
            }
        }
    }

    fn config() -> ExtractionConfig {
        ExtractionConfig::builder().retry_backoff_ms(0).build().unwrap()
    }

    fn valid(content: &str, table: bool) -> Result<String, ModelError> {
        Ok(serde_json::json!({ "content": content, "table_detected": table }).to_string())
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt_after_two_malformed() {
        let model = ScriptedModel::new(vec![
            Ok("{not json".into()),
            Ok(r#"{"content": "x"}"#.into()),
            valid("Stem", false),
        ]);
        let result = rephrase_field(&model, "question", "Stem", &config()).await;

        assert!(result.succeeded());
        assert_eq!(result.attempts, 3);
        assert_eq!(result.content.as_deref(), Some("rephrased: Stem"));
        assert_eq!(result.table_detected, Some(false));
        assert_eq!(model.table_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn always_malformed_fails_after_budget() {
        let model = ScriptedModel::new(vec![]);
        let result = rephrase_field(&model, "question", "Stem", &config()).await;

        assert!(!result.succeeded());
        assert_eq!(result.state, RephraseState::Failed);
        assert_eq!(result.content, None);
        assert_eq!(result.table_detected, None);
        assert_eq!(model.table_calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result.error,
            Some(FieldError::MalformedEnvelope { attempts: 3, .. })
        ));
        assert!(model.rephrase_inputs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn call_error_is_not_retried() {
        let model = ScriptedModel::new(vec![Err(ModelError::Api("401".into())), valid("x", false)]);
        let result = rephrase_field(&model, "question", "Stem", &config()).await;

        assert!(!result.succeeded());
        assert_eq!(model.table_calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.error,
            Some(FieldError::CallFailed {
                stage: RephraseStage::TableCheck,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn rephrase_error_fails_field() {
        let mut model = ScriptedModel::new(vec![valid("x", true)]);
        model.rephrase_reply = Some(ModelError::Timeout { secs: 5 });
        let result = rephrase_field(&model, "answer 1 explanation", "x", &config()).await;

        assert!(!result.succeeded());
        assert_eq!(result.table_detected, Some(true));
        assert!(matches!(
            result.error,
            Some(FieldError::CallFailed {
                stage: RephraseStage::Rephrase,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn detected_table_is_tidied_before_rephrase() {
        let model = ScriptedModel::new(vec![valid("| A | B |\n| 1 | 2 |", true)]);
        let result = rephrase_field(&model, "question", "A B 1 2", &config()).await;

        assert!(result.succeeded());
        assert_eq!(
            model.rephrase_inputs.lock().unwrap()[0],
            "| A | B |\n| --- | --- |\n| 1 | 2 |"
        );
    }

    #[tokio::test]
    async fn empty_field_skips_model() {
        let model = ScriptedModel::new(vec![]);
        let result = rephrase_field(&model, "answer 3 explanation", "  ", &config()).await;

        assert!(result.succeeded());
        assert_eq!(result.content.as_deref(), Some(""));
        assert_eq!(model.table_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn envelope_accepts_fenced_json() {
        let env = parse_envelope("```json\n{\"content\": \"c\", \"table_detected\": true}\n```")
            .unwrap();
        assert_eq!(
            env,
            TableEnvelope {
                content: "c".into(),
                table_detected: true
            }
        );
    }

    #[test]
    fn envelope_accepts_string_booleans() {
        let env = parse_envelope(r#"{"content": "c", "table_detected": "False"}"#).unwrap();
        assert!(!env.table_detected);
    }

    #[test]
    fn envelope_errors_are_specific() {
        assert!(matches!(parse_envelope("nope"), Err(EnvelopeError::InvalidJson(_))));
        assert_eq!(parse_envelope("[1]"), Err(EnvelopeError::NotAnObject));
        assert_eq!(
            parse_envelope(r#"{"content": "c"}"#),
            Err(EnvelopeError::MissingKey("table_detected"))
        );
        assert_eq!(
            parse_envelope(r#"{"content": 4, "table_detected": true}"#),
            Err(EnvelopeError::WrongType("content"))
        );
        assert_eq!(
            parse_envelope(r#"{"content": "c", "table_detected": 1}"#),
            Err(EnvelopeError::WrongType("table_detected"))
        );
    }
}
