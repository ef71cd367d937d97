//! Model interaction: the two chat calls behind the rephraser.
//!
//! [`QuestionModel`] is the seam between the retry logic in
//! [`crate::pipeline::rephrase`] and the network. [`ProviderModel`] is the
//! production implementation over an `edgequake_llm` provider; tests and
//! callers with their own caching plug in a different implementation via
//! [`crate::config::ExtractionConfigBuilder::question_model`].
//!
//! Implementations return the raw reply text. Interpreting the table-check
//! envelope, and deciding what is worth retrying, is the rephraser's job.

use crate::config::ExtractionConfig;
use crate::prompts::{user_message, REPHRASER_PROMPT, TABLE_RECOGNIZER_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// A model call that failed before producing any reply text.
///
/// Never retried: a transport or auth failure will not heal between attempts
/// of the same field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("API error: {0}")]
    Api(String),

    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// The two operations the rephraser needs from a language model.
#[async_trait]
pub trait QuestionModel: Send + Sync {
    /// Ask for the JSON envelope `{"content": string, "table_detected": bool}`.
    async fn detect_and_format_tables(&self, text: &str) -> Result<String, ModelError>;

    /// Ask for a paraphrase that keeps tables and structured blocks intact.
    async fn rephrase(&self, text: &str) -> Result<String, ModelError>;
}

/// [`QuestionModel`] over any `edgequake_llm` chat provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    table_prompt: String,
    rephrase_prompt: String,
    options: CompletionOptions,
    timeout: Duration,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            table_prompt: config
                .table_prompt
                .clone()
                .unwrap_or_else(|| TABLE_RECOGNIZER_PROMPT.to_string()),
            rephrase_prompt: config
                .rephrase_prompt
                .clone()
                .unwrap_or_else(|| REPHRASER_PROMPT.to_string()),
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    async fn chat(&self, system: &str, text: &str) -> Result<String, ModelError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user_message(text))];
        let start = Instant::now();

        let call = self.provider.chat(&messages, Some(&self.options));
        let response = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ModelError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ModelError::Api(e.to_string()))?;

        debug!(
            "{} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

#[async_trait]
impl QuestionModel for ProviderModel {
    async fn detect_and_format_tables(&self, text: &str) -> Result<String, ModelError> {
        self.chat(&self.table_prompt, text).await
    }

    async fn rephrase(&self, text: &str) -> Result<String, ModelError> {
        self.chat(&self.rephrase_prompt, text).await
    }
}

fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
