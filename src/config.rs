//! Configuration types for question extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share a config between the batch driver, the stream API and
//! the CLI, and to log exactly which settings a run used.

use crate::error::QbankError;
use crate::pipeline::llm::QuestionModel;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Phrase the quiz export prints right before the first question.
pub const DEFAULT_PREAMBLE_MARKER: &str = "Answered Review question Quiz-summary";

/// Token that ends the relevant content of a quiz document.
pub const DEFAULT_STOP_SENTINEL: &str = "NEXT";

/// Default chat model for both rephraser calls.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration for a question-extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use qbank_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .max_attempts(3)
///     .retry_backoff_ms(500)
///     .bank("CARDIO")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM model identifier, e.g. "gpt-4o", "claude-sonnet-4-20250514".
    /// If None, [`DEFAULT_MODEL`] is used when a provider is named.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed question model. Takes precedence over every provider
    /// setting; used to plug in custom prompts, caches, or test doubles.
    pub question_model: Option<Arc<dyn QuestionModel>>,

    /// Sampling temperature for both calls. Default: 0.0.
    ///
    /// The table check must echo the input faithfully and the rephrase must
    /// not invent facts, so deterministic sampling is the right default.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Per-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Attempts per field when the table-check envelope is malformed. Default: 3.
    ///
    /// Only malformed responses (bad JSON, missing key) are retried. Network,
    /// auth and timeout failures abort the field on the first occurrence.
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds. Default: 2000.
    ///
    /// Doubles for each further attempt: 2 s → 4 s with the default budget.
    pub retry_backoff_ms: u64,

    /// Everything up to and including this phrase is dropped before parsing.
    pub preamble_marker: String,

    /// Page text after the first occurrence of this token is discarded.
    pub stop_sentinel: String,

    /// Question bank label stamped on every record. Default: "CUSTOM".
    pub bank: String,

    /// Availability status stamped on every record. Default: "AVAILABLE".
    pub status: String,

    /// Author label stamped on every record. Default: "SCRIPT".
    pub added_by: String,

    /// Custom table-check system prompt. If None, uses the built-in prompt.
    pub table_prompt: Option<String>,

    /// Custom rephrase system prompt. If None, uses the built-in prompt.
    pub rephrase_prompt: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Directory of the default JSON-lines record store. Default: "output".
    pub output_dir: PathBuf,

    /// Root of the default local asset store. Default: "assets".
    pub assets_dir: PathBuf,

    /// Per-document progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            question_model: None,
            temperature: 0.0,
            max_tokens: 4096,
            api_timeout_secs: 60,
            max_attempts: 3,
            retry_backoff_ms: 2000,
            preamble_marker: DEFAULT_PREAMBLE_MARKER.to_string(),
            stop_sentinel: DEFAULT_STOP_SENTINEL.to_string(),
            bank: "CUSTOM".to_string(),
            status: "AVAILABLE".to_string(),
            added_by: "SCRIPT".to_string(),
            table_prompt: None,
            rephrase_prompt: None,
            password: None,
            output_dir: PathBuf::from("output"),
            assets_dir: PathBuf::from("assets"),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "question_model",
                &self.question_model.as_ref().map(|_| "<dyn QuestionModel>"),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("preamble_marker", &self.preamble_marker)
            .field("stop_sentinel", &self.stop_sentinel)
            .field("bank", &self.bank)
            .field("status", &self.status)
            .field("added_by", &self.added_by)
            .field("output_dir", &self.output_dir)
            .field("assets_dir", &self.assets_dir)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Backoff before `attempt` (1-based). The first attempt never waits.
    pub fn backoff_before(&self, attempt: u32) -> u64 {
        if attempt <= 1 {
            return 0;
        }
        self.retry_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt - 2))
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn question_model(mut self, model: Arc<dyn QuestionModel>) -> Self {
        self.config.question_model = Some(model);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn preamble_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.preamble_marker = marker.into();
        self
    }

    pub fn stop_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.config.stop_sentinel = sentinel.into();
        self
    }

    pub fn bank(mut self, bank: impl Into<String>) -> Self {
        self.config.bank = bank.into();
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.config.status = status.into();
        self
    }

    pub fn added_by(mut self, who: impl Into<String>) -> Self {
        self.config.added_by = who.into();
        self
    }

    pub fn table_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.table_prompt = Some(prompt.into());
        self
    }

    pub fn rephrase_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.rephrase_prompt = Some(prompt.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.assets_dir = dir.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, QbankError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(QbankError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.stop_sentinel.is_empty() {
            return Err(QbankError::InvalidConfig(
                "stop_sentinel must not be empty".into(),
            ));
        }
        if c.bank.trim().is_empty() {
            return Err(QbankError::InvalidConfig("bank must not be empty".into()));
        }
        Ok(self.config)
    }
}
