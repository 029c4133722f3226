//! Configuration types for the study-material workflow.
//!
//! Two structs, two audiences:
//!
//! * [`WorkflowConfig`] drives the core: quality thresholds for the
//!   extraction selector, excerpt sizes and sampling settings for the
//!   validation and generation calls, exercise caps, and per-call timeouts.
//! * [`ExtractorConfig`] drives the concrete pdfium/VLM extractor adapter
//!   ([`crate::extractor::DocumentExtractor`]) and the provider resolution
//!   chain.
//!
//! Both are built explicitly and handed to their owners at construction time.
//! There is no process-wide configuration.

use crate::error::StudyKitError;
use crate::progress::WorkflowObserverHandle;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a [`crate::workflow::Workflow`].
///
/// Built via [`WorkflowConfig::builder()`] or using
/// [`WorkflowConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_studykit::WorkflowConfig;
/// use std::time::Duration;
///
/// let config = WorkflowConfig::builder()
///     .min_extracted_chars(80)
///     .completion_timeout(Duration::from_secs(60))
///     .build()
///     .unwrap();
/// assert_eq!(config.min_extracted_chars, 80);
/// ```
#[derive(Clone)]
pub struct WorkflowConfig {
    /// Minimum trimmed character count for fast-extracted text to be accepted. Default: 50.
    pub min_extracted_chars: usize,

    /// Maximum share of garbled characters (U+FFFD, control, private-use). Default: 0.10.
    ///
    /// Text layers built from broken font encodings come out as runs of
    /// replacement or private-use glyphs; anything above this share goes to
    /// the advanced extractor.
    pub max_garbled_ratio: f32,

    /// Minimum share of alphanumeric characters among non-whitespace ones. Default: 0.50.
    pub min_alphanumeric_ratio: f32,

    /// Fast results whose self-reported quality is below this are rejected. Default: 0.40.
    pub min_reported_quality: f32,

    /// Characters of extracted text sent to the validation call. Default: 800.
    pub validation_excerpt_chars: usize,

    /// Characters of extracted text sent to the generation call. Default: 10 000.
    pub generation_excerpt_chars: usize,

    /// Output budget of the validation call. Default: 200.
    pub validation_max_tokens: usize,

    /// Sampling temperature of the validation call. Default: 0.05.
    pub validation_temperature: f32,

    /// Output budget of the generation call. Default: 4000.
    ///
    /// Four sections of study material routinely run past 2 500 tokens;
    /// a tighter budget cuts the Q&A block off mid-answer.
    pub generation_max_tokens: usize,

    /// Sampling temperature of the generation call. Default: 0.2.
    pub generation_temperature: f32,

    /// Fill-in-the-blank items kept from the generated text. Default: 5.
    pub max_fill_in_blanks: usize,

    /// Match-the-following pairs kept from the generated text. Default: 5.
    pub max_match_pairs: usize,

    /// Subjective questions kept from the generated text. Default: 3.
    pub max_questions: usize,

    /// Budget for each extractor call. Default: 180 s.
    pub extraction_timeout: Duration,

    /// Budget for each completion call. Default: 120 s.
    pub completion_timeout: Duration,

    /// Stage-transition observer.
    pub observer: Option<WorkflowObserverHandle>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            min_extracted_chars: 50,
            max_garbled_ratio: 0.10,
            min_alphanumeric_ratio: 0.50,
            min_reported_quality: 0.40,
            validation_excerpt_chars: 800,
            generation_excerpt_chars: 10_000,
            validation_max_tokens: 200,
            validation_temperature: 0.05,
            generation_max_tokens: 4000,
            generation_temperature: 0.2,
            max_fill_in_blanks: 5,
            max_match_pairs: 5,
            max_questions: 3,
            extraction_timeout: Duration::from_secs(180),
            completion_timeout: Duration::from_secs(120),
            observer: None,
        }
    }
}

impl fmt::Debug for WorkflowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowConfig")
            .field("min_extracted_chars", &self.min_extracted_chars)
            .field("max_garbled_ratio", &self.max_garbled_ratio)
            .field("min_alphanumeric_ratio", &self.min_alphanumeric_ratio)
            .field("min_reported_quality", &self.min_reported_quality)
            .field("validation_excerpt_chars", &self.validation_excerpt_chars)
            .field("generation_excerpt_chars", &self.generation_excerpt_chars)
            .field("validation_max_tokens", &self.validation_max_tokens)
            .field("generation_max_tokens", &self.generation_max_tokens)
            .field("max_fill_in_blanks", &self.max_fill_in_blanks)
            .field("max_match_pairs", &self.max_match_pairs)
            .field("max_questions", &self.max_questions)
            .field("extraction_timeout", &self.extraction_timeout)
            .field("completion_timeout", &self.completion_timeout)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn WorkflowObserver>"))
            .finish()
    }
}

impl WorkflowConfig {
    /// Create a new builder for `WorkflowConfig`.
    pub fn builder() -> WorkflowConfigBuilder {
        WorkflowConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`WorkflowConfig`].
#[derive(Debug)]
pub struct WorkflowConfigBuilder {
    config: WorkflowConfig,
}

impl WorkflowConfigBuilder {
    pub fn min_extracted_chars(mut self, n: usize) -> Self {
        self.config.min_extracted_chars = n;
        self
    }

    pub fn max_garbled_ratio(mut self, r: f32) -> Self {
        self.config.max_garbled_ratio = r.clamp(0.0, 1.0);
        self
    }

    pub fn min_alphanumeric_ratio(mut self, r: f32) -> Self {
        self.config.min_alphanumeric_ratio = r.clamp(0.0, 1.0);
        self
    }

    pub fn min_reported_quality(mut self, q: f32) -> Self {
        self.config.min_reported_quality = q.clamp(0.0, 1.0);
        self
    }

    pub fn validation_excerpt_chars(mut self, n: usize) -> Self {
        self.config.validation_excerpt_chars = n;
        self
    }

    pub fn generation_excerpt_chars(mut self, n: usize) -> Self {
        self.config.generation_excerpt_chars = n;
        self
    }

    pub fn validation_max_tokens(mut self, n: usize) -> Self {
        self.config.validation_max_tokens = n;
        self
    }

    pub fn validation_temperature(mut self, t: f32) -> Self {
        self.config.validation_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn generation_max_tokens(mut self, n: usize) -> Self {
        self.config.generation_max_tokens = n;
        self
    }

    pub fn generation_temperature(mut self, t: f32) -> Self {
        self.config.generation_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_fill_in_blanks(mut self, n: usize) -> Self {
        self.config.max_fill_in_blanks = n;
        self
    }

    pub fn max_match_pairs(mut self, n: usize) -> Self {
        self.config.max_match_pairs = n.min(26);
        self
    }

    pub fn max_questions(mut self, n: usize) -> Self {
        self.config.max_questions = n;
        self
    }

    pub fn extraction_timeout(mut self, d: Duration) -> Self {
        self.config.extraction_timeout = d;
        self
    }

    pub fn extraction_timeout_secs(self, secs: u64) -> Self {
        self.extraction_timeout(Duration::from_secs(secs))
    }

    pub fn completion_timeout(mut self, d: Duration) -> Self {
        self.config.completion_timeout = d;
        self
    }

    pub fn completion_timeout_secs(self, secs: u64) -> Self {
        self.completion_timeout(Duration::from_secs(secs))
    }

    pub fn observer(mut self, observer: WorkflowObserverHandle) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<WorkflowConfig, StudyKitError> {
        let c = &self.config;
        if c.validation_excerpt_chars == 0 || c.generation_excerpt_chars == 0 {
            return Err(StudyKitError::InvalidConfig(
                "Excerpt sizes must be ≥ 1 character".into(),
            ));
        }
        if c.validation_max_tokens == 0 || c.generation_max_tokens == 0 {
            return Err(StudyKitError::InvalidConfig(
                "Token budgets must be ≥ 1".into(),
            ));
        }
        if c.extraction_timeout.is_zero() || c.completion_timeout.is_zero() {
            return Err(StudyKitError::InvalidConfig(
                "Timeouts must be non-zero".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Configuration for the pdfium/VLM extractor adapter and provider lookup.
///
/// # Example
/// ```rust
/// use edgequake_studykit::ExtractorConfig;
///
/// let config = ExtractorConfig::builder()
///     .dpi(200)
///     .max_pages(20)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_pages, 20);
/// ```
#[derive(Clone)]
pub struct ExtractorConfig {
    /// Rendering DPI for the advanced (vision) path. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Longest rendered edge in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Longest edge of an uploaded photo after resizing. Default: 2048.
    pub max_image_edge: u32,

    /// Only the first `max_pages` pages are extracted. Default: 30.
    ///
    /// Generation only ever sees the first ten thousand characters, so
    /// transcribing a whole textbook would be spent money.
    pub max_pages: usize,

    /// Concurrent page transcriptions on the advanced path. Default: 8.
    pub concurrency: usize,

    /// LLM model identifier. If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature of the vision calls. Default: 0.1.
    pub temperature: f32,

    /// Output budget of a single vision call. Default: 3000.
    pub max_tokens: usize,

    /// Retry attempts on a failed provider call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            max_image_edge: 2048,
            max_pages: 30,
            concurrency: 8,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 3000,
            max_retries: 3,
            retry_backoff_ms: 500,
            password: None,
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for ExtractorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_image_edge", &self.max_image_edge)
            .field("max_pages", &self.max_pages)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ExtractorConfig {
    /// Create a new builder for `ExtractorConfig`.
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractorConfig`].
#[derive(Debug)]
pub struct ExtractorConfigBuilder {
    config: ExtractorConfig,
}

impl ExtractorConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_image_edge(mut self, px: u32) -> Self {
        self.config.max_image_edge = px.max(64);
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

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

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractorConfig, StudyKitError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(StudyKitError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.max_tokens == 0 {
            return Err(StudyKitError::InvalidConfig(
                "Vision max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_defaults() {
        let c = WorkflowConfig::default();
        assert_eq!(c.min_extracted_chars, 50);
        assert_eq!(c.validation_excerpt_chars, 800);
        assert_eq!(c.generation_excerpt_chars, 10_000);
        assert_eq!(c.max_fill_in_blanks, 5);
        assert_eq!(c.max_match_pairs, 5);
        assert_eq!(c.max_questions, 3);
        assert!((c.validation_temperature - 0.05).abs() < f32::EPSILON);
    }

    #[test]
    fn builder_clamps_ratios() {
        let c = WorkflowConfig::builder()
            .max_garbled_ratio(3.0)
            .min_alphanumeric_ratio(-1.0)
            .build()
            .unwrap();
        assert_eq!(c.max_garbled_ratio, 1.0);
        assert_eq!(c.min_alphanumeric_ratio, 0.0);
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = WorkflowConfig::builder()
            .completion_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Timeouts"));
    }

    #[test]
    fn zero_excerpt_rejected() {
        assert!(WorkflowConfig::builder()
            .validation_excerpt_chars(0)
            .build()
            .is_err());
    }

    #[test]
    fn extractor_builder_clamps() {
        let c = ExtractorConfig::builder()
            .dpi(1000)
            .concurrency(0)
            .max_pages(0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 400);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_pages, 1);
    }

    #[test]
    fn debug_redacts_password() {
        let c = ExtractorConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }
}
