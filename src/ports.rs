//! Capability ports the workflow calls out through.
//!
//! The workflow never talks to pdfium or an LLM SDK directly. It sees two
//! narrow async traits:
//!
//! * [`ExtractorPort`] — turn source material into plain text, two ways
//!   (fast and advanced).
//! * [`CompletionPort`] — turn a prompt into text plus token counts.
//!
//! [`crate::extractor::DocumentExtractor`] and
//! [`crate::pipeline::llm::LlmCompletion`] are the production adapters; tests
//! substitute scripted mocks.

use crate::error::{CompletionError, ExtractorError};
use crate::material::SourceMaterial;
use async_trait::async_trait;

/// Text pulled out of source material, plus the extractor's own confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub text: String,
    /// Self-reported quality in `0.0..=1.0`, if the extractor has one.
    pub quality: Option<f32>,
}

impl Extraction {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quality: None,
        }
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = Some(quality.clamp(0.0, 1.0));
        self
    }
}

/// Document/image to text.
///
/// For image-only material the workflow calls
/// [`extract_advanced`](ExtractorPort::extract_advanced) exactly once; the
/// advanced path is the vision path.
#[async_trait]
pub trait ExtractorPort: Send + Sync {
    /// Cheap, lower-fidelity extraction (e.g. the PDF text layer).
    async fn extract_fast(&self, material: &SourceMaterial) -> Result<Extraction, ExtractorError>;

    /// Slow, higher-fidelity extraction (e.g. rasterise and transcribe).
    async fn extract_advanced(
        &self,
        material: &SourceMaterial,
    ) -> Result<Extraction, ExtractorError>;
}

/// Generated text and what it cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Prompt to text.
#[async_trait]
pub trait CompletionPort: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<Completion, CompletionError>;
}
