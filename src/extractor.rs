//! Production [`ExtractorPort`]: pdfium for the text layer and rasterising,
//! a vision model for transcription.
//!
//! ## Fast path
//! Reads the embedded text of the first `max_pages` pages. Reported quality is
//! the share of those pages that carry any text, so a scanned book with a few
//! OCR'd cover pages scores low even when it clears the character floor.
//!
//! ## Advanced path
//! * **Document**: rasterise each page, encode it as PNG and transcribe it with
//!   the vision model, `concurrency` pages in flight. Pages are reassembled in
//!   page order; reported quality is the share of pages transcribed.
//! * **Images**: decode, shrink to `max_image_edge`, describe each image.
//!   Failed images are skipped; all of them failing is an error.

use crate::config::ExtractorConfig;
use crate::error::{ExtractorError, StudyKitError};
use crate::material::{InputFile, SourceMaterial};
use crate::pipeline::{encode, llm, postprocess, render};
use crate::ports::{Completion, Extraction, ExtractorPort};
use crate::prompts::{PAGE_TRANSCRIPTION_PROMPT, VISION_SYSTEM_PROMPT, VISION_USER_PROMPT};
use crate::provider::resolve_provider;
use async_trait::async_trait;
use edgequake_llm::{ImageData, LLMProvider};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// pdfium + vision-model extractor.
#[derive(Clone)]
pub struct DocumentExtractor {
    config: ExtractorConfig,
    provider: Arc<dyn LLMProvider>,
}

impl DocumentExtractor {
    pub fn new(config: ExtractorConfig, provider: Arc<dyn LLMProvider>) -> Self {
        Self { config, provider }
    }

    /// Resolve the provider from `config` (see [`resolve_provider`]).
    pub fn from_config(config: ExtractorConfig) -> Result<Self, StudyKitError> {
        let provider = resolve_provider(&config)?;
        Ok(Self::new(config, provider))
    }

    /// The provider, for sharing with [`llm::LlmCompletion`].
    pub fn provider(&self) -> Arc<dyn LLMProvider> {
        Arc::clone(&self.provider)
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    async fn transcribe_document(&self, path: &Path) -> Result<Extraction, ExtractorError> {
        let pages = render::render_pages(path, &self.config).await?;
        if pages.is_empty() {
            return Err(ExtractorError::Empty);
        }
        let total = pages.len();

        let mut encoded = Vec::with_capacity(total);
        let mut failed = Vec::new();
        for (idx, img) in &pages {
            match encode::encode_page(img) {
                Ok(data) => encoded.push((*idx, data)),
                Err(e) => {
                    warn!("Page {}: encoding failed: {}", idx + 1, e);
                    failed.push((*idx, Err(format!("encoding failed: {e}"))));
                }
            }
        }
        drop(pages);

        let mut results = self
            .describe_all(encoded, "page", PAGE_TRANSCRIPTION_PROMPT, "")
            .await;
        results.extend(failed);
        assemble(results, total, postprocess::clean_page)
    }

    async fn describe_images(&self, files: &[InputFile]) -> Result<Extraction, ExtractorError> {
        let total = files.len();
        let mut encoded = Vec::with_capacity(total);
        let mut failed = Vec::new();

        for (idx, file) in files.iter().enumerate() {
            match load_and_encode(file.path(), self.config.max_image_edge).await {
                Ok(data) => encoded.push((idx, data)),
                Err(e) => {
                    warn!("Image {}: {}", idx + 1, e);
                    failed.push((idx, Err(e.to_string())));
                }
            }
        }

        let mut results = self
            .describe_all(encoded, "image", VISION_SYSTEM_PROMPT, VISION_USER_PROMPT)
            .await;
        results.extend(failed);
        assemble(results, total, |t| t.trim().to_string())
    }

    /// One vision call per item, `concurrency` at a time, results unordered.
    async fn describe_all(
        &self,
        items: Vec<(usize, ImageData)>,
        noun: &str,
        system_prompt: &str,
        instruction: &str,
    ) -> Vec<(usize, Result<Completion, String>)> {
        stream::iter(items.into_iter().map(|(idx, data)| {
            let provider = Arc::clone(&self.provider);
            let config = &self.config;
            let label = format!("{} {}", noun, idx + 1);
            async move {
                let result =
                    llm::describe_images(&provider, &label, system_prompt, instruction, vec![data], config)
                        .await;
                (idx, result)
            }
        }))
        .buffer_unordered(self.config.concurrency)
        .collect()
        .await
    }
}

#[async_trait]
impl ExtractorPort for DocumentExtractor {
    async fn extract_fast(&self, material: &SourceMaterial) -> Result<Extraction, ExtractorError> {
        let SourceMaterial::Document(file) = material else {
            return Err(ExtractorError::Unsupported(
                "the text layer exists only for PDF documents".to_string(),
            ));
        };

        let layer = render::read_text_layer(
            file.path(),
            self.config.password.as_deref(),
            self.config.max_pages,
        )
        .await?;
        let text = layer.text();
        debug!(
            "Text layer: {} chars over {}/{} pages",
            text.len(),
            layer.pages.len(),
            layer.total_pages
        );
        if text.trim().is_empty() {
            return Err(ExtractorError::Empty);
        }
        Ok(Extraction::new(text).with_quality(layer.coverage()))
    }

    async fn extract_advanced(
        &self,
        material: &SourceMaterial,
    ) -> Result<Extraction, ExtractorError> {
        match material {
            SourceMaterial::Document(file) => self.transcribe_document(file.path()).await,
            SourceMaterial::Images(files) => self.describe_images(files).await,
        }
    }
}

async fn load_and_encode(path: &Path, max_edge: u32) -> Result<ImageData, StudyKitError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let img = encode::load_image(&path, max_edge)?;
        encode::encode_page(&img).map_err(|e| StudyKitError::ImageDecodeFailed {
            path: path.clone(),
            detail: e.to_string(),
        })
    })
    .await
    .map_err(|e| StudyKitError::Internal(format!("image task panicked: {e}")))?
}

/// Join successful items in index order.
///
/// Quality is the share of the `total` items that produced text. No text at
/// all is an error carrying the first failure, if any.
fn assemble(
    mut results: Vec<(usize, Result<Completion, String>)>,
    total: usize,
    clean: impl Fn(&str) -> String,
) -> Result<Extraction, ExtractorError> {
    results.sort_by_key(|(idx, _)| *idx);

    let mut parts = Vec::with_capacity(results.len());
    let mut first_error = None;
    let (mut input_tokens, mut output_tokens) = (0usize, 0usize);

    for (idx, result) in results {
        match result {
            Ok(c) => {
                input_tokens += c.input_tokens;
                output_tokens += c.output_tokens;
                let text = clean(&c.text);
                if !text.trim().is_empty() {
                    parts.push(text);
                }
            }
            Err(e) => {
                first_error.get_or_insert_with(|| format!("item {}: {}", idx + 1, e));
            }
        }
    }

    info!(
        "Vision extraction: {}/{} items, {} input tokens, {} output tokens",
        parts.len(),
        total,
        input_tokens,
        output_tokens
    );

    if parts.is_empty() {
        return Err(match first_error {
            Some(e) => ExtractorError::Failed(e),
            None => ExtractorError::Empty,
        });
    }
    let quality = parts.len() as f32 / total.max(1) as f32;
    Ok(Extraction::new(parts.join("\n\n")).with_quality(quality))
}
