//! Provider calls: text completions for the workflow, vision calls for the
//! extractor.
//!
//! All prompt wording lives in [`crate::prompts`]; this module only builds
//! messages, retries and counts tokens.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! avoids thundering-herd: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s. Retries live here, in the collaborator; the
//! workflow itself never retries a stage.

use crate::config::ExtractorConfig;
use crate::error::CompletionError;
use crate::ports::{Completion, CompletionPort};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// [`CompletionPort`] over an `edgequake_llm` provider.
#[derive(Clone)]
pub struct LlmCompletion {
    provider: Arc<dyn LLMProvider>,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl LlmCompletion {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }

    pub fn with_retries(mut self, max_retries: u32, retry_backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff_ms = retry_backoff_ms;
        self
    }

    /// Retry settings taken from the extractor configuration.
    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &ExtractorConfig) -> Self {
        Self::new(provider).with_retries(config.max_retries, config.retry_backoff_ms)
    }
}

#[async_trait]
impl CompletionPort for LlmCompletion {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<Completion, CompletionError> {
        let messages = vec![ChatMessage::user(prompt)];
        chat_with_retry(
            self.provider.as_ref(),
            &messages,
            &build_options(max_tokens, temperature),
            self.max_retries,
            self.retry_backoff_ms,
            "completion",
        )
        .await
        .map_err(CompletionError::Provider)
    }
}

/// One vision call: system prompt, then the images with `instruction`.
///
/// `label` only appears in logs ("page 3", "image 2").
pub async fn describe_images(
    provider: &Arc<dyn LLMProvider>,
    label: &str,
    system_prompt: &str,
    instruction: &str,
    images: Vec<ImageData>,
    config: &ExtractorConfig,
) -> Result<Completion, String> {
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images(instruction, images),
    ];
    chat_with_retry(
        provider.as_ref(),
        &messages,
        &build_options(config.max_tokens, config.temperature),
        config.max_retries,
        config.retry_backoff_ms,
        label,
    )
    .await
}

async fn chat_with_retry(
    provider: &dyn LLMProvider,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    label: &str,
) -> Result<Completion, String> {
    let start = Instant::now();
    let mut last_err: Option<String> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                label, attempt, max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match provider.chat(messages, Some(options)).await {
            Ok(response) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    label,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                return Ok(Completion {
                    text: response.content,
                    input_tokens: response.prompt_tokens,
                    output_tokens: response.completion_tokens,
                });
            }
            Err(e) => {
                let err_msg = format!("{}", e);
                warn!("{}: attempt {} failed: {}", label, attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| "Unknown error".to_string()))
}

fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

fn build_options(max_tokens: usize, temperature: f32) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}
