//! Generation step: one completion producing all four study blocks.

use crate::config::WorkflowConfig;
use crate::error::StageFailure;
use crate::material::TargetMetadata;
use crate::output::TokenUsage;
use crate::pipeline::{complete_within, excerpt};
use crate::ports::CompletionPort;
use crate::prompts;
use tracing::{debug, warn};

/// Ask the provider for study material over an excerpt of `text`.
///
/// Returns the raw reply; a provider error, a timeout or a blank reply is a
/// [`StageFailure::Generation`].
pub async fn generate(
    completion: &dyn CompletionPort,
    text: &str,
    target: &TargetMetadata,
    config: &WorkflowConfig,
    usage: &mut TokenUsage,
) -> Result<String, StageFailure> {
    let prompt = prompts::generation_prompt(
        excerpt(text, config.generation_excerpt_chars),
        target,
        config.max_fill_in_blanks,
        config.max_match_pairs,
        config.max_questions,
    );
    debug!("Generation prompt: {} chars", prompt.len());

    let reply = complete_within(
        completion,
        &prompt,
        config.generation_max_tokens,
        config.generation_temperature,
        config.completion_timeout,
    )
    .await
    .map_err(|e| {
        warn!("Generation call failed: {}", e);
        StageFailure::Generation {
            reason: e.to_string(),
        }
    })?;

    usage.record(reply.input_tokens, reply.output_tokens);
    if reply.text.trim().is_empty() {
        return Err(StageFailure::Generation {
            reason: "provider returned empty text".to_string(),
        });
    }
    Ok(reply.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionError;
    use crate::ports::Completion;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Echo {
        reply: Result<Completion, CompletionError>,
        seen: Mutex<Vec<(usize, f32, usize)>>,
    }

    #[async_trait]
    impl CompletionPort for Echo {
        async fn complete(
            &self,
            prompt: &str,
            max_tokens: usize,
            temperature: f32,
        ) -> Result<Completion, CompletionError> {
            self.seen
                .lock()
                .unwrap()
                .push((max_tokens, temperature, prompt.len()));
            self.reply.clone()
        }
    }

    fn echo(reply: Result<Completion, CompletionError>) -> Echo {
        Echo {
            reply,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn target() -> TargetMetadata {
        TargetMetadata::new("Class 6", "Science", "Plants")
    }

    #[test]
    fn uses_generation_budget_and_records_usage() {
        let port = echo(Ok(Completion {
            text: "### STUDY NOTES:\nx".into(),
            input_tokens: 900,
            output_tokens: 300,
        }));
        let mut usage = TokenUsage::default();
        let text = "a".repeat(50_000);
        let out = tokio_test::block_on(generate(&port, &text, &target(), &WorkflowConfig::default(), &mut usage));
        assert!(out.is_ok());
        assert_eq!(usage.input_tokens, 900);
        assert_eq!(usage.calls, 1);

        let seen = port.seen.lock().unwrap();
        assert_eq!(seen[0].0, 4000);
        assert!((seen[0].1 - 0.2).abs() < f32::EPSILON);
        // Excerpt is capped, so the prompt stays far below the input length.
        assert!(seen[0].2 < 12_000);
    }

    #[test]
    fn blank_reply_is_generation_failure() {
        let port = echo(Ok(Completion {
            text: " \n ".into(),
            input_tokens: 1,
            output_tokens: 0,
        }));
        let mut usage = TokenUsage::default();
        let err = tokio_test::block_on(generate(&port, "t", &target(), &WorkflowConfig::default(), &mut usage))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Content generation failed: provider returned empty text"
        );
    }

    #[test]
    fn provider_error_is_generation_failure() {
        let port = echo(Err(CompletionError::Provider("quota exceeded".into())));
        let mut usage = TokenUsage::default();
        let err = tokio_test::block_on(generate(&port, "t", &target(), &WorkflowConfig::default(), &mut usage))
            .unwrap_err();
        assert!(matches!(err, StageFailure::Generation { ref reason } if reason.contains("quota exceeded")));
        assert_eq!(usage.calls, 0);
    }
}
