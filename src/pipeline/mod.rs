//! Workflow stages.
//!
//! Each submodule implements one step. The decision logic ([`extract`],
//! [`validate`], [`generate`], [`parse`]) only sees the capability ports, so
//! it is testable without pdfium or a network. The remaining modules are the
//! building blocks of the concrete adapters.
//!
//! ## Data Flow
//!
//! ```text
//! material ──▶ extract ──▶ validate ──▶ generate ──▶ parse
//!             (fast, then   (3 checks)   (1 call)     (4 blocks)
//!              advanced)
//! ```
//!
//! Adapter side:
//!
//! 1. [`render`] — bind pdfium, read the text layer, rasterise pages; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 2. [`encode`] — load, downscale and base64-wrap images for the vision API
//! 3. [`llm`]    — provider calls with retry/backoff
//! 4. [`postprocess`] — deterministic cleanup of model output

pub mod encode;
pub mod extract;
pub mod generate;
pub mod llm;
pub mod parse;
pub mod postprocess;
pub mod render;
pub mod validate;

use crate::error::CompletionError;
use crate::ports::{Completion, CompletionPort};
use std::time::Duration;

/// First `max_chars` characters of `text`, cut on a char boundary.
pub(crate) fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

/// One completion call bounded by `budget`.
///
/// On timeout the provider future is dropped, which cancels the request.
pub(crate) async fn complete_within(
    port: &dyn CompletionPort,
    prompt: &str,
    max_tokens: usize,
    temperature: f32,
    budget: Duration,
) -> Result<Completion, CompletionError> {
    match tokio::time::timeout(budget, port.complete(prompt, max_tokens, temperature)).await {
        Ok(result) => result,
        Err(_) => Err(CompletionError::Timeout {
            ms: budget.as_millis() as u64,
        }),
    }
}
