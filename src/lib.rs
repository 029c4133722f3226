//! # edgequake-studykit
//!
//! Turn a textbook chapter (one PDF, or photos of its pages) into study
//! material: notes, fill-in-the-blanks, match-the-following and subjective
//! Q&A, checked for grade fit, subject relevance and safety first.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF or images
//!  │
//!  ├─ 1. Extracting   text layer first; vision transcription when it is poor
//!  ├─ 2. Validating   one cheap completion: grade, relevance, safety
//!  ├─ 3. Generating   one completion for all four blocks
//!  ├─ 4. Parsing      split and cap the blocks, keep keys consistent
//!  └─ Succeeded | ExtractionFailed | ValidationFailed | GenerationFailed | ParsingFailed
//! ```
//!
//! The workflow never returns `Err`: every request ends in exactly one
//! [`WorkflowOutcome`], whose `failure` says which stage stopped it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_studykit::{
//!     DocumentExtractor, ExtractorConfig, LlmCompletion, SourceMaterial, Workflow, WorkflowConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let extractor = DocumentExtractor::from_config(ExtractorConfig::default())?;
//!     let completion = LlmCompletion::from_config(extractor.provider(), extractor.config());
//!     let workflow = Workflow::new(WorkflowConfig::default(), Arc::new(extractor), Arc::new(completion));
//!
//!     let material = SourceMaterial::document("chapter3.pdf")?;
//!     let outcome = workflow
//!         .process_content(&material, "Class 6", "Science", "Plants")
//!         .await;
//!     println!("{}", outcome.to_json_pretty()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `studykit` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-studykit = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod extractor;
pub mod material;
pub mod output;
pub mod pipeline;
pub mod ports;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{run_batch, BatchItem, BatchManifest, BatchResult};
pub use config::{ExtractorConfig, ExtractorConfigBuilder, WorkflowConfig, WorkflowConfigBuilder};
pub use error::{CompletionError, ExtractorError, StageFailure, StudyKitError};
pub use extractor::DocumentExtractor;
pub use material::{InputFile, SourceMaterial, TargetMetadata};
pub use output::{
    AppropriatenessCheck, ExtractionMethod, FillInTheBlanks, GeneratedArtifact, MatchTheFollowing,
    OutcomeMetadata, OverallStatus, QuestionAnswer, RelevanceCheck, TokenUsage, ValidationVerdict,
    WorkflowOutcome,
};
pub use pipeline::extract::{ExtractionResult, QualityReport};
pub use pipeline::llm::LlmCompletion;
pub use pipeline::parse::{ParseError, ParseLimits, ResponseParser};
pub use pipeline::validate::parse_verdict;
pub use ports::{Completion, CompletionPort, Extraction, ExtractorPort};
pub use progress::{NoopObserver, WorkflowObserver};
pub use provider::resolve_provider;
pub use workflow::{Workflow, WorkflowState};
