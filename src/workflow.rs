//! The request state machine.
//!
//! ```text
//! Extracting ──▶ Validating ──▶ Generating ──▶ Parsing ──▶ Succeeded
//!     │              │              │             │
//!     ▼              ▼              ▼             ▼
//! ExtractionFailed ValidationFailed GenerationFailed ParsingFailed
//! ```
//!
//! Every working state can also end in `Cancelled`. The machine is linear:
//! no state is revisited and no stage is retried here. Whatever happens, the
//! caller gets exactly one [`WorkflowOutcome`]; stage errors never escape as
//! `Err`.

use crate::config::WorkflowConfig;
use crate::error::StageFailure;
use crate::material::{SourceMaterial, TargetMetadata};
use crate::output::{ExtractionMethod, OutcomeMetadata, TokenUsage, ValidationVerdict, WorkflowOutcome};
use crate::pipeline::parse::{ParseLimits, ResponseParser};
use crate::pipeline::{extract, generate, validate};
use crate::ports::{CompletionPort, ExtractorPort};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// States of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowState {
    Extracting,
    Validating,
    Generating,
    Parsing,
    Succeeded,
    ExtractionFailed,
    ValidationFailed,
    GenerationFailed,
    ParsingFailed,
    Cancelled,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            WorkflowState::Extracting
                | WorkflowState::Validating
                | WorkflowState::Generating
                | WorkflowState::Parsing
        )
    }

    /// Noun used in cancellation messages ("cancelled during generation").
    fn stage_name(self) -> &'static str {
        match self {
            WorkflowState::Extracting => "extraction",
            WorkflowState::Validating => "validation",
            WorkflowState::Generating => "generation",
            WorkflowState::Parsing => "parsing",
            _ => "completion",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowState::Extracting => "extracting",
            WorkflowState::Validating => "validating",
            WorkflowState::Generating => "generating",
            WorkflowState::Parsing => "parsing",
            WorkflowState::Succeeded => "succeeded",
            WorkflowState::ExtractionFailed => "extraction_failed",
            WorkflowState::ValidationFailed => "validation_failed",
            WorkflowState::GenerationFailed => "generation_failed",
            WorkflowState::ParsingFailed => "parsing_failed",
            WorkflowState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl From<&StageFailure> for WorkflowState {
    fn from(failure: &StageFailure) -> Self {
        match failure {
            StageFailure::Extraction { .. } => WorkflowState::ExtractionFailed,
            StageFailure::Validation { .. } => WorkflowState::ValidationFailed,
            StageFailure::Generation { .. } => WorkflowState::GenerationFailed,
            StageFailure::Parsing { .. } => WorkflowState::ParsingFailed,
            StageFailure::Cancelled { .. } => WorkflowState::Cancelled,
        }
    }
}

impl WorkflowOutcome {
    /// Terminal state this outcome was produced in.
    pub fn state(&self) -> WorkflowState {
        match &self.failure {
            None => WorkflowState::Succeeded,
            Some(f) => WorkflowState::from(f),
        }
    }
}

/// Drives one request through extraction, validation, generation and parsing.
///
/// Holds no per-request state; one `Workflow` can serve many concurrent
/// requests.
pub struct Workflow {
    config: WorkflowConfig,
    extractor: Arc<dyn ExtractorPort>,
    completion: Arc<dyn CompletionPort>,
    parser: ResponseParser,
}

impl Workflow {
    pub fn new(
        config: WorkflowConfig,
        extractor: Arc<dyn ExtractorPort>,
        completion: Arc<dyn CompletionPort>,
    ) -> Self {
        let parser = ResponseParser::new(ParseLimits::from(&config));
        Self {
            config,
            extractor,
            completion,
            parser,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Process one request. Dropping the returned future cancels it.
    pub async fn process_content(
        &self,
        material: &SourceMaterial,
        standard: &str,
        subject: &str,
        chapter: &str,
    ) -> WorkflowOutcome {
        let target = TargetMetadata::new(standard, subject, chapter);
        self.process_content_until(material, &target, std::future::pending())
            .await
    }

    /// Process one request, stopping as soon as `cancel` resolves.
    ///
    /// The in-flight extractor or provider call is dropped and the outcome
    /// is [`StageFailure::Cancelled`] naming the interrupted stage.
    pub async fn process_content_until<C>(
        &self,
        material: &SourceMaterial,
        target: &TargetMetadata,
        cancel: C,
    ) -> WorkflowOutcome
    where
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let run = Run {
            started: Instant::now(),
            target,
            content_type: material.content_type(),
            files_processed: material.files_processed(),
        };
        let mut usage = TokenUsage::default();
        info!(
            "Processing {} ({} file(s)) for {} / {} / {}",
            run.content_type, run.files_processed, target.standard, target.subject, target.chapter
        );

        // ── Extracting ───────────────────────────────────────────────────
        let extracted = self
            .stage(
                WorkflowState::Extracting,
                &mut cancel,
                extract::select(self.extractor.as_ref(), material, &self.config),
            )
            .await;
        let Some(extraction) = extracted else {
            return self.cancelled(&run, WorkflowState::Extracting, None, None, usage);
        };
        if !extraction.succeeded {
            let failure = StageFailure::Extraction {
                reason: extraction
                    .failure_reason
                    .unwrap_or_else(|| "no text extracted".to_string()),
            };
            let verdict = ValidationVerdict::unavailable("Validation not performed: extraction failed");
            return self.finish(&run, failure, None, verdict, usage);
        }
        let method = extraction.method;
        info!(
            "Extracted {} chars via {} (quality {:.2})",
            extraction.text.chars().count(),
            method,
            extraction.quality
        );

        // ── Validating ───────────────────────────────────────────────────
        let validated = self
            .stage(
                WorkflowState::Validating,
                &mut cancel,
                validate::validate(
                    self.completion.as_ref(),
                    &extraction.text,
                    target,
                    &self.config,
                    &mut usage,
                ),
            )
            .await;
        let Some(verdict) = validated else {
            return self.cancelled(&run, WorkflowState::Validating, Some(method), None, usage);
        };
        if !verdict.passed() {
            let failure = StageFailure::Validation {
                reason: verdict.failure_summary(),
            };
            warn!("Validation failed: {}", verdict.reason);
            return self.finish(&run, failure, Some(method), verdict, usage);
        }

        // ── Generating ───────────────────────────────────────────────────
        let generated = self
            .stage(
                WorkflowState::Generating,
                &mut cancel,
                generate::generate(
                    self.completion.as_ref(),
                    &extraction.text,
                    target,
                    &self.config,
                    &mut usage,
                ),
            )
            .await;
        let Some(generated) = generated else {
            return self.cancelled(&run, WorkflowState::Generating, Some(method), Some(verdict), usage);
        };
        let raw = match generated {
            Ok(raw) => raw,
            Err(failure) => return self.finish(&run, failure, Some(method), verdict, usage),
        };

        // ── Parsing ──────────────────────────────────────────────────────
        let parser = self.parser;
        let parsed = self
            .stage(WorkflowState::Parsing, &mut cancel, async move { parser.parse(&raw) })
            .await;
        let Some(parsed) = parsed else {
            return self.cancelled(&run, WorkflowState::Parsing, Some(method), Some(verdict), usage);
        };
        match parsed {
            Ok(content) => {
                let metadata = run.metadata(Some(method), verdict);
                let outcome = WorkflowOutcome::succeeded(content, metadata, usage);
                self.complete(&run, outcome)
            }
            Err(e) => {
                let failure = StageFailure::Parsing {
                    reason: e.to_string(),
                };
                self.finish(&run, failure, Some(method), verdict, usage)
            }
        }
    }

    /// Run one working state, racing it against `cancel`.
    ///
    /// `None` means the request was cancelled while in `state`.
    async fn stage<C, F, T>(
        &self,
        state: WorkflowState,
        cancel: &mut Pin<&mut C>,
        work: F,
    ) -> Option<T>
    where
        C: Future<Output = ()>,
        F: Future<Output = T>,
    {
        debug!("Entering {}", state);
        if let Some(obs) = &self.config.observer {
            obs.on_state_enter(state);
        }
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.as_mut() => None,
            r = work => Some(r),
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        debug!("Leaving {} after {}ms", state, elapsed_ms);
        if let Some(obs) = &self.config.observer {
            obs.on_stage_complete(state, elapsed_ms);
        }
        result
    }

    fn cancelled(
        &self,
        run: &Run<'_>,
        state: WorkflowState,
        method: Option<ExtractionMethod>,
        verdict: Option<ValidationVerdict>,
        usage: TokenUsage,
    ) -> WorkflowOutcome {
        warn!("Request cancelled during {}", state.stage_name());
        let failure = StageFailure::Cancelled {
            stage: state.stage_name().to_string(),
        };
        let verdict = verdict.unwrap_or_else(|| {
            ValidationVerdict::unavailable("Validation not performed: processing cancelled")
        });
        self.finish(run, failure, method, verdict, usage)
    }

    fn finish(
        &self,
        run: &Run<'_>,
        failure: StageFailure,
        method: Option<ExtractionMethod>,
        verdict: ValidationVerdict,
        usage: TokenUsage,
    ) -> WorkflowOutcome {
        let outcome = WorkflowOutcome::failed(failure, run.metadata(method, verdict), usage);
        self.complete(run, outcome)
    }

    fn complete(&self, run: &Run<'_>, outcome: WorkflowOutcome) -> WorkflowOutcome {
        let usage = outcome.usage;
        info!(
            "Request {} in {}ms ({} call(s), {} input tokens, {} output tokens)",
            outcome.state(),
            run.started.elapsed().as_millis(),
            usage.calls,
            usage.input_tokens,
            usage.output_tokens
        );
        if !outcome.success {
            info!("{}", outcome.message);
        }
        if let Some(obs) = &self.config.observer {
            obs.on_workflow_complete(&outcome);
        }
        outcome
    }
}

/// Per-request facts echoed into the outcome metadata.
struct Run<'a> {
    started: Instant,
    target: &'a TargetMetadata,
    content_type: &'static str,
    files_processed: usize,
}

impl Run<'_> {
    fn metadata(&self, method: Option<ExtractionMethod>, verdict: ValidationVerdict) -> OutcomeMetadata {
        OutcomeMetadata::new(
            self.target,
            self.content_type,
            self.files_processed,
            method,
            verdict,
        )
    }
}
