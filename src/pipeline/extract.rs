//! Extraction selection: fast extractor first, advanced on rejection.
//!
//! The policy is split from the I/O. [`judge_fast`] and [`after_fallback`]
//! are pure and return a [`Selection`]; [`select`] performs the (timed)
//! extractor calls and feeds them through those two functions.
//!
//! The fast result is accepted only when it is long enough, not dominated by
//! garbled glyphs, mostly alphanumeric, and not self-reported as poor. The
//! advanced result is returned as-is: it is the fallback of last resort and
//! is not held to the same heuristic. Image-only material has a single
//! (vision) path, so the selector makes exactly one advanced call.

use crate::config::WorkflowConfig;
use crate::error::ExtractorError;
use crate::material::SourceMaterial;
use crate::output::ExtractionMethod;
use crate::ports::{Extraction, ExtractorPort};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Measurements behind an accept/reject decision on fast-extracted text.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    /// Characters after trimming.
    pub chars: usize,
    /// Share of U+FFFD, control and private-use characters among non-whitespace.
    pub garbled_ratio: f32,
    /// Share of alphanumeric characters among non-whitespace.
    pub alphanumeric_ratio: f32,
    pub reported_quality: Option<f32>,
    /// Why the text was rejected; `None` when accepted.
    pub rejection: Option<String>,
}

impl QualityReport {
    pub fn accepted(&self) -> bool {
        self.rejection.is_none()
    }

    /// Single score in `0.0..=1.0`.
    pub fn score(&self) -> f32 {
        ((1.0 - self.garbled_ratio) * self.reported_quality.unwrap_or(1.0)).clamp(0.0, 1.0)
    }
}

fn is_garbled(c: char) -> bool {
    c == '\u{FFFD}' || (c.is_control() && !c.is_whitespace()) || ('\u{E000}'..='\u{F8FF}').contains(&c)
}

/// Measure `extraction` against the thresholds in `config`.
pub fn assess_quality(extraction: &Extraction, config: &WorkflowConfig) -> QualityReport {
    let text = extraction.text.trim();
    let chars = text.chars().count();

    let (mut visible, mut garbled, mut alnum) = (0usize, 0usize, 0usize);
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        visible += 1;
        if is_garbled(c) {
            garbled += 1;
        } else if c.is_alphanumeric() {
            alnum += 1;
        }
    }
    let ratio = |n: usize| if visible == 0 { 0.0 } else { n as f32 / visible as f32 };
    let garbled_ratio = ratio(garbled);
    let alphanumeric_ratio = ratio(alnum);

    let rejection = if chars < config.min_extracted_chars {
        Some(format!(
            "only {} characters extracted (minimum {})",
            chars, config.min_extracted_chars
        ))
    } else if garbled_ratio > config.max_garbled_ratio {
        Some(format!(
            "garbled character ratio {:.2} above {:.2}",
            garbled_ratio, config.max_garbled_ratio
        ))
    } else if alphanumeric_ratio < config.min_alphanumeric_ratio {
        Some(format!(
            "alphanumeric ratio {:.2} below {:.2}",
            alphanumeric_ratio, config.min_alphanumeric_ratio
        ))
    } else {
        match extraction.quality {
            Some(q) if q < config.min_reported_quality => Some(format!(
                "extractor reported quality {:.2} below {:.2}",
                q, config.min_reported_quality
            )),
            _ => None,
        }
    };

    QualityReport {
        chars,
        garbled_ratio,
        alphanumeric_ratio,
        reported_quality: extraction.quality,
        rejection,
    }
}

/// Outcome of the selection policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    FastAccepted {
        extraction: Extraction,
        quality: QualityReport,
    },
    FellBackToAdvanced {
        extraction: Extraction,
        fast_rejection: String,
    },
    BothFailed {
        fast: String,
        advanced: String,
    },
}

/// Decide on the fast result alone. `Err(reason)` means fall back.
pub fn judge_fast(
    fast: Result<Extraction, ExtractorError>,
    config: &WorkflowConfig,
) -> Result<Selection, String> {
    let extraction = fast.map_err(|e| format!("fast extractor failed: {e}"))?;
    let quality = assess_quality(&extraction, config);
    match quality.rejection.clone() {
        None => Ok(Selection::FastAccepted {
            extraction,
            quality,
        }),
        Some(reason) => Err(format!("fast extraction rejected: {reason}")),
    }
}

/// Decide once the advanced extractor has answered.
///
/// Any text is accepted; only an error or an empty result counts as failure.
pub fn after_fallback(
    fast_rejection: String,
    advanced: Result<Extraction, ExtractorError>,
) -> Selection {
    match non_empty(advanced) {
        Ok(extraction) => Selection::FellBackToAdvanced {
            extraction,
            fast_rejection,
        },
        Err(e) => Selection::BothFailed {
            fast: fast_rejection,
            advanced: format!("advanced extractor failed: {e}"),
        },
    }
}

fn non_empty(result: Result<Extraction, ExtractorError>) -> Result<Extraction, ExtractorError> {
    match result {
        Ok(e) if e.text.trim().is_empty() => Err(ExtractorError::Empty),
        other => other,
    }
}

/// What the workflow carries forward from extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub text: String,
    pub method: ExtractionMethod,
    /// `0.0..=1.0`; zero on failure.
    pub quality: f32,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
}

impl ExtractionResult {
    fn success(extraction: Extraction, method: ExtractionMethod) -> Self {
        let quality = extraction.quality.unwrap_or(1.0);
        Self {
            text: extraction.text,
            method,
            quality,
            succeeded: true,
            failure_reason: None,
        }
    }

    fn failure(method: ExtractionMethod, reason: String) -> Self {
        Self {
            text: String::new(),
            method,
            quality: 0.0,
            succeeded: false,
            failure_reason: Some(reason),
        }
    }
}

impl From<Selection> for ExtractionResult {
    fn from(selection: Selection) -> Self {
        match selection {
            Selection::FastAccepted {
                extraction,
                quality,
            } => {
                let mut result = ExtractionResult::success(extraction, ExtractionMethod::Fast);
                result.quality = quality.score();
                result
            }
            Selection::FellBackToAdvanced { extraction, .. } => {
                ExtractionResult::success(extraction, ExtractionMethod::Advanced)
            }
            Selection::BothFailed { fast, advanced } => {
                ExtractionResult::failure(ExtractionMethod::Advanced, format!("{fast}; {advanced}"))
            }
        }
    }
}

async fn within<F>(call: F, budget: Duration) -> Result<Extraction, ExtractorError>
where
    F: Future<Output = Result<Extraction, ExtractorError>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(ExtractorError::Timeout {
            ms: budget.as_millis() as u64,
        }),
    }
}

/// Run the selection policy against `extractor`.
pub async fn select(
    extractor: &dyn ExtractorPort,
    material: &SourceMaterial,
    config: &WorkflowConfig,
) -> ExtractionResult {
    if material.is_images() {
        debug!("Image material: single vision extraction");
        let result = non_empty(within(extractor.extract_advanced(material), config.extraction_timeout).await);
        return match result {
            Ok(extraction) => ExtractionResult::success(extraction, ExtractionMethod::Vision),
            Err(e) => {
                warn!("Vision extraction failed: {}", e);
                ExtractionResult::failure(
                    ExtractionMethod::Vision,
                    format!("vision extractor failed: {e}"),
                )
            }
        };
    }

    let fast = within(extractor.extract_fast(material), config.extraction_timeout).await;
    let rejection = match judge_fast(fast, config) {
        Ok(selection) => {
            info!("Fast extraction accepted");
            return selection.into();
        }
        Err(reason) => reason,
    };

    info!("{}; falling back to advanced extraction", rejection);
    let advanced = within(extractor.extract_advanced(material), config.extraction_timeout).await;
    let selection = after_fallback(rejection, advanced);
    if let Selection::BothFailed { advanced, .. } = &selection {
        warn!("{}", advanced);
    }
    selection.into()
}
