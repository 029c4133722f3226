//! Output types: verdicts, generated artifacts and the terminal outcome.
//!
//! [`WorkflowOutcome`] is the one value a caller ever receives. Its JSON form
//! is the contract with whatever service layer sits on top:
//!
//! ```text
//! {
//!   "success": true,
//!   "message": "Educational content processed successfully",
//!   "content": {
//!     "importantNotes": "...",
//!     "fillInTheBlanks":   { "questions": {"1": ..}, "answers": {"1": ..} },
//!     "matchTheFollowing": { "column_a": {"1": ..}, "column_b": {"A": ..}, "answers": {"1": "A"} },
//!     "questionAnswer":    { "questions": {"Q1": ..}, "answers": {"Q1": ..} }
//!   },
//!   "metadata": {
//!     "standard": "Class 5", "subject": "Science", "chapter": "Plants",
//!     "content_type": "pdf", "files_processed": 1, "extraction_method": "fast",
//!     "validation_details": {
//!       "grade_check": "APPROPRIATE", "safety_check": "APPROPRIATE",
//!       "relevance_check": "MATCH", "reason": "...", "overall_status": "PASSED"
//!     }
//!   }
//! }
//! ```
//!
//! On failure `content` is `{}`.

use crate::error::StageFailure;
use crate::material::TargetMetadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Extraction ───────────────────────────────────────────────────────────

/// Which extractor produced the text that went on to validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Text layer accepted by the quality heuristic.
    Fast,
    /// Fallback of last resort after the fast text was rejected.
    Advanced,
    /// Image-only input: one vision call, no fallback.
    Vision,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExtractionMethod::Fast => "fast",
            ExtractionMethod::Advanced => "advanced",
            ExtractionMethod::Vision => "vision",
        })
    }
}

// ── Validation ───────────────────────────────────────────────────────────

/// Grade-level or safety label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppropriatenessCheck {
    Appropriate,
    Inappropriate,
    Unknown,
}

/// Subject/chapter relevance label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelevanceCheck {
    Match,
    Mismatch,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Passed,
    Failed,
}

/// Three-axis classification of the extracted content.
///
/// `overall_status` is derived, never supplied: construct through
/// [`ValidationVerdict::new`] or [`ValidationVerdict::unavailable`].
/// Deserialising recomputes it from the three checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "VerdictLabels")]
pub struct ValidationVerdict {
    grade_check: AppropriatenessCheck,
    safety_check: AppropriatenessCheck,
    relevance_check: RelevanceCheck,
    pub reason: String,
    overall_status: OverallStatus,
}

/// Wire form of a verdict; any stored `overall_status` is ignored.
#[derive(Deserialize)]
struct VerdictLabels {
    grade_check: AppropriatenessCheck,
    safety_check: AppropriatenessCheck,
    relevance_check: RelevanceCheck,
    #[serde(default)]
    reason: String,
}

impl From<VerdictLabels> for ValidationVerdict {
    fn from(l: VerdictLabels) -> Self {
        Self::new(l.grade_check, l.safety_check, l.relevance_check, l.reason)
    }
}

impl ValidationVerdict {
    /// Build a verdict; `Passed` iff all three checks are positive.
    pub fn new(
        grade_check: AppropriatenessCheck,
        safety_check: AppropriatenessCheck,
        relevance_check: RelevanceCheck,
        reason: impl Into<String>,
    ) -> Self {
        let passed = grade_check == AppropriatenessCheck::Appropriate
            && safety_check == AppropriatenessCheck::Appropriate
            && relevance_check == RelevanceCheck::Match;
        Self {
            grade_check,
            safety_check,
            relevance_check,
            reason: reason.into(),
            overall_status: if passed {
                OverallStatus::Passed
            } else {
                OverallStatus::Failed
            },
        }
    }

    /// All-unknown, failed verdict carrying `reason`.
    ///
    /// Used when the validation call errored or never ran.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::new(
            AppropriatenessCheck::Unknown,
            AppropriatenessCheck::Unknown,
            RelevanceCheck::Unknown,
            reason,
        )
    }

    pub fn grade_check(&self) -> AppropriatenessCheck {
        self.grade_check
    }

    pub fn safety_check(&self) -> AppropriatenessCheck {
        self.safety_check
    }

    pub fn relevance_check(&self) -> RelevanceCheck {
        self.relevance_check
    }

    pub fn overall_status(&self) -> OverallStatus {
        self.overall_status
    }

    pub fn passed(&self) -> bool {
        self.overall_status == OverallStatus::Passed
    }

    /// Human-readable summary of which checks failed.
    ///
    /// `"grade level and safety checks did not pass"`, or for verdicts whose
    /// labels could not be read at all,
    /// `"grade level, safety and relevance checks could not be determined"`.
    pub fn failure_summary(&self) -> String {
        let mut failed = Vec::new();
        let mut unknown = Vec::new();
        match self.grade_check {
            AppropriatenessCheck::Inappropriate => failed.push("grade level"),
            AppropriatenessCheck::Unknown => unknown.push("grade level"),
            AppropriatenessCheck::Appropriate => {}
        }
        match self.safety_check {
            AppropriatenessCheck::Inappropriate => failed.push("safety"),
            AppropriatenessCheck::Unknown => unknown.push("safety"),
            AppropriatenessCheck::Appropriate => {}
        }
        match self.relevance_check {
            RelevanceCheck::Mismatch => failed.push("relevance"),
            RelevanceCheck::Unknown => unknown.push("relevance"),
            RelevanceCheck::Match => {}
        }

        let mut parts = Vec::new();
        if !failed.is_empty() {
            parts.push(format!("{} checks did not pass", join_names(&failed)));
        }
        if !unknown.is_empty() {
            parts.push(format!(
                "{} checks could not be determined",
                join_names(&unknown)
            ));
        }
        if parts.is_empty() {
            "all checks passed".to_string()
        } else {
            parts.join("; ")
        }
    }
}

fn join_names(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [one] => (*one).to_string(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

// ── Generated artifacts ──────────────────────────────────────────────────

/// Numbered fill-in-the-blank items, keyed `"1"`, `"2"`, …
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillInTheBlanks {
    pub questions: BTreeMap<String, String>,
    pub answers: BTreeMap<String, String>,
}

/// Terms (column A, numbered) matched to definitions (column B, lettered).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTheFollowing {
    pub column_a: BTreeMap<String, String>,
    pub column_b: BTreeMap<String, String>,
    pub answers: BTreeMap<String, String>,
}

impl MatchTheFollowing {
    pub fn is_empty(&self) -> bool {
        self.column_a.is_empty() && self.column_b.is_empty() && self.answers.is_empty()
    }
}

/// Subjective questions keyed `"Q1"`, `"Q2"`, …
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub questions: BTreeMap<String, String>,
    pub answers: BTreeMap<String, String>,
}

/// The four structured outputs of one successful request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    /// Markdown study notes, never empty.
    pub important_notes: String,
    pub fill_in_the_blanks: FillInTheBlanks,
    pub match_the_following: MatchTheFollowing,
    pub question_answer: QuestionAnswer,
}

// ── Outcome ──────────────────────────────────────────────────────────────

/// Summed token usage over every completion call of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub calls: u32,
}

impl TokenUsage {
    pub fn record(&mut self, input_tokens: usize, output_tokens: usize) {
        self.input_tokens += input_tokens as u64;
        self.output_tokens += output_tokens as u64;
        self.calls += 1;
    }
}

/// Request description echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeMetadata {
    pub standard: String,
    pub subject: String,
    pub chapter: String,
    /// `"pdf"` or `"images"`.
    pub content_type: String,
    pub files_processed: usize,
    /// Absent when extraction never produced text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_method: Option<ExtractionMethod>,
    pub validation_details: ValidationVerdict,
}

impl OutcomeMetadata {
    pub fn new(
        target: &TargetMetadata,
        content_type: &str,
        files_processed: usize,
        extraction_method: Option<ExtractionMethod>,
        validation_details: ValidationVerdict,
    ) -> Self {
        Self {
            standard: target.standard.clone(),
            subject: target.subject.clone(),
            chapter: target.chapter.clone(),
            content_type: content_type.to_string(),
            files_processed,
            extraction_method,
            validation_details,
        }
    }
}

/// Terminal value of a workflow run. Constructed exactly once per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub success: bool,
    pub message: String,
    /// `None` serialises as `{}`.
    #[serde(with = "content_repr")]
    pub content: Option<GeneratedArtifact>,
    pub metadata: OutcomeMetadata,
    /// Typed reason when `success` is false.
    #[serde(skip)]
    pub failure: Option<StageFailure>,
    #[serde(skip)]
    pub usage: TokenUsage,
}

impl WorkflowOutcome {
    pub const SUCCESS_MESSAGE: &'static str = "Educational content processed successfully";

    pub fn succeeded(content: GeneratedArtifact, metadata: OutcomeMetadata, usage: TokenUsage) -> Self {
        Self {
            success: true,
            message: Self::SUCCESS_MESSAGE.to_string(),
            content: Some(content),
            metadata,
            failure: None,
            usage,
        }
    }

    pub fn failed(failure: StageFailure, metadata: OutcomeMetadata, usage: TokenUsage) -> Self {
        Self {
            success: false,
            message: failure.to_string(),
            content: None,
            metadata,
            failure: Some(failure),
            usage,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

mod content_repr {
    use super::GeneratedArtifact;
    use serde::de::Error as _;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        content: &Option<GeneratedArtifact>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match content {
            Some(artifact) => artifact.serialize(serializer),
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<GeneratedArtifact>, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Object(ref map) if map.is_empty() => Ok(None),
            other => serde_json::from_value(other).map(Some).map_err(D::Error::custom),
        }
    }
}
