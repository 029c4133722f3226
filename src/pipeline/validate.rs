//! Validation gate: one cheap completion that classifies an excerpt of the
//! extracted text on three axes before any generation budget is spent.

use crate::config::WorkflowConfig;
use crate::material::TargetMetadata;
use crate::output::{AppropriatenessCheck, RelevanceCheck, TokenUsage, ValidationVerdict};
use crate::pipeline::{complete_within, excerpt};
use crate::ports::CompletionPort;
use crate::prompts;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Reason recorded when all three checks pass and the model gave none.
pub const PASSED_REASON: &str = "Content is appropriate, safe, and relevant.";

/// Classify `text` for `target`.
///
/// Never fails: a provider error or timeout yields an all-unknown verdict
/// whose reason carries the error.
pub async fn validate(
    completion: &dyn CompletionPort,
    text: &str,
    target: &TargetMetadata,
    config: &WorkflowConfig,
    usage: &mut TokenUsage,
) -> ValidationVerdict {
    let prompt = prompts::validation_prompt(excerpt(text, config.validation_excerpt_chars), target);

    match complete_within(
        completion,
        &prompt,
        config.validation_max_tokens,
        config.validation_temperature,
        config.completion_timeout,
    )
    .await
    {
        Ok(reply) => {
            usage.record(reply.input_tokens, reply.output_tokens);
            let verdict = parse_verdict(&reply.text);
            debug!(
                "Validation verdict: grade={:?} safety={:?} relevance={:?}",
                verdict.grade_check(),
                verdict.safety_check(),
                verdict.relevance_check()
            );
            verdict
        }
        Err(e) => {
            warn!("Validation call failed: {}", e);
            ValidationVerdict::unavailable(format!("Validation error: {e}"))
        }
    }
}

static RE_GRADE: Lazy<Regex> = Lazy::new(|| axis_regex(r"grade[\s_-]*(?:level[\s_-]*)?check"));
static RE_SAFETY: Lazy<Regex> = Lazy::new(|| axis_regex(r"safety[\s_-]*check"));
static RE_RELEVANCE: Lazy<Regex> = Lazy::new(|| axis_regex(r"relevance[\s_-]*check"));

static RE_REASON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\breason["'*_\s]*[:=]\s*(?P<value>[^\n]+)"#).expect("valid reason regex")
});

fn axis_regex(key: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i){key}["'*_\s]*[:=]\s*["'*_\s]*(?P<value>[A-Za-z][A-Za-z _-]*)"#
    ))
    .expect("valid axis regex")
}

fn label(re: &Regex, reply: &str) -> Option<String> {
    re.captures(reply).map(|c| {
        c["value"]
            .replace(['_', '-'], " ")
            .to_ascii_uppercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    })
}

/// Negative labels are tested first: "INAPPROPRIATE" contains "APPROPRIATE".
fn appropriateness(value: Option<String>) -> AppropriatenessCheck {
    let Some(v) = value else {
        return AppropriatenessCheck::Unknown;
    };
    const NEGATIVE: &[&str] = &[
        "INAPPROPRIATE",
        "NOT APPROPRIATE",
        "TOO ADVANCED",
        "TOO SIMPLE",
        "UNSAFE",
        "NOT SAFE",
        "FAIL",
    ];
    if NEGATIVE.iter().any(|n| v.contains(n)) {
        AppropriatenessCheck::Inappropriate
    } else if v.contains("APPROPRIATE") || v.starts_with("SAFE") || v.starts_with("PASS") {
        AppropriatenessCheck::Appropriate
    } else {
        AppropriatenessCheck::Unknown
    }
}

fn relevance(value: Option<String>) -> RelevanceCheck {
    let Some(v) = value else {
        return RelevanceCheck::Unknown;
    };
    const NEGATIVE: &[&str] = &[
        "MISMATCH",
        "NO MATCH",
        "NOT MATCH",
        "PARTIAL MATCH",
        "IRRELEVANT",
        "NOT RELEVANT",
    ];
    if NEGATIVE.iter().any(|n| v.contains(n)) {
        RelevanceCheck::Mismatch
    } else if v.contains("MATCH") || v.starts_with("RELEVANT") {
        RelevanceCheck::Match
    } else {
        RelevanceCheck::Unknown
    }
}

/// Read a validation reply, line format or JSON, in any case.
pub fn parse_verdict(reply: &str) -> ValidationVerdict {
    let grade = appropriateness(label(&RE_GRADE, reply));
    let safety = appropriateness(label(&RE_SAFETY, reply));
    let relevance = relevance(label(&RE_RELEVANCE, reply));

    let reason = RE_REASON
        .captures(reply)
        .map(|c| {
            let v = c["value"].trim().trim_start_matches(['*', '_']).trim_start();
            // JSON: the reason ends at its closing quote.
            let v = match v.strip_prefix('"') {
                Some(rest) => rest.split('"').next().unwrap_or(rest),
                None => v.trim_end_matches([',', '}']),
            };
            v.trim_matches(|ch: char| matches!(ch, '"' | '\'' | '*' | '_') || ch.is_whitespace())
                .to_string()
        })
        .filter(|r| !r.is_empty());

    let mut verdict = ValidationVerdict::new(grade, safety, relevance, String::new());
    verdict.reason = match reason {
        Some(r) => r,
        None if verdict.passed() => PASSED_REASON.to_string(),
        None => format!("Content validation failed: {}", verdict.failure_summary()),
    };
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OverallStatus;

    #[test]
    fn reads_canonical_reply() {
        let v = parse_verdict(
            "GRADE_CHECK: APPROPRIATE\nSAFETY_CHECK: APPROPRIATE\nRELEVANCE_CHECK: MATCH\nREASON: Content is appropriate, safe, and relevant.",
        );
        assert!(v.passed());
        assert_eq!(v.reason, PASSED_REASON);
    }

    #[test]
    fn inappropriate_is_not_read_as_appropriate() {
        let v = parse_verdict("GRADE_CHECK: INAPPROPRIATE\nSAFETY_CHECK: APPROPRIATE\nRELEVANCE_CHECK: MATCH\nREASON: Too hard.");
        assert_eq!(v.grade_check(), AppropriatenessCheck::Inappropriate);
        assert_eq!(v.safety_check(), AppropriatenessCheck::Appropriate);
        assert_eq!(v.overall_status(), OverallStatus::Failed);
        assert_eq!(v.reason, "Too hard.");
    }

    #[test]
    fn mismatch_is_not_read_as_match() {
        let v = parse_verdict("GRADE_CHECK: APPROPRIATE\nSAFETY_CHECK: APPROPRIATE\nRELEVANCE_CHECK: MISMATCH");
        assert_eq!(v.relevance_check(), RelevanceCheck::Mismatch);
        assert!(!v.passed());
        assert_eq!(v.reason, "Content validation failed: relevance checks did not pass");
    }

    #[test]
    fn case_and_decoration_insensitive() {
        let v = parse_verdict("**Grade check:** appropriate\n**Safety-Check**: Appropriate\nrelevance check = match\n**Reason:** \"Fine.\"");
        assert!(v.passed(), "{v:?}");
        assert_eq!(v.reason, "Fine.");
    }

    #[test]
    fn legacy_labels() {
        let v = parse_verdict("GRADE_CHECK: TOO_ADVANCED\nSAFETY_CHECK: UNSAFE\nRELEVANCE_CHECK: PARTIAL_MATCH");
        assert_eq!(v.grade_check(), AppropriatenessCheck::Inappropriate);
        assert_eq!(v.safety_check(), AppropriatenessCheck::Inappropriate);
        assert_eq!(v.relevance_check(), RelevanceCheck::Mismatch);

        let v = parse_verdict("GRADE_CHECK: NOT APPROPRIATE\nSAFETY_CHECK: SAFE\nRELEVANCE_CHECK: NO_MATCH");
        assert_eq!(v.grade_check(), AppropriatenessCheck::Inappropriate);
        assert_eq!(v.safety_check(), AppropriatenessCheck::Appropriate);
        assert_eq!(v.relevance_check(), RelevanceCheck::Mismatch);
    }

    #[test]
    fn json_shaped_reply() {
        let v = parse_verdict(
            r#"{"grade_check": "APPROPRIATE", "safety_check": "APPROPRIATE", "relevance_check": "MATCH", "reason": "Good fit."}"#,
        );
        assert!(v.passed(), "{v:?}");
        assert_eq!(v.reason, "Good fit.");
    }

    #[test]
    fn missing_axis_is_unknown_and_fails() {
        let v = parse_verdict("GRADE_CHECK: APPROPRIATE\nSAFETY_CHECK: APPROPRIATE");
        assert_eq!(v.relevance_check(), RelevanceCheck::Unknown);
        assert!(!v.passed());

        let v = parse_verdict("I cannot evaluate this.");
        assert_eq!(v.grade_check(), AppropriatenessCheck::Unknown);
        assert_eq!(
            v.reason,
            "Content validation failed: grade level, safety and relevance checks could not be determined"
        );
    }
}
