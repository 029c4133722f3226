//! Prompts for validation, generation and vision extraction.
//!
//! Every prompt lives here so that changing wording never touches the
//! call or parsing logic, and so tests can inspect them directly.
//!
//! The generation prompt asks for four blocks under fixed headers, in this
//! order: study notes, fill-in-the-blanks, match-the-following, subjective
//! questions. [`crate::pipeline::parse`] recognises those headers and the
//! usual ways models decorate them.

use crate::material::TargetMetadata;

/// Canonical header of the study-notes block.
pub const NOTES_HEADER: &str = "### STUDY NOTES:";
/// Canonical header of the fill-in-the-blanks block.
pub const FILL_IN_THE_BLANKS_HEADER: &str = "### FILL IN THE BLANKS:";
/// Canonical header of the match-the-following block.
pub const MATCH_THE_FOLLOWING_HEADER: &str = "### MATCH THE FOLLOWING:";
/// Canonical header of the subjective Q&A block.
pub const QUESTION_ANSWER_HEADER: &str = "### SUBJECTIVE QUESTIONS:";

/// Validation prompt over a bounded excerpt of the extracted text.
///
/// The reply format is one `KEY: LABEL` line per axis plus a reason, which
/// [`crate::pipeline::validate`] reads by keyword.
pub fn validation_prompt(excerpt: &str, target: &TargetMetadata) -> String {
    format!(
        r#"Analyze this educational content for three criteria:

1. GRADE LEVEL: Is this content appropriate for {standard} students?
2. SAFETY: Is this content safe and appropriate for school students?
3. RELEVANCE: Does this content relate to {subject} - {chapter}?

Content:
"""
{excerpt}
"""

Respond in this EXACT format and nothing else:
GRADE_CHECK: APPROPRIATE or INAPPROPRIATE
SAFETY_CHECK: APPROPRIATE or INAPPROPRIATE
RELEVANCE_CHECK: MATCH or MISMATCH
REASON: one sentence, at most 50 words. If all pass: "Content is appropriate, safe, and relevant.""#,
        standard = target.standard,
        subject = target.subject,
        chapter = target.chapter,
    )
}

/// Generation prompt over a bounded excerpt of the extracted text.
pub fn generation_prompt(
    excerpt: &str,
    target: &TargetMetadata,
    fill_in_blanks: usize,
    match_pairs: usize,
    questions: usize,
) -> String {
    let last_letter = (b'A' + match_pairs.clamp(1, 26) as u8 - 1) as char;
    format!(
        r#"Based on the following educational content, create study materials for {standard} students of {subject}, chapter "{chapter}".

Use ONLY the content provided below. Do not add information that is not present in the source material.

Content:
"""
{excerpt}
"""

Write exactly four sections, in this order, each starting with its header line exactly as shown.

{notes}
Detailed study notes covering the key concepts, in Markdown:
- **Bold** for important terms and definitions
- ## for main topics, ### for subtopics
- - for bullet points, 1. 2. 3. for steps or sequences
- *Italic* for emphasis and examples
- > for important notes or warnings

{fill}
{fill_in_blanks} numbered sentences, each with one blank written as _____.
1. <sentence with _____>
...
ANSWERS:
1. <missing word>
...

{matching}
Column A:
1. <term>
...
Column B:
A. <definition>
... (letters A to {last_letter}, shuffled relative to Column A)
ANSWERS:
1-<letter>, 2-<letter>, ...

{qa}
{questions} thoughtful questions with complete answers.
Q1: <question>
...
ANSWERS:
Q1: <answer>
...

Every section must contain real content from the material. Do not wrap the output in code fences."#,
        standard = target.standard,
        subject = target.subject,
        chapter = target.chapter,
        notes = NOTES_HEADER,
        fill = FILL_IN_THE_BLANKS_HEADER,
        matching = MATCH_THE_FOLLOWING_HEADER,
        qa = QUESTION_ANSWER_HEADER,
    )
}

/// System prompt for describing uploaded photos of pages.
pub const VISION_SYSTEM_PROMPT: &str = "You are an educational content extractor. \
Extract and describe only the actual content present in the images.";

/// User instruction sent alongside the uploaded photos.
pub const VISION_USER_PROMPT: &str = "Extract all educational content from these images. \
Describe exactly what you see: text, diagrams, concepts, topics. \
Do not generate new content, only describe what is actually present in the images.";

/// System prompt for transcribing a rendered PDF page.
pub const PAGE_TRANSCRIPTION_PROMPT: &str = r#"You are an expert document transcriber. Convert this page of a school textbook or worksheet into clean Markdown.

1. Preserve ALL text in reading order; correct obvious OCR-like errors only when certain.
2. Use ## and ### for headings, - and 1. for lists, **bold** for emphasis shown on the page.
3. Convert tables to GFM pipe tables.
4. Describe diagrams and figures in one italic sentence, e.g. *Diagram: parts of a flower*.
5. Ignore page numbers, running headers and footers, and decorative borders.
6. Output ONLY the Markdown. Do NOT wrap it in code fences and do NOT add commentary."#;

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TargetMetadata {
        TargetMetadata::new("Class 5", "Science", "Plants")
    }

    #[test]
    fn validation_prompt_names_all_axes() {
        let p = validation_prompt("Leaves make food.", &target());
        for key in ["GRADE_CHECK", "SAFETY_CHECK", "RELEVANCE_CHECK", "REASON"] {
            assert!(p.contains(key), "missing {key}");
        }
        assert!(p.contains("Class 5"));
        assert!(p.contains("Science - Plants"));
        assert!(p.contains("Leaves make food."));
    }

    #[test]
    fn generation_prompt_lists_headers_in_order() {
        let p = generation_prompt("text", &target(), 5, 5, 3);
        let positions: Vec<usize> = [
            NOTES_HEADER,
            FILL_IN_THE_BLANKS_HEADER,
            MATCH_THE_FOLLOWING_HEADER,
            QUESTION_ANSWER_HEADER,
        ]
        .iter()
        .map(|h| p.find(h).unwrap_or(usize::MAX))
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
        assert!(p.contains("letters A to E"));
    }

    #[test]
    fn generation_prompt_respects_caps() {
        let p = generation_prompt("text", &target(), 4, 3, 2);
        assert!(p.contains("4 numbered sentences"));
        assert!(p.contains("letters A to C"));
        assert!(p.contains("2 thoughtful questions"));
    }
}
