//! Response parsing: free-form generation text → [`GeneratedArtifact`].
//!
//! ## Grammar
//!
//! The reply is split into sections at header lines. A header is a short
//! line naming one of the four blocks, in any case, optionally decorated
//! with `#`, `**`, `_`, `>`, a leading ordinal (`2.`, `II)`), a trailing
//! colon, or trailing words such as "Exercises" or "with Answers". Text
//! before the first header is ignored, as are `=====` rule lines.
//!
//! Inside a section:
//!
//! * **Study notes** are kept verbatim.
//! * **Fill-in-the-blanks** and **subjective questions** are numbered items
//!   (`1.`, `Q1:`, `**Question 1:**`). Answers come either inline
//!   (`Answer: …`, `A1: …`) or as numbered items after an `ANSWERS:` line.
//! * **Match-the-following** has a numbered `Column A`, a lettered
//!   `Column B` and `1-C, 2-A` style answer pairs. Lists may be one per line,
//!   run together on one line, or laid out as a pipe table.
//!
//! ## Recovery
//!
//! Only the notes block is mandatory. Any other block that is missing or
//! garbled comes back empty or partial, never padded. Items are kept only
//! when their number is within the configured cap, the first occurrence of a
//! number wins, answers without a matching question are dropped, and match
//! answers must point at an existing term and an existing definition.
//!
//! Replies that ignore the format and send the JSON shape of
//! [`GeneratedArtifact`] are accepted too, under the same invariants.

use crate::config::WorkflowConfig;
use crate::output::{FillInTheBlanks, GeneratedArtifact, MatchTheFollowing, QuestionAnswer};
use crate::pipeline::postprocess::{self, is_separator_row, is_table_row};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Why a reply could not be turned into an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no study-notes section found in the generated text")]
    MissingNotes,
    #[error("the study-notes section is empty")]
    EmptyNotes,
}

/// Item caps per exercise block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    pub fill_in_blanks: usize,
    pub match_pairs: usize,
    pub questions: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            fill_in_blanks: 5,
            match_pairs: 5,
            questions: 3,
        }
    }
}

impl From<&WorkflowConfig> for ParseLimits {
    fn from(c: &WorkflowConfig) -> Self {
        Self {
            fill_in_blanks: c.max_fill_in_blanks,
            match_pairs: c.max_match_pairs.min(26),
            questions: c.max_questions,
        }
    }
}

/// Turns generation replies into structured artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser {
    limits: ParseLimits,
}

impl ResponseParser {
    pub fn new(limits: ParseLimits) -> Self {
        Self { limits }
    }

    /// Parse one reply. Pure: the same input always yields the same output.
    pub fn parse(&self, raw: &str) -> Result<GeneratedArtifact, ParseError> {
        let text = postprocess::normalise_response(raw);

        if let Some(artifact) = self.parse_json(&text) {
            debug!("Parsed generation reply as JSON");
            return artifact;
        }

        let sections = split_sections(&text);
        let notes = sections
            .get(&Section::Notes)
            .ok_or(ParseError::MissingNotes)?
            .trim()
            .to_string();
        if notes.is_empty() {
            return Err(ParseError::EmptyNotes);
        }

        let body = |s: Section| sections.get(&s).map(String::as_str).unwrap_or("");

        let fill = NumberedItems::scan(body(Section::FillInTheBlanks));
        let (questions, answers) = fill.finish(self.limits.fill_in_blanks, |n| n.to_string());

        let qa = NumberedItems::scan(body(Section::QuestionAnswer));
        let (qa_questions, qa_answers) = qa.finish(self.limits.questions, |n| format!("Q{n}"));

        let matching = MatchItems::scan(body(Section::MatchTheFollowing));

        let artifact = GeneratedArtifact {
            important_notes: notes,
            fill_in_the_blanks: FillInTheBlanks { questions, answers },
            match_the_following: matching.finish(self.limits.match_pairs),
            question_answer: QuestionAnswer {
                questions: qa_questions,
                answers: qa_answers,
            },
        };
        debug!(
            "Parsed reply: {} blanks, {} match pairs, {} questions",
            artifact.fill_in_the_blanks.questions.len(),
            artifact.match_the_following.answers.len(),
            artifact.question_answer.questions.len()
        );
        Ok(artifact)
    }

    /// `None` when the reply is not a JSON object with an `importantNotes` key.
    fn parse_json(&self, text: &str) -> Option<Result<GeneratedArtifact, ParseError>> {
        if !text.starts_with('{') {
            return None;
        }
        let value: serde_json::Value = serde_json::from_str(text).ok()?;
        let root = value.as_object()?;
        let notes = root.get("importantNotes")?;
        let notes = notes.as_str().unwrap_or("").trim().to_string();
        if notes.is_empty() {
            return Some(Err(ParseError::EmptyNotes));
        }

        let numbered = |v: Option<&serde_json::Value>| -> Vec<(u32, String)> {
            json_entries(v)
                .into_iter()
                .filter_map(|(k, text)| {
                    let n = k.trim_start_matches(['Q', 'q', 'A', 'a']).parse().ok()?;
                    Some((n, text))
                })
                .collect()
        };

        let mut fill = NumberedItems::default();
        let block = root.get("fillInTheBlanks");
        fill.questions = numbered(block.and_then(|b| b.get("questions")));
        fill.answers = numbered(block.and_then(|b| b.get("answers")));

        let mut qa = NumberedItems::default();
        let block = root.get("questionAnswer");
        qa.questions = numbered(block.and_then(|b| b.get("questions")));
        qa.answers = numbered(block.and_then(|b| b.get("answers")));

        let mut matching = MatchItems::default();
        let block = root.get("matchTheFollowing");
        matching.column_a = numbered(block.and_then(|b| b.get("column_a")));
        matching.column_b = json_entries(block.and_then(|b| b.get("column_b")))
            .into_iter()
            .filter_map(|(k, text)| Some((single_letter(&k)?, text)))
            .collect();
        matching.pairs = json_entries(block.and_then(|b| b.get("answers")))
            .into_iter()
            .filter_map(|(k, v)| Some((k.parse().ok()?, single_letter(&v)?)))
            .collect();

        let (questions, answers) = fill.finish(self.limits.fill_in_blanks, |n| n.to_string());
        let (qa_questions, qa_answers) = qa.finish(self.limits.questions, |n| format!("Q{n}"));

        Some(Ok(GeneratedArtifact {
            important_notes: notes,
            fill_in_the_blanks: FillInTheBlanks { questions, answers },
            match_the_following: matching.finish(self.limits.match_pairs),
            question_answer: QuestionAnswer {
                questions: qa_questions,
                answers: qa_answers,
            },
        }))
    }
}

fn json_entries(value: Option<&serde_json::Value>) -> Vec<(String, String)> {
    let Some(map) = value.and_then(|v| v.as_object()) else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(k, v)| Some((k.trim().to_string(), v.as_str()?.trim().to_string())))
        .collect()
}

fn single_letter(s: &str) -> Option<char> {
    let mut chars = s.trim().chars().filter(|c| !matches!(c, '(' | ')' | '.'));
    let c = chars.next()?;
    (chars.next().is_none() && c.is_ascii_alphabetic()).then(|| c.to_ascii_uppercase())
}

// ── Sections ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Section {
    Notes,
    FillInTheBlanks,
    MatchTheFollowing,
    QuestionAnswer,
}

const HEADER_NAMES: &[(&str, Section)] = &[
    ("STUDY NOTES", Section::Notes),
    ("NOTES", Section::Notes),
    ("IMPORTANT NOTES", Section::Notes),
    ("IMPORTANTNOTES", Section::Notes),
    ("KEY NOTES", Section::Notes),
    ("REVISION NOTES", Section::Notes),
    ("COMPREHENSIVE STUDY NOTES", Section::Notes),
    ("FILL IN THE BLANKS", Section::FillInTheBlanks),
    ("FILL IN THE BLANK", Section::FillInTheBlanks),
    ("FILL IN BLANKS", Section::FillInTheBlanks),
    ("FILLINTHEBLANKS", Section::FillInTheBlanks),
    ("FILL UPS", Section::FillInTheBlanks),
    ("MATCH THE FOLLOWING", Section::MatchTheFollowing),
    ("MATCHTHEFOLLOWING", Section::MatchTheFollowing),
    ("MATCH THE COLUMNS", Section::MatchTheFollowing),
    ("MATCH THE COLUMN", Section::MatchTheFollowing),
    ("SUBJECTIVE QUESTIONS", Section::QuestionAnswer),
    ("SUBJECTIVE QUESTIONS AND ANSWERS", Section::QuestionAnswer),
    ("SUBJECTIVE QUESTIONS ANSWERS", Section::QuestionAnswer),
    ("QUESTION ANSWER", Section::QuestionAnswer),
    ("QUESTIONANSWER", Section::QuestionAnswer),
    ("QUESTION AND ANSWER", Section::QuestionAnswer),
    ("QUESTIONS AND ANSWERS", Section::QuestionAnswer),
    ("QUESTIONS ANSWERS", Section::QuestionAnswer),
    ("SHORT ANSWER QUESTIONS", Section::QuestionAnswer),
    ("Q A", Section::QuestionAnswer),
];

static RE_LEADING_ORDINAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:section|part)\s+)?(?:\d{1,2}|[ivx]{1,4})\s*[.):\-]\s*")
        .expect("valid ordinal regex")
});

/// Recognise a section header, returning the section and any text after
/// the colon on the same line. Answer-key headers come back with that text
/// behind an `ANSWERS:` label.
fn detect_header(line: &str) -> Option<(Section, String)> {
    let lead = line.trim_start();
    if ["- ", "* ", "• "].iter().any(|b| lead.starts_with(b)) {
        return None;
    }
    let t = line
        .trim()
        .trim_start_matches(|c: char| matches!(c, '#' | '*' | '_' | '>' | '=') || c.is_whitespace());
    if t.is_empty() {
        return None;
    }
    let t = RE_LEADING_ORDINAL.replace(t, "");

    let (head, rest) = match t.find(':') {
        Some(i) => (&t[..i], &t[i + 1..]),
        None => (&t[..], ""),
    };

    let words: Vec<String> = head
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if words.is_empty() || words.len() > 7 {
        return None;
    }

    let (section, answer_key) = known_name(&words)?;

    let rest = rest
        .trim()
        .trim_matches(|c: char| c == '*' || c == '_')
        .trim();
    if answer_key {
        return Some((section, format!("ANSWERS: {rest}").trim_end().to_string()));
    }
    Some((section, rest.to_string()))
}

/// Trailing words that may follow a block name in a header. The flag marks
/// an answer key: `Fill in the Blanks Answers:` opens that block's answers.
const HEADER_FILLERS: &[(&[&str], bool)] = &[
    (&["WITH", "ANSWERS"], false),
    (&["WITH", "ANSWER", "KEY"], false),
    (&["WITH", "SOLUTIONS"], false),
    (&["AND", "ANSWERS"], false),
    (&["AND", "SOLUTIONS"], false),
    (&["ANSWER", "KEY"], true),
    (&["ANSWERS"], true),
    (&["EXERCISES"], false),
    (&["EXERCISE"], false),
    (&["SECTION"], false),
];

/// Match a header's words against the known block names, peeling filler
/// words off the end until one matches. Returns the section and whether
/// the header introduces an answer key.
fn known_name(words: &[String]) -> Option<(Section, bool)> {
    let mut words = words;
    let mut answer_key = false;
    loop {
        let name = words.join(" ");
        if let Some((_, section)) = HEADER_NAMES.iter().find(|(n, _)| *n == name) {
            return Some((*section, answer_key));
        }
        let (filler, key) = HEADER_FILLERS.iter().find(|(f, _)| {
            f.len() < words.len()
                && words[words.len() - f.len()..]
                    .iter()
                    .zip(f.iter())
                    .all(|(w, f)| w == f)
        })?;
        answer_key |= *key;
        words = &words[..words.len() - filler.len()];
    }
}

fn is_rule_line(line: &str) -> bool {
    let t = line.trim();
    t.len() >= 3 && (t.chars().all(|c| c == '=') || t.chars().all(|c| c == '-') || t.chars().all(|c| c == '*'))
}

/// Split the reply into section bodies.
///
/// A header naming the section already being read is kept as content, so a
/// `## Notes` sub-heading inside the notes stays where it was.
fn split_sections(text: &str) -> BTreeMap<Section, String> {
    let mut sections: BTreeMap<Section, Vec<String>> = BTreeMap::new();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        if line.trim_start().starts_with('=') && is_rule_line(line) {
            continue;
        }
        match detect_header(line) {
            Some((section, rest)) if Some(section) == current => {
                let line = if rest.starts_with("ANSWERS:") {
                    rest
                } else {
                    line.to_string()
                };
                sections.entry(section).or_default().push(line);
            }
            Some((section, rest)) => {
                current = Some(section);
                let body = sections.entry(section).or_default();
                if !rest.is_empty() {
                    body.push(rest);
                }
            }
            None => {
                if let Some(section) = current {
                    sections.entry(section).or_default().push(line.to_string());
                }
            }
        }
    }

    sections
        .into_iter()
        .map(|(section, mut lines)| {
            while lines.last().is_some_and(|l| l.trim().is_empty() || is_rule_line(l)) {
                lines.pop();
            }
            (section, lines.join("\n"))
        })
        .collect()
}

// ── Shared item patterns ─────────────────────────────────────────────────

static RE_NUMBERED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:[-•]\s+)?[*_]*\s*(?P<prefix>question|q|answer|ans|a)?\s*\.?\s*(?P<num>\d{1,2})\s*[*_]*\s*[.):\-]\s*[*_]*\s*(?P<body>.*)$",
    )
    .expect("valid numbered-item regex")
});

static RE_INLINE_ANSWER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:[-•]\s+)?[*_]*\s*(?:answer|ans)\s*[*_]*\s*[:\-]\s*[*_]*\s*(?P<body>.+)$")
        .expect("valid inline-answer regex")
});

static RE_ANSWERS_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*[#*_>\s]*(?P<word>answers|answer\s+key|answer|key)\s*[*_]*\s*(?::\s*[*_]*\s*(?P<rest>.*))?$")
        .expect("valid answers-marker regex")
});

static RE_TRAILING_ANSWER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+[*_]*(?:a|ans|answer)\s*(?P<num>\d{1,2})\s*[*_]*\s*:\s*[*_]*\s*")
        .expect("valid trailing-answer regex")
});

/// `Some(rest)` when the line opens an answers sub-block.
///
/// `Answer: photosynthesis` is an inline answer, not a marker; the singular
/// form only counts when nothing follows the colon.
fn answers_marker(line: &str) -> Option<String> {
    let caps = RE_ANSWERS_MARKER.captures(line)?;
    let word = caps["word"].to_ascii_lowercase();
    let rest = caps
        .name("rest")
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    if (word == "answer" || word == "key") && !rest.is_empty() {
        return None;
    }
    Some(rest)
}

fn clean_item(s: &str) -> String {
    let t = s.trim();
    let t = t
        .strip_prefix("**")
        .and_then(|x| x.strip_suffix("**"))
        .unwrap_or(t);
    t.trim().to_string()
}

fn push_first<K: PartialEq + Copy>(items: &mut Vec<(K, String)>, key: K, text: String) -> bool {
    if items.iter().any(|(k, _)| *k == key) {
        return false;
    }
    items.push((key, text));
    true
}

fn append_to<K: PartialEq + Copy>(items: &mut [(K, String)], key: K, more: &str) {
    if let Some((_, text)) = items.iter_mut().find(|(k, _)| *k == key) {
        if text.is_empty() {
            *text = more.to_string();
        } else {
            text.push(' ');
            text.push_str(more);
        }
    }
}

// ── Numbered question/answer blocks ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Continuation {
    Question(u32),
    Answer(u32),
}

/// Raw numbered questions and answers in order of appearance.
#[derive(Debug, Default)]
struct NumberedItems {
    questions: Vec<(u32, String)>,
    answers: Vec<(u32, String)>,
}

impl NumberedItems {
    fn scan(body: &str) -> Self {
        let mut items = Self::default();
        let mut in_answers = false;
        let mut last_question: Option<u32> = None;
        let mut continuation: Option<Continuation> = None;

        for line in body.lines() {
            let t = line.trim();
            if t.is_empty() {
                continuation = None;
                continue;
            }

            if let Some(rest) = answers_marker(t) {
                in_answers = true;
                continuation = None;
                if !rest.is_empty() {
                    items.scan_answer_line(&rest, &mut continuation);
                }
                continue;
            }

            if in_answers {
                if !items.scan_answer_line(t, &mut continuation) {
                    if let Some(Continuation::Answer(n)) = continuation {
                        append_to(&mut items.answers, n, t);
                    }
                }
                continue;
            }

            if let Some(caps) = RE_INLINE_ANSWER.captures(t) {
                if let Some(n) = last_question {
                    push_first(&mut items.answers, n, clean_item(&caps["body"]));
                    continuation = Some(Continuation::Answer(n));
                }
                continue;
            }

            if let Some(caps) = RE_NUMBERED.captures(t) {
                let Ok(n) = caps["num"].parse::<u32>() else {
                    continue;
                };
                let is_answer = caps
                    .name("prefix")
                    .is_some_and(|p| p.as_str().to_ascii_lowercase().starts_with('a'));
                let body = &caps["body"];
                if is_answer {
                    push_first(&mut items.answers, n, clean_item(body));
                    continuation = Some(Continuation::Answer(n));
                    continue;
                }

                // `Q1: question A1: answer` on one line.
                let (question, inline_answer) = match RE_TRAILING_ANSWER.captures(body) {
                    Some(c) if c["num"].parse::<u32>() == Ok(n) => {
                        let m = c.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
                        (&body[..m.0], Some(&body[m.1..]))
                    }
                    _ => (body, None),
                };
                push_first(&mut items.questions, n, clean_item(question));
                last_question = Some(n);
                continuation = Some(Continuation::Question(n));
                if let Some(answer) = inline_answer {
                    push_first(&mut items.answers, n, clean_item(answer));
                    continuation = Some(Continuation::Answer(n));
                }
                continue;
            }

            match continuation {
                Some(Continuation::Question(n)) => append_to(&mut items.questions, n, t),
                Some(Continuation::Answer(n)) => append_to(&mut items.answers, n, t),
                None => {}
            }
        }

        items
    }

    /// Returns `true` when the line was a numbered answer.
    fn scan_answer_line(&mut self, line: &str, continuation: &mut Option<Continuation>) -> bool {
        let Some(caps) = RE_NUMBERED.captures(line) else {
            return false;
        };
        let Ok(n) = caps["num"].parse::<u32>() else {
            return false;
        };
        push_first(&mut self.answers, n, clean_item(&caps["body"]));
        *continuation = Some(Continuation::Answer(n));
        true
    }

    /// Apply the cap and the key-subset rule, then key the maps.
    fn finish(
        self,
        cap: usize,
        key: impl Fn(u32) -> String,
    ) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
        let in_range = |n: u32| n >= 1 && (n as usize) <= cap;

        let questions: BTreeMap<u32, String> = self
            .questions
            .into_iter()
            .filter(|(n, text)| in_range(*n) && !text.is_empty())
            .collect();
        let answers: BTreeMap<u32, String> = self
            .answers
            .into_iter()
            .filter(|(n, text)| questions.contains_key(n) && !text.is_empty())
            .collect();

        (
            questions.into_iter().map(|(n, t)| (key(n), t)).collect(),
            answers.into_iter().map(|(n, t)| (key(n), t)).collect(),
        )
    }
}

// ── Match the following ──────────────────────────────────────────────────

static RE_NUMBER_MARK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)[*_]*(\d{1,2})[*_]*[.)][*_]*\s+").expect("valid number-mark regex")
});

static RE_LETTER_MARK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)[*_]*\(?([A-Za-z])[*_]*[.)][*_]*\s+").expect("valid letter-mark regex")
});

static RE_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})\s*(?:[-–—:=>→)]|\s)+\s*\(?([A-Za-z])\b").expect("valid pair regex")
});

/// `1. B` or `2) (A)`, read only under an answers label.
static RE_LISTED_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[\s,;*_])(\d{1,2})\s*[.)]\s*\(?([A-Za-z])(?:\)|\b)")
        .expect("valid listed-pair regex")
});

static RE_PAIR_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\s*_-]*(?:\d{1,2}\s*(?:[-–—:=>→)]|\s)+\s*\(?[A-Za-z]\)?[\s,;.*_]*)+$")
        .expect("valid pair-line regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchPart {
    Unlabelled,
    ColumnA,
    ColumnB,
    Answers,
}

#[derive(Debug, Default)]
struct MatchItems {
    column_a: Vec<(u32, String)>,
    column_b: Vec<(char, String)>,
    pairs: Vec<(u32, char)>,
}

/// Split `"1. Root 2. Stem 3. Leaf"` into its items.
///
/// The first mark must open the line; later marks only split when they
/// continue the sequence and `opens_item` accepts the text around them.
fn split_enumerated<K: Copy>(
    line: &str,
    mark: &Regex,
    parse: impl Fn(&str) -> Option<K>,
    follows: impl Fn(K, K) -> bool,
    opens_item: impl Fn(&str, &str) -> bool,
) -> Vec<(K, String)> {
    let mut marks: Vec<(K, usize, usize)> = Vec::new();
    for caps in mark.captures_iter(line) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(k) = parse(key.as_str()) else {
            continue;
        };
        let accept = match marks.last() {
            None => line[..whole.start()]
                .trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '•' | '*' | '_'))
                .is_empty(),
            Some((prev, _, _)) => {
                follows(*prev, k) && opens_item(&line[..whole.start()], &line[whole.end()..])
            }
        };
        if accept {
            marks.push((k, whole.start(), whole.end()));
        }
    }

    marks
        .iter()
        .enumerate()
        .map(|(i, (k, _, body_start))| {
            let end = marks.get(i + 1).map(|(_, s, _)| *s).unwrap_or(line.len());
            (*k, clean_item(line[*body_start..end].trim_end().trim_end_matches([',', ';'])))
        })
        .filter(|(_, text)| !text.is_empty())
        .collect()
}

fn numbered_items(line: &str) -> Vec<(u32, String)> {
    split_enumerated(
        line,
        &RE_NUMBER_MARK,
        |s| s.parse().ok(),
        |p, k| k == p + 1,
        |_, _| true,
    )
}

/// A later letter mark starts a new definition only after a list boundary
/// (`,` `;` `|` or a run of spaces) or when the text after it is capitalised:
/// `B. Lack of vitamin C. causes scurvy` stays one definition.
fn lettered_items(line: &str) -> Vec<(char, String)> {
    split_enumerated(
        line,
        &RE_LETTER_MARK,
        |s| s.chars().next().map(|c| c.to_ascii_uppercase()),
        |p, k| k as u32 == p as u32 + 1,
        |before, after| {
            before.ends_with(char::is_whitespace)
                || before.trim_end().ends_with([',', ';', '|'])
                || after
                    .trim_start_matches(|c: char| matches!(c, '*' | '_' | '"' | '\''))
                    .starts_with(|c: char| c.is_uppercase() || c.is_ascii_digit())
        },
    )
}

fn column_marker(line: &str) -> Option<(MatchPart, String)> {
    let t = line
        .trim()
        .trim_start_matches(|c: char| matches!(c, '#' | '*' | '_' | '>') || c.is_whitespace());
    let (head, rest) = match t.find(':') {
        Some(i) => (&t[..i], t[i + 1..].trim()),
        None => (t, ""),
    };
    let head: String = head
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    let head = head.split_whitespace().collect::<Vec<_>>().join(" ");
    let part = match head.as_str() {
        "COLUMN A" | "COLUMN I" | "COLUMN 1" | "TERMS" => MatchPart::ColumnA,
        "COLUMN B" | "COLUMN II" | "COLUMN 2" | "DEFINITIONS" => MatchPart::ColumnB,
        _ => return None,
    };
    let rest = rest.trim_matches(|c: char| c == '*' || c == '_').trim().to_string();
    Some((part, rest))
}

impl MatchItems {
    fn scan(body: &str) -> Self {
        let mut items = Self::default();
        let mut part = MatchPart::Unlabelled;

        for line in body.lines() {
            let t = line.trim();
            if t.is_empty() {
                continue;
            }

            if is_table_row(t) {
                if !is_separator_row(t) {
                    items.scan_table_row(t);
                }
                continue;
            }

            let content = if let Some((p, rest)) = column_marker(t) {
                part = p;
                rest
            } else if let Some(rest) = answers_marker(t) {
                part = MatchPart::Answers;
                rest
            } else {
                t.to_string()
            };
            if content.is_empty() {
                continue;
            }

            if part == MatchPart::Answers {
                items.scan_pairs(&content);
                items.scan_listed_pairs(&content);
                continue;
            }
            if RE_PAIR_LINE.is_match(&content) {
                items.scan_pairs(&content);
                continue;
            }

            let numbered = numbered_items(&content);
            if !numbered.is_empty() && part != MatchPart::ColumnB {
                for (n, text) in numbered {
                    push_first(&mut items.column_a, n, text);
                }
                continue;
            }
            for (c, text) in lettered_items(&content) {
                push_first(&mut items.column_b, c, text);
            }
        }

        items
    }

    fn scan_pairs(&mut self, line: &str) {
        for caps in RE_PAIR.captures_iter(line) {
            let (Ok(n), Some(c)) = (caps[1].parse::<u32>(), caps[2].chars().next()) else {
                continue;
            };
            let c = c.to_ascii_uppercase();
            if !self.pairs.iter().any(|(k, _)| *k == n) {
                self.pairs.push((n, c));
            }
        }
    }

    fn scan_listed_pairs(&mut self, line: &str) {
        for caps in RE_LISTED_PAIR.captures_iter(line) {
            let (Ok(n), Some(c)) = (caps[1].parse::<u32>(), caps[2].chars().next()) else {
                continue;
            };
            if !self.pairs.iter().any(|(k, _)| *k == n) {
                self.pairs.push((n, c.to_ascii_uppercase()));
            }
        }
    }

    /// `| 1. Root | A. Absorbs water |` or `| 1 | Root | A | Absorbs water |`.
    fn scan_table_row(&mut self, row: &str) {
        let cells: Vec<&str> = row
            .trim()
            .trim_matches('|')
            .split('|')
            .map(str::trim)
            .collect();

        if cells.len() >= 4 {
            if let (Ok(n), Some(c)) = (cells[0].trim_end_matches('.').parse::<u32>(), single_letter(cells[2])) {
                push_first(&mut self.column_a, n, clean_item(cells[1]));
                push_first(&mut self.column_b, c, clean_item(cells[3]));
                return;
            }
        }
        if cells.len() >= 2 {
            if let Some((n, text)) = numbered_items(cells[0]).into_iter().next() {
                push_first(&mut self.column_a, n, text);
            }
            if let Some((c, text)) = lettered_items(cells[1]).into_iter().next() {
                push_first(&mut self.column_b, c, text);
            }
        }
    }

    /// Apply the cap to both columns and drop dangling answer pairs.
    fn finish(self, cap: usize) -> MatchTheFollowing {
        let cap = cap.min(26);
        let column_a: BTreeMap<u32, String> = self
            .column_a
            .into_iter()
            .filter(|(n, _)| *n >= 1 && (*n as usize) <= cap)
            .collect();
        let column_b: BTreeMap<char, String> = self
            .column_b
            .into_iter()
            .filter(|(c, _)| c.is_ascii_uppercase() && ((*c as u8 - b'A') as usize) < cap)
            .collect();
        let answers: BTreeMap<u32, char> = self
            .pairs
            .into_iter()
            .filter(|(n, c)| column_a.contains_key(n) && column_b.contains_key(c))
            .collect();

        MatchTheFollowing {
            column_a: column_a.into_iter().map(|(n, t)| (n.to_string(), t)).collect(),
            column_b: column_b.into_iter().map(|(c, t)| (c.to_string(), t)).collect(),
            answers: answers
                .into_iter()
                .map(|(n, c)| (n.to_string(), c.to_string()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = "\
### STUDY NOTES:
## Plants
- **Roots** absorb water.
- **Leaves** make food by *photosynthesis*.

### FILL IN THE BLANKS:
1. Roots absorb _____ from the soil.
2. Leaves make food by _____.
3. The green pigment is _____.
ANSWERS:
1. water
2. photosynthesis
3. chlorophyll

### MATCH THE FOLLOWING:
Column A:
1. Root
2. Leaf
3. Stem
Column B:
A. Makes food
B. Carries water up
C. Absorbs water
ANSWERS:
1-C, 2-A, 3-B

### SUBJECTIVE QUESTIONS:
Q1: Why are leaves green?
Q2: What do roots do?
ANSWERS:
Q1: Because of chlorophyll.
Q2: They absorb water and anchor the plant.
";

    fn parser() -> ResponseParser {
        ResponseParser::default()
    }

    #[test]
    fn parses_all_four_sections() {
        let a = parser().parse(WELL_FORMED).unwrap();
        assert!(a.important_notes.starts_with("## Plants"));
        assert!(a.important_notes.contains("*photosynthesis*"));
        assert_eq!(a.fill_in_the_blanks.questions.len(), 3);
        assert_eq!(a.fill_in_the_blanks.answers["2"], "photosynthesis");
        assert_eq!(a.match_the_following.column_a["3"], "Stem");
        assert_eq!(a.match_the_following.column_b["B"], "Carries water up");
        assert_eq!(a.match_the_following.answers["1"], "C");
        assert_eq!(a.question_answer.questions["Q1"], "Why are leaves green?");
        assert_eq!(a.question_answer.answers["Q2"], "They absorb water and anchor the plant.");
    }

    #[test]
    fn parsing_is_idempotent() {
        assert_eq!(parser().parse(WELL_FORMED), parser().parse(WELL_FORMED));
    }

    #[test]
    fn notes_keep_blank_lines_and_subheadings() {
        let raw = "**Study Notes:**\n## Notes on roots\n\nRoots grow down.\n\n### Fill-in-the-Blanks\n1. a ___\nANSWERS:\n1. b";
        let a = parser().parse(raw).unwrap();
        assert_eq!(a.important_notes, "## Notes on roots\n\nRoots grow down.");
    }

    #[test]
    fn header_variants_recognised() {
        for h in [
            "### STUDY NOTES:",
            "**Study Notes**",
            "## 1. Study Notes",
            "IMPORTANT NOTES:",
            "> Notes",
            "=== STUDY NOTES ===",
        ] {
            assert_eq!(
                detect_header(h).map(|(s, _)| s),
                Some(Section::Notes),
                "{h}"
            );
        }
        assert_eq!(
            detect_header("#### Fill-in-the-Blank Exercises:").map(|(s, _)| s),
            Some(Section::FillInTheBlanks)
        );
        assert_eq!(
            detect_header("**MATCH THE FOLLOWING:**").map(|(s, _)| s),
            Some(Section::MatchTheFollowing)
        );
        assert_eq!(
            detect_header("4) Q&A").map(|(s, _)| s),
            Some(Section::QuestionAnswer)
        );
        assert_eq!(detect_header("Roots take in water and notes"), None);
        assert_eq!(detect_header("ANSWERS:"), None);
    }

    #[test]
    fn header_with_trailing_filler_words() {
        for (h, want) in [
            ("### SUBJECTIVE QUESTIONS WITH ANSWERS:", Section::QuestionAnswer),
            ("**Questions and Answers**", Section::QuestionAnswer),
            ("## Match the Following Exercise", Section::MatchTheFollowing),
            ("Fill in the Blanks with Answer Key:", Section::FillInTheBlanks),
        ] {
            assert_eq!(detect_header(h).map(|(s, _)| s), Some(want), "{h}");
        }
        assert_eq!(detect_header("WITH ANSWERS:"), None);
        assert_eq!(detect_header("Answer Key:"), None);
    }

    #[test]
    fn answer_key_header_opens_answers() {
        let (s, rest) = detect_header("### Fill in the Blanks Answers:").unwrap();
        assert_eq!(s, Section::FillInTheBlanks);
        assert_eq!(rest, "ANSWERS:");
    }

    #[test]
    fn qa_block_with_answers_suffix_is_its_own_section() {
        let raw = "### STUDY NOTES:\nn\n\n### MATCH THE FOLLOWING:\nColumn A:\n1. Root\nColumn B:\nA. Absorbs water\nANSWERS:\n1-A\n\n### SUBJECTIVE QUESTIONS WITH ANSWERS:\nQ1: What do roots do?\nA1: They absorb water.\nQ2: Why are leaves green?\nA2: A root does not make them green; chlorophyll does.";
        let a = parser().parse(raw).unwrap();
        assert_eq!(a.question_answer.questions.len(), 2);
        assert_eq!(a.question_answer.answers["Q1"], "They absorb water.");
        assert_eq!(a.match_the_following.answers.len(), 1);
        assert_eq!(a.match_the_following.answers["1"], "A");
    }

    #[test]
    fn answer_keys_collected_at_the_end() {
        let raw = "### STUDY NOTES:\nn\n### FILL IN THE BLANKS:\n1. Roots absorb _____.\n2. Leaves are _____.\n### SUBJECTIVE QUESTIONS:\nQ1: Why?\n### Fill in the Blanks Answers:\n1. water\n2. green";
        let a = parser().parse(raw).unwrap();
        assert_eq!(a.fill_in_the_blanks.questions["1"], "Roots absorb _____.");
        assert_eq!(a.fill_in_the_blanks.answers["1"], "water");
        assert_eq!(a.fill_in_the_blanks.answers["2"], "green");
        assert_eq!(a.question_answer.questions.len(), 1);
    }

    #[test]
    fn header_with_inline_content() {
        let (s, rest) = detect_header("STUDY NOTES: Plants need sunlight.").unwrap();
        assert_eq!(s, Section::Notes);
        assert_eq!(rest, "Plants need sunlight.");
    }

    #[test]
    fn missing_notes_fails() {
        let raw = "### FILL IN THE BLANKS:\n1. x ___\nANSWERS:\n1. y";
        assert_eq!(parser().parse(raw), Err(ParseError::MissingNotes));
        assert_eq!(parser().parse("Sorry, I cannot help."), Err(ParseError::MissingNotes));
    }

    #[test]
    fn empty_notes_fails() {
        let raw = "### STUDY NOTES:\n\n### SUBJECTIVE QUESTIONS:\nQ1: Why?";
        assert_eq!(parser().parse(raw), Err(ParseError::EmptyNotes));
    }

    #[test]
    fn only_notes_is_enough() {
        let a = parser().parse("STUDY NOTES:\nPlants are alive.").unwrap();
        assert_eq!(a.important_notes, "Plants are alive.");
        assert!(a.fill_in_the_blanks.questions.is_empty());
        assert!(a.match_the_following.is_empty());
        assert!(a.question_answer.questions.is_empty());
    }

    #[test]
    fn fill_blanks_inline_answer_format() {
        let raw = "STUDY NOTES:\nn\nFILL IN THE BLANKS:\n1. Roots absorb _____.\n   Answer: water\n2. Leaves are _____.\n   **Answer:** green";
        let a = parser().parse(raw).unwrap();
        assert_eq!(a.fill_in_the_blanks.answers["1"], "water");
        assert_eq!(a.fill_in_the_blanks.answers["2"], "green");
    }

    #[test]
    fn fill_blanks_capped_and_not_padded() {
        let mut raw = String::from("STUDY NOTES:\nn\nFILL IN THE BLANKS:\n");
        for i in 1..=7 {
            raw.push_str(&format!("{i}. sentence {i} _____\n"));
        }
        raw.push_str("ANSWERS:\n");
        for i in 1..=7 {
            raw.push_str(&format!("{i}. word{i}\n"));
        }
        let a = parser().parse(&raw).unwrap();
        let keys: Vec<&str> = a.fill_in_the_blanks.questions.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(a.fill_in_the_blanks.answers.len(), 5);

        let short = "STUDY NOTES:\nn\nFILL IN THE BLANKS:\n1. a _____\n2. b _____\nANSWERS:\n1. x";
        let a = parser().parse(short).unwrap();
        assert_eq!(a.fill_in_the_blanks.questions.len(), 2);
        assert_eq!(a.fill_in_the_blanks.answers.len(), 1);
    }

    #[test]
    fn orphan_answers_dropped() {
        let raw = "STUDY NOTES:\nn\nFILL IN THE BLANKS:\n1. a _____\nANSWERS:\n1. x\n4. orphan";
        let a = parser().parse(raw).unwrap();
        assert!(!a.fill_in_the_blanks.answers.contains_key("4"));
    }

    #[test]
    fn multi_line_question_is_joined() {
        let raw = "STUDY NOTES:\nn\nSUBJECTIVE QUESTIONS:\nQ1: Explain how roots\nhelp the plant.\nANSWERS:\nQ1: They absorb water\nand hold the soil.";
        let a = parser().parse(raw).unwrap();
        assert_eq!(a.question_answer.questions["Q1"], "Explain how roots help the plant.");
        assert_eq!(a.question_answer.answers["Q1"], "They absorb water and hold the soil.");
    }

    #[test]
    fn qa_inline_pair_formats() {
        let raw = "STUDY NOTES:\nn\nQUESTION ANSWER:\n**Q1:** What is a leaf?\n**A1:** A flat green organ.\nQ2: What is a stem? A2: The support of a plant.\nQ3: Why water?\nAnswer: To live.\nQ4: ignored?\nA4: yes";
        let a = parser().parse(raw).unwrap();
        assert_eq!(a.question_answer.answers["Q1"], "A flat green organ.");
        assert_eq!(a.question_answer.questions["Q2"], "What is a stem?");
        assert_eq!(a.question_answer.answers["Q2"], "The support of a plant.");
        assert_eq!(a.question_answer.answers["Q3"], "To live.");
        assert!(!a.question_answer.questions.contains_key("Q4"));
    }

    #[test]
    fn match_inline_lists() {
        let raw = "STUDY NOTES:\nn\nMATCH THE FOLLOWING:\nColumn A: 1. Root 2. Leaf\nColumn B: A. Makes food, e.g. sugar B. Lack of vitamin C. causes scurvy\nAnswers: 1 → B, 2 → A";
        let a = parser().parse(raw).unwrap();
        let m = &a.match_the_following;
        assert_eq!(m.column_a.len(), 2);
        assert_eq!(m.column_b["A"], "Makes food, e.g. sugar");
        assert_eq!(m.column_b["B"], "Lack of vitamin C. causes scurvy");
        assert_eq!(m.answers["1"], "B");
        assert_eq!(m.answers["2"], "A");
    }

    #[test]
    fn lowercase_run_on_letter_stays_in_definition() {
        let items = lettered_items("A. Needs vitamin D. for bones B. Lack of vitamin C. causes scurvy");
        assert_eq!(
            items,
            vec![
                ('A', "Needs vitamin D. for bones".to_string()),
                ('B', "Lack of vitamin C. causes scurvy".to_string()),
            ]
        );
        let items = lettered_items("A. makes food; B. absorbs water,  C. carries water");
        assert_eq!(items.len(), 3);
        assert_eq!(items[1], ('B', "absorbs water".to_string()));
    }

    #[test]
    fn match_answers_one_per_line_with_dots() {
        let raw = "STUDY NOTES:\nn\nMATCH THE FOLLOWING:\nColumn A:\n1. Root\n2. Leaf\nColumn B:\nA. Makes food\nB. Absorbs water\nANSWERS:\n1. B\n2. (A)";
        let m = parser().parse(raw).unwrap().match_the_following;
        assert_eq!(m.column_a["1"], "Root");
        assert_eq!(m.answers["1"], "B");
        assert_eq!(m.answers["2"], "A");
    }

    #[test]
    fn match_answers_dotted_on_one_line() {
        let raw = "STUDY NOTES:\nn\nMATCH THE FOLLOWING:\nColumn A:\n1. Root\n2. Leaf\nColumn B:\nA. Makes food\nB. Absorbs water\nAnswers: 1. B 2. A";
        let m = parser().parse(raw).unwrap().match_the_following;
        assert_eq!(m.answers.len(), 2);
        assert_eq!(m.answers["2"], "A");
    }

    #[test]
    fn match_table_layout() {
        let raw = "STUDY NOTES:\nn\nMATCH THE FOLLOWING:\n| Column A | Column B |\n|---|---|\n| 1. Root | A. Absorbs water |\n| 2. Leaf | B. Makes food |\nAnswers: 1-A, 2-B";
        let a = parser().parse(raw).unwrap();
        let m = &a.match_the_following;
        assert_eq!(m.column_a["1"], "Root");
        assert_eq!(m.column_b["B"], "Makes food");
        assert_eq!(m.answers.len(), 2);
    }

    #[test]
    fn match_without_column_labels() {
        let raw = "STUDY NOTES:\nn\nMATCH THE FOLLOWING:\n1. Root\n2. Leaf\nA. Makes food\nB. Absorbs water\n1-B\n2-A";
        let a = parser().parse(raw).unwrap();
        let m = &a.match_the_following;
        assert_eq!(m.column_a.len(), 2);
        assert_eq!(m.column_b.len(), 2);
        assert_eq!(m.answers["1"], "B");
    }

    #[test]
    fn match_dangling_pairs_dropped() {
        let raw = "STUDY NOTES:\nn\nMATCH THE FOLLOWING:\nColumn A:\n1. Root\n2. Leaf\nColumn B:\nA. Makes food\nANSWERS: 1-A, 2-D, 7-A";
        let a = parser().parse(raw).unwrap();
        let m = &a.match_the_following;
        assert_eq!(m.answers.len(), 1);
        assert_eq!(m.answers["1"], "A");
    }

    #[test]
    fn garbled_match_block_is_empty() {
        let raw = "STUDY NOTES:\nn\nMATCH THE FOLLOWING:\n@@##!! ??? ~~~\nColumn A: ???\n\nSUBJECTIVE QUESTIONS:\nQ1: Why?\nANSWERS:\nQ1: Because.";
        let a = parser().parse(raw).unwrap();
        assert!(a.match_the_following.is_empty());
        assert_eq!(a.question_answer.questions.len(), 1);
    }

    #[test]
    fn preamble_and_rules_ignored() {
        let raw = "Sure! Here is your material.\n==========\nSTUDY NOTES:\nLeaves.\n==========\n---\n";
        let a = parser().parse(raw).unwrap();
        assert_eq!(a.important_notes, "Leaves.");
    }

    #[test]
    fn fenced_reply_accepted() {
        let raw = format!("```markdown\n{WELL_FORMED}\n```");
        let a = parser().parse(&raw).unwrap();
        assert_eq!(a.fill_in_the_blanks.questions.len(), 3);
    }

    #[test]
    fn json_reply_accepted_under_same_rules() {
        let raw = r###"```json
{
  "importantNotes": "## Plants\n- Roots",
  "fillInTheBlanks": {"questions": {"1": "a ___", "6": "too many"}, "answers": {"1": "x", "2": "orphan"}},
  "matchTheFollowing": {"column_a": {"1": "Root"}, "column_b": {"A": "Absorbs"}, "answers": {"1": "A", "2": "B"}},
  "questionAnswer": {"questions": {"Q1": "Why?"}, "answers": {"Q1": "Because."}}
}
```"###;
        let a = parser().parse(raw).unwrap();
        assert_eq!(a.important_notes, "## Plants\n- Roots");
        assert_eq!(a.fill_in_the_blanks.questions.len(), 1);
        assert_eq!(a.fill_in_the_blanks.answers.len(), 1);
        assert_eq!(a.match_the_following.answers.len(), 1);
        assert_eq!(a.question_answer.answers["Q1"], "Because.");
    }

    #[test]
    fn custom_limits_apply() {
        let p = ResponseParser::new(ParseLimits {
            fill_in_blanks: 2,
            match_pairs: 1,
            questions: 1,
        });
        let a = p.parse(WELL_FORMED).unwrap();
        assert_eq!(a.fill_in_the_blanks.questions.len(), 2);
        assert_eq!(a.match_the_following.column_a.len(), 1);
        assert_eq!(a.match_the_following.column_b.len(), 1);
        assert!(a.match_the_following.answers.is_empty());
        assert_eq!(a.question_answer.questions.len(), 1);
    }

    #[test]
    fn split_enumerated_requires_sequence() {
        let items = numbered_items("1. Sun 2. Moon 5. Star");
        assert_eq!(items, vec![(1, "Sun".into()), (2, "Moon 5. Star".into())]);
        assert!(numbered_items("Roots 1. grow").is_empty());
    }
}
