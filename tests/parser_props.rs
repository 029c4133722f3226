//! Invariants of the response parser and the verdict reader over generated input.

use edgequake_studykit::{
    parse_verdict, AppropriatenessCheck, OverallStatus, ParseLimits, RelevanceCheck, ResponseParser,
    ValidationVerdict,
};
use proptest::prelude::*;

fn word() -> impl Strategy<Value = String> {
    "[a-z]{2,8}( [a-z]{2,8}){0,4}"
}

/// Numbered lines with arbitrary, possibly repeated or out-of-range numbers.
fn numbered_block(prefix: &'static str) -> impl Strategy<Value = String> {
    (
        prop::collection::vec((0u32..12, word()), 0..10),
        prop::collection::vec((0u32..12, word()), 0..10),
    )
        .prop_map(move |(questions, answers)| {
            let mut s = String::new();
            for (n, q) in questions {
                s.push_str(&format!("{prefix}{n}. {q} _____\n"));
            }
            s.push_str("ANSWERS:\n");
            for (n, a) in answers {
                s.push_str(&format!("{prefix}{n}. {a}\n"));
            }
            s
        })
}

/// Columns and answers with shuffled, missing and out-of-range references.
fn match_block() -> impl Strategy<Value = String> {
    (
        prop::collection::vec((0u32..9, word()), 0..8),
        prop::collection::vec((prop::char::range('A', 'J'), word()), 0..8),
        prop::collection::vec((0u32..9, prop::char::range('A', 'Z')), 0..10),
        any::<bool>(),
    )
        .prop_map(|(a, b, answers, inline)| {
            let mut s = String::from("Column A:\n");
            for (n, t) in a {
                s.push_str(&format!("{n}. {t}\n"));
            }
            s.push_str("Column B:\n");
            for (l, d) in b {
                s.push_str(&format!("{l}. {d}\n"));
            }
            s.push_str("ANSWERS:\n");
            let pairs: Vec<String> = answers.iter().map(|(n, l)| format!("{n}-{l}")).collect();
            if inline {
                s.push_str(&pairs.join(", "));
            } else {
                s.push_str(&pairs.join("\n"));
            }
            s.push('\n');
            s
        })
}

fn reply() -> impl Strategy<Value = String> {
    (word(), numbered_block(""), match_block(), numbered_block("Q")).prop_map(
        |(notes, fill, matching, qa)| {
            format!(
                "### STUDY NOTES:\n{notes}\n\n### FILL IN THE BLANKS:\n{fill}\n\
                 ### MATCH THE FOLLOWING:\n{matching}\n### SUBJECTIVE QUESTIONS:\n{qa}"
            )
        },
    )
}

fn limits() -> impl Strategy<Value = ParseLimits> {
    (0usize..7, 0usize..7, 0usize..5).prop_map(|(f, m, q)| ParseLimits {
        fill_in_blanks: f,
        match_pairs: m,
        questions: q,
    })
}

proptest! {
    #[test]
    fn numbered_answers_never_outrun_questions(raw in reply(), limits in limits()) {
        let a = ResponseParser::new(limits).parse(&raw).unwrap();

        let fill = &a.fill_in_the_blanks;
        prop_assert!(fill.questions.len() <= limits.fill_in_blanks);
        for key in fill.answers.keys() {
            prop_assert!(fill.questions.contains_key(key), "answer {} has no question", key);
        }

        let qa = &a.question_answer;
        prop_assert!(qa.questions.len() <= limits.questions);
        for key in qa.answers.keys() {
            prop_assert!(qa.questions.contains_key(key), "answer {} has no question", key);
            prop_assert!(key.starts_with('Q'));
        }
    }

    #[test]
    fn match_answers_reference_both_columns(raw in reply(), limits in limits()) {
        let m = ResponseParser::new(limits).parse(&raw).unwrap().match_the_following;
        prop_assert!(m.column_a.len() <= limits.match_pairs);
        for (n, letter) in &m.answers {
            prop_assert!(m.column_a.contains_key(n), "answer key {} missing from column A", n);
            prop_assert!(m.column_b.contains_key(letter), "answer letter {} missing from column B", letter);
        }
    }

    #[test]
    fn parsing_twice_gives_the_same_artifact(raw in reply()) {
        let parser = ResponseParser::default();
        prop_assert_eq!(parser.parse(&raw), parser.parse(&raw));
    }

    #[test]
    fn arbitrary_text_never_panics(raw in "\\PC{0,400}") {
        let _ = ResponseParser::default().parse(&raw);
        let _ = parse_verdict(&raw);
    }

    #[test]
    fn notes_are_never_empty_on_success(raw in "(### STUDY NOTES:\n)?[a-zA-Z \n#*]{0,120}") {
        if let Ok(a) = ResponseParser::default().parse(&raw) {
            prop_assert!(!a.important_notes.trim().is_empty());
        }
    }
}

fn appropriateness() -> impl Strategy<Value = (Option<&'static str>, AppropriatenessCheck)> {
    prop_oneof![
        Just((Some("APPROPRIATE"), AppropriatenessCheck::Appropriate)),
        Just((Some("INAPPROPRIATE"), AppropriatenessCheck::Inappropriate)),
        Just((Some("banana"), AppropriatenessCheck::Unknown)),
        Just((None, AppropriatenessCheck::Unknown)),
    ]
}

fn relevance() -> impl Strategy<Value = (Option<&'static str>, RelevanceCheck)> {
    prop_oneof![
        Just((Some("MATCH"), RelevanceCheck::Match)),
        Just((Some("MISMATCH"), RelevanceCheck::Mismatch)),
        Just((Some("banana"), RelevanceCheck::Unknown)),
        Just((None, RelevanceCheck::Unknown)),
    ]
}

proptest! {
    #[test]
    fn verdict_passes_only_when_every_axis_is_positive(
        grade in appropriateness(),
        safety in appropriateness(),
        rel in relevance(),
        lowercase in any::<bool>(),
    ) {
        let mut reply = String::new();
        if let Some(g) = grade.0 {
            reply.push_str(&format!("GRADE_CHECK: {g}\n"));
        }
        if let Some(s) = safety.0 {
            reply.push_str(&format!("SAFETY_CHECK: {s}\n"));
        }
        if let Some(r) = rel.0 {
            reply.push_str(&format!("RELEVANCE_CHECK: {r}\n"));
        }
        reply.push_str("REASON: checked.");
        if lowercase {
            reply = reply.to_lowercase();
        }

        let v = parse_verdict(&reply);
        prop_assert_eq!(v.grade_check(), grade.1);
        prop_assert_eq!(v.safety_check(), safety.1);
        prop_assert_eq!(v.relevance_check(), rel.1);

        let all_positive = grade.1 == AppropriatenessCheck::Appropriate
            && safety.1 == AppropriatenessCheck::Appropriate
            && rel.1 == RelevanceCheck::Match;
        prop_assert_eq!(v.passed(), all_positive);
        prop_assert_eq!(v.overall_status() == OverallStatus::Passed, all_positive);
    }

    #[test]
    fn constructed_verdict_status_is_derived(
        grade in appropriateness(),
        safety in appropriateness(),
        rel in relevance(),
    ) {
        let v = ValidationVerdict::new(grade.1, safety.1, rel.1, "r");
        let expected = grade.1 == AppropriatenessCheck::Appropriate
            && safety.1 == AppropriatenessCheck::Appropriate
            && rel.1 == RelevanceCheck::Match;
        prop_assert_eq!(v.passed(), expected);
    }
}
