//! Deterministic text cleanup for model output.
//!
//! Two entry points share one rule set:
//!
//! * [`normalise_response`] runs on the generation reply before it is split
//!   into sections. It only removes transport noise (outer code fences, CRLF,
//!   invisible characters, trailing spaces) and never touches formatting, so
//!   study notes come through verbatim.
//! * [`clean_page`] runs on each transcribed page on the advanced extraction
//!   path. It additionally collapses blank-line runs, repairs tables missing
//!   their separator row, and drops image links the model invented.

use once_cell::sync::Lazy;
use regex::Regex;

/// Strip transport noise from a generation reply.
pub fn normalise_response(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_outer_fences(&s);
    let s = remove_invisible_chars(&s);
    trim_trailing_whitespace(&s).trim().to_string()
}

/// Clean one transcribed page.
pub fn clean_page(input: &str) -> String {
    let s = normalise_response(input);
    let s = collapse_blank_lines(&s);
    let s = fix_tables_missing_separator(&s);
    let s = remove_invented_images(&s);
    s.trim().to_string()
}

// ── Outer fences ─────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[a-zA-Z]*\n(.*)\n```\s*$").expect("valid fence regex")
});

fn strip_outer_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Whitespace ───────────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank-run regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Tables ───────────────────────────────────────────────────────────────

/// `| a | b |` style row, at least one cell.
pub(crate) fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

pub(crate) fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') && t.contains('-') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// Insert a `| --- |` row after a table header that lacks one.
fn fix_tables_missing_separator(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out = Vec::with_capacity(lines.len() + 4);
    let mut in_table = false;

    for (i, line) in lines.iter().enumerate() {
        out.push((*line).to_string());
        if !is_table_row(line) {
            in_table = false;
            continue;
        }
        if in_table {
            continue;
        }
        in_table = true;
        let next = lines.get(i + 1).copied().unwrap_or("");
        if is_table_row(next) && !is_separator_row(next) && !is_separator_row(line) {
            let cols = line.trim().matches('|').count().saturating_sub(1).max(1);
            out.push(format!("|{}", " --- |".repeat(cols)));
        }
    }

    out.join("\n")
}

// ── Invented images ──────────────────────────────────────────────────────

static RE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").expect("valid image regex"));

/// A scanned page has no addressable images; any link is a placeholder
/// unless it is an absolute URL off the usual dummy hosts.
fn is_placeholder_url(url: &str) -> bool {
    let u = url.trim();
    if !(u.starts_with("http://") || u.starts_with("https://")) {
        return true;
    }
    ["example.com", "placeholder.com", "dummyimage.com", "placehold.it", "picsum.photos"]
        .iter()
        .any(|d| u.contains(d))
}

fn remove_invented_images(input: &str) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            if !is_placeholder_url(&caps[2]) {
                return caps[0].to_string();
            }
            let alt = caps[1].trim();
            if alt.is_empty() {
                String::new()
            } else {
                format!("*{alt}*")
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_language_tagged_fences() {
        assert_eq!(strip_outer_fences("```markdown\n# A\nB\n```"), "# A\nB");
        assert_eq!(strip_outer_fences("```\nplain\n```\n"), "plain");
        assert_eq!(strip_outer_fences("# untouched"), "# untouched");
    }

    #[test]
    fn normalise_keeps_blank_lines_and_markdown() {
        let raw = "```\r\n## Notes  \r\n\r\n\r\n\r\n- **Leaf**\u{200B}\r\n```";
        assert_eq!(normalise_response(raw), "## Notes\n\n\n\n- **Leaf**");
    }

    #[test]
    fn clean_page_collapses_blank_runs() {
        assert_eq!(clean_page("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn inserts_missing_table_separator() {
        let out = fix_tables_missing_separator("| Part | Job |\n| Root | Water |");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(is_separator_row(lines[1]), "{out}");
    }

    #[test]
    fn leaves_well_formed_table_alone() {
        let input = "| A | B |\n| --- | --- |\n| 1 | 2 |\n| 3 | 4 |";
        assert_eq!(fix_tables_missing_separator(input), input);
    }

    #[test]
    fn replaces_invented_image_with_caption() {
        let out = remove_invented_images("See ![Life cycle of a frog](figure1.png) above");
        assert_eq!(out, "See *Life cycle of a frog* above");
        let kept = remove_invented_images("![Map](https://maps.nasa.gov/earth.png)");
        assert!(kept.starts_with("![Map]"));
    }

    #[test]
    fn invisible_chars_removed() {
        assert_eq!(remove_invisible_chars("a\u{FEFF}b\u{00AD}c"), "abc");
    }
}
