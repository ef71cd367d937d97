//! Post-processing: deterministic cleanup of model output.
//!
//! Two entry points:
//!
//! - [`strip_code_fences`] runs on the raw table-check reply before it is
//!   parsed, because models wrap JSON in ```` ```json ```` fences even when
//!   told not to.
//! - [`tidy_tables`] runs on the envelope's `content` when a table was
//!   detected, so the rephrase call receives well-formed pipe tables it can
//!   copy verbatim.
//!
//! Every rule is a pure `&str → String` pass and leaves prose alone.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n(.*?)\n?```$").unwrap());

/// Remove one pair of outer code fences, whatever language tag they carry.
///
/// Text that is not entirely fenced is returned trimmed but otherwise
/// untouched.
pub fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// Repair Markdown tables inside formatted text.
///
/// Rules (applied in order):
/// 1. CRLF → LF
/// 2. Strip zero-width and BOM characters that split table cells
/// 3. Insert a separator row under a header that lacks one
/// 4. Drop separator rows that appear below the header position
pub fn tidy_tables(input: &str) -> String {
    let s = input.replace("\r\n", "\n").replace('\r', "\n");
    let s = remove_invisible_chars(&s);
    let s = insert_missing_separators(&s);
    drop_body_separators(&s)
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{200C}', '\u{200D}', '\u{2060}'], "")
}

// ── Tables ───────────────────────────────────────────────────────────────────

fn insert_missing_separators(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 4);
    let mut prev_is_row = false;

    for (i, line) in lines.iter().enumerate() {
        out.push(line.to_string());
        let is_row = is_table_row(line);
        let starts_table = is_row && !prev_is_row && !is_separator_row(line);
        if starts_table {
            let next = lines.get(i + 1).copied().unwrap_or("");
            if is_table_row(next) && !is_separator_row(next) {
                out.push(separator_for(line));
            }
        }
        prev_is_row = is_row;
    }

    out.join("\n")
}

fn separator_for(header: &str) -> String {
    let cols = header.trim().matches('|').count().saturating_sub(1).max(1);
    let mut sep = String::from("|");
    for _ in 0..cols {
        sep.push_str(" --- |");
    }
    sep
}

/// GFM allows a separator only as the second line of a table.
fn drop_body_separators(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut row_in_table = 0usize;

    for line in input.lines() {
        if !is_table_row(line) {
            row_in_table = 0;
            out.push(line);
            continue;
        }
        row_in_table += 1;
        if is_separator_row(line) && row_in_table != 2 {
            continue;
        }
        out.push(line);
    }

    out.join("\n")
}

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') && t.contains('-') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"content\": \"x\", \"table_detected\": false}\n```";
        assert_eq!(
            strip_code_fences(raw),
            "{\"content\": \"x\", \"table_detected\": false}"
        );
    }

    #[test]
    fn strips_bare_fence() {
        assert_eq!(strip_code_fences("  ```\nhello\n```  "), "hello");
    }

    #[test]
    fn unfenced_text_passes_through() {
        assert_eq!(strip_code_fences(" {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn inner_fence_is_not_outer() {
        let raw = "intro\n```\ncode\n```";
        assert_eq!(strip_code_fences(raw), raw);
    }

    #[test]
    fn inserts_missing_separator() {
        let out = tidy_tables("Doses:\n| Drug | Dose |\n| Adrenaline | 0.5 mg |");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], "| --- | --- |");
    }

    #[test]
    fn well_formed_table_is_unchanged() {
        let table = "| A | B |\n| --- | --- |\n| 1 | 2 |\n| 3 | 4 |";
        assert_eq!(tidy_tables(table), table);
    }

    #[test]
    fn body_separator_is_dropped() {
        let out = tidy_tables("| A | B |\n| --- | --- |\n| 1 | 2 |\n| --- | --- |\n| 3 | 4 |");
        assert_eq!(out.lines().filter(|l| is_separator_row(l)).count(), 1);
        assert!(out.ends_with("| 3 | 4 |"));
    }

    #[test]
    fn prose_is_untouched() {
        let text = "No table here.\nJust two lines.";
        assert_eq!(tidy_tables(text), text);
    }

    #[test]
    fn crlf_and_zero_width_are_cleaned() {
        assert_eq!(tidy_tables("a\u{200B}b\r\nc"), "ab\nc");
    }
}
