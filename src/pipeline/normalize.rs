//! Text normalisation: strip the quiz preamble, URLs and stuttered words.
//!
//! Text pulled out of a rendered quiz page carries three kinds of noise that
//! confuse segmentation:
//!
//! - the quiz-summary header (timer, review buttons, score) above the first
//!   question, which ends with a fixed marker phrase
//! - links printed in page headers and footers
//! - words doubled by the text layer ("the the patient"), usually where a
//!   line wraps or a bold span overlaps plain text
//!
//! Each rule only ever removes text. [`normalize`] repeats the rules until
//! the text stops changing, so removing one kind of noise can never expose
//! another that survives, and a second call is always a no-op.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:https?://|www\.)\S+").unwrap());

static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

/// Normalise raw quiz text.
///
/// Line endings are unified to `\n` first. Then the rules are applied in
/// order and repeated until stable:
/// 1. Drop everything up to and including the last `marker` occurrence
///    (no-op when the marker is absent)
/// 2. Remove URLs
/// 3. Collapse runs of a repeated word (case-insensitive) to the first one
/// 4. Trim surrounding whitespace
pub fn normalize(input: &str, marker: &str) -> String {
    let mut current = unify_line_endings(input);
    loop {
        let s = strip_preamble(&current, marker);
        let s = remove_urls(s);
        let s = collapse_repeated_words(&s);
        let next = s.trim().to_string();
        if next == current {
            return next;
        }
        current = next;
    }
}

fn unify_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 1: Strip preamble ───────────────────────────────────────────────────

fn strip_preamble<'a>(input: &'a str, marker: &str) -> &'a str {
    if marker.is_empty() {
        return input;
    }
    match input.rfind(marker) {
        Some(pos) => &input[pos + marker.len()..],
        None => input,
    }
}

// ── Rule 2: Remove URLs ──────────────────────────────────────────────────────

fn remove_urls(input: &str) -> String {
    RE_URL.replace_all(input, "").into_owned()
}

// ── Rule 3: Collapse repeated words ──────────────────────────────────────────
//
// Two words form a repeat when they compare equal ignoring case and only
// whitespace separates them. The first spelling of the run is kept along
// with the whitespace before it; the separators and later copies go.

fn collapse_repeated_words(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut copied_to = 0usize;
    let mut prev_word: Option<String> = None;
    let mut prev_end = 0usize;

    for m in RE_WORD.find_iter(input) {
        let word = m.as_str().to_lowercase();
        let gap = &input[prev_end..m.start()];
        let only_space = !gap.is_empty() && gap.chars().all(char::is_whitespace);
        if only_space && prev_word.as_deref() == Some(word.as_str()) {
            out.push_str(&input[copied_to..prev_end]);
            copied_to = m.end();
            prev_end = m.end();
            continue;
        }
        prev_word = Some(word);
        prev_end = m.end();
    }

    out.push_str(&input[copied_to..]);
    out
}

// ── Tests ────────────────────────────────────────────────────────────────────
