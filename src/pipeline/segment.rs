//! Segment extraction: carve normalised quiz text into its four parts.
//!
//! A quiz page reads, top to bottom:
//!
//! ```text
//! 5 point(s)
//! 18. Question  <stem, possibly several lines>
//! 1. <choice>
//! 2. <choice>
//! …
//! CORRECT | INCORRECT  <justification block>
//! ```
//!
//! Each step is a pure function taking the remaining text and returning the
//! captured field plus the text left for the next step. Steps run in a fixed
//! order and each one searches only what its predecessor left behind, so a
//! choice numbered "1." can never be mistaken for the question header and a
//! "1." inside the justification can never become a choice. A step that finds
//! nothing returns its input untouched and the next step still runs.

use crate::question::{Choice, Verdict};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use tracing::debug;

static RE_POINTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+)\s+point\(s\)").unwrap());

static RE_QUESTION_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+\.\s*Question\b\s*").unwrap());

/// A line that starts a new numbered item ("\n 3. ").
static RE_NEXT_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\d+\.\s").unwrap());

static RE_CHOICE_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(\d+)\.\s").unwrap());

static RE_VERDICT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:INCORRECT|CORRECT)\b").unwrap());

static RE_VERDICT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(INCORRECT|CORRECT)\b").unwrap());

/// Check/cross marks the quiz renderer leaves next to the picked choice,
/// including the private-use glyph some exports emit.
static RE_GLYPHS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[✔✓✗✘✖\x{F00D}]").unwrap());

/// Everything the extractor found, in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segments {
    pub points: Option<u32>,
    pub question: Option<String>,
    pub choices: Vec<Choice>,
    pub verdict: Option<Verdict>,
    pub justification: Option<String>,
}

/// Run all four steps over normalised text.
pub fn extract_segments(text: &str) -> Segments {
    let (points, rest) = take_points(text);
    let (question, rest) = take_question(&rest);
    let (choices, rest) = take_choices(rest);
    let (verdict, _rest) = take_verdict(rest);

    let (verdict, justification) = match verdict {
        Some((v, body)) => (Some(v), Some(body)),
        None => (None, None),
    };

    debug!(
        "Segments: points={:?} question={} choices={} verdict={:?}",
        points,
        question.as_ref().map_or(0, |q| q.len()),
        choices.len(),
        verdict
    );

    Segments {
        points,
        question,
        choices,
        verdict,
        justification,
    }
}

// ── Step 1: Points ───────────────────────────────────────────────────────────

/// Capture "<n> point(s)" and delete just that span.
pub fn take_points(text: &str) -> (Option<u32>, Cow<'_, str>) {
    match RE_POINTS.captures(text) {
        Some(caps) => {
            let span = caps.get(0).map_or(0..0, |m| m.range());
            let points = caps[1].parse::<u32>().ok();
            let mut rest = String::with_capacity(text.len());
            rest.push_str(&text[..span.start]);
            rest.push_str(&text[span.end..]);
            (points, Cow::Owned(rest))
        }
        None => (None, Cow::Borrowed(text)),
    }
}

// ── Step 2: Question ─────────────────────────────────────────────────────────

/// Capture the stem after "<n>. Question" up to the next numbered line and
/// delete everything through the end of the stem.
///
/// Without a following numbered line there is nothing to delimit the stem,
/// so the step matches nothing.
pub fn take_question(text: &str) -> (Option<String>, &str) {
    let Some(head) = RE_QUESTION_HEAD.find(text) else {
        return (None, text);
    };
    let Some(next) = RE_NEXT_ITEM.find_at(text, head.end()) else {
        return (None, text);
    };
    let stem = text[head.end()..next.start()].trim().to_string();
    (Some(stem), &text[next.start()..])
}

// ── Step 3: Choices ──────────────────────────────────────────────────────────

/// Capture every "<n>. <text>" item that is closed by another item or by the
/// verdict line, then delete through the end of the last one.
pub fn take_choices(text: &str) -> (Vec<Choice>, &str) {
    let verdict_at = RE_VERDICT_LINE.find(text).map(|m| m.start());
    let limit = verdict_at.unwrap_or(text.len());

    let starts: Vec<(usize, usize, u32)> = RE_CHOICE_START
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if whole.start() >= limit {
                return None;
            }
            let id = caps[1].parse::<u32>().ok()?;
            Some((whole.start(), whole.end(), id))
        })
        .collect();

    let mut choices = Vec::with_capacity(starts.len());
    let mut consumed = 0usize;

    for (i, &(_, body_start, id)) in starts.iter().enumerate() {
        let end = match starts.get(i + 1) {
            Some(&(next_start, _, _)) => next_start,
            None => match verdict_at {
                Some(v) => v,
                // The last item has no closing boundary.
                None => break,
            },
        };
        choices.push(Choice {
            id,
            text: clean_choice_text(&text[body_start..end]),
        });
        consumed = end;
    }

    (choices, &text[consumed..])
}

fn clean_choice_text(raw: &str) -> String {
    RE_GLYPHS.replace_all(raw, "").trim().to_string()
}

// ── Step 4: Verdict + justification ──────────────────────────────────────────

/// Capture the CORRECT/INCORRECT token and everything after it.
pub fn take_verdict(text: &str) -> (Option<(Verdict, String)>, &str) {
    let Some(caps) = RE_VERDICT.captures(text) else {
        return (None, text);
    };
    let verdict = if &caps[1] == "INCORRECT" {
        Verdict::Incorrect
    } else {
        Verdict::Correct
    };
    let body_start = caps.get(0).map_or(text.len(), |m| m.end());
    let body = text[body_start..].trim().to_string();
    (Some((verdict, body)), "")
}

// ── Tests ────────────────────────────────────────────────────────────────────
