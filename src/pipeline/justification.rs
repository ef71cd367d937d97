//! Justification mapping: split the block after the verdict into per-choice
//! explanations.
//!
//! The block reads like:
//!
//! ```text
//! The correct answer is 1 & 3. <why those are right>
//! (Choice 2) <why 2 is wrong> (Choices 4 and 5) <shared text>
//! ```
//!
//! Callout bodies end at the next callout, at the next "correct answer"
//! statement, or at the end of the block. A callout naming several choices
//! fans its text out to each of them. When one choice is explained twice the
//! first text wins, and the correct-answer statement is always considered
//! first.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

static RE_CORRECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"The correct answer is\s+(\d+(?:\s*&\s*\d+)*)").unwrap()
});

static RE_CALLOUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(\s*Choices?\s+(\d+(?:\s*(?:&|,|and)\s*\d+)*)\s*\)").unwrap()
});

static RE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Correct ids and explanation text per choice id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Justifications {
    pub correct_ids: BTreeSet<u32>,
    pub by_choice: BTreeMap<u32, String>,
}

/// Parse a justification block.
pub fn map_justifications(block: &str) -> Justifications {
    let correct = RE_CORRECT.captures(block);
    let callouts: Vec<_> = RE_CALLOUT.captures_iter(block).collect();

    let mut boundaries: Vec<usize> = callouts
        .iter()
        .filter_map(|c| c.get(0).map(|m| m.start()))
        .collect();
    if let Some(m) = correct.as_ref().and_then(|c| c.get(0)) {
        boundaries.push(m.start());
    }
    boundaries.sort_unstable();

    let body_after = |from: usize| -> String {
        let end = boundaries
            .iter()
            .copied()
            .find(|&b| b >= from)
            .unwrap_or(block.len());
        clean_body(&block[from..end])
    };

    let mut out = Justifications::default();

    if let Some(caps) = &correct {
        let ids = parse_ids(&caps[1]);
        let end = caps.get(0).map_or(block.len(), |m| m.end());
        let rest = &block[end..];
        let skipped = rest.len() - rest.trim_start().len();
        let rest = rest.trim_start();
        let from = end + skipped + usize::from(rest.starts_with('.'));
        let body = body_after(from);

        for id in &ids {
            if !body.is_empty() {
                out.by_choice.entry(*id).or_insert_with(|| body.clone());
            }
        }
        out.correct_ids = ids;
    }

    for caps in &callouts {
        let ids = parse_ids(&caps[1]);
        let end = caps.get(0).map_or(block.len(), |m| m.end());
        let body = body_after(end);
        for id in ids {
            out.by_choice.entry(id).or_insert_with(|| body.clone());
        }
    }

    out
}

fn parse_ids(group: &str) -> BTreeSet<u32> {
    RE_ID
        .find_iter(group)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

fn clean_body(raw: &str) -> String {
    raw.trim().replace("\r\n", " ").replace(['\r', '\n'], " ")
}
