//! Parsed question model: what the text pipeline knows before any model call.

use crate::pipeline::{justification, normalize, segment};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// One selectable answer option, numbered in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: u32,
    pub text: String,
}

/// The marker separating the choice list from the justification block.
///
/// It reflects whether the exported attempt was right, not which choice is,
/// so nothing downstream depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Correct,
    Incorrect,
}

/// A question carved out of one quiz document.
///
/// Fields that failed to match are empty rather than errors: a stem with no
/// choices, or choices with no justification, is still worth keeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedQuestion {
    pub points: Option<u32>,
    pub question_text: String,
    pub choices: Vec<Choice>,
    pub correct_ids: BTreeSet<u32>,
    pub justifications: BTreeMap<u32, String>,
    pub verdict: Option<Verdict>,
}

impl ParsedQuestion {
    /// Normalise raw document text and run the segment and justification
    /// passes over it.
    pub fn parse(raw_text: &str, preamble_marker: &str) -> Self {
        let text = normalize::normalize(raw_text, preamble_marker);
        let segments = segment::extract_segments(&text);
        let mapped = segments
            .justification
            .as_deref()
            .map(justification::map_justifications)
            .unwrap_or_default();

        Self {
            points: segments.points,
            question_text: segments.question.unwrap_or_default(),
            choices: segments.choices,
            correct_ids: mapped.correct_ids,
            justifications: mapped.by_choice,
            verdict: segments.verdict,
        }
    }

    /// Justification for `id`, or "" when no callout covered it.
    pub fn justification_for(&self, id: u32) -> &str {
        self.justifications.get(&id).map_or("", String::as_str)
    }

    pub fn is_correct(&self, id: u32) -> bool {
        self.correct_ids.contains(&id)
    }

    /// Inconsistencies between the choice list and the justification block.
    ///
    /// None of these stop a record from being stored; they are reported so a
    /// reviewer can check the source page.
    pub fn consistency_warnings(&self) -> Vec<ConsistencyWarning> {
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();

        for c in &self.choices {
            if !seen.insert(c.id) {
                warnings.push(ConsistencyWarning::DuplicateChoiceId(c.id));
            }
        }

        let contiguous = self
            .choices
            .iter()
            .enumerate()
            .all(|(i, c)| c.id as usize == i + 1);
        if !contiguous && !self.choices.is_empty() {
            warnings.push(ConsistencyWarning::NonContiguousChoices(
                self.choices.iter().map(|c| c.id).collect(),
            ));
        }

        for id in &self.correct_ids {
            if !seen.contains(id) {
                warnings.push(ConsistencyWarning::DanglingCorrectId(*id));
            }
        }

        warnings
    }
}

/// A detectable mismatch inside a [`ParsedQuestion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyWarning {
    /// "The correct answer is N" names a choice that was not extracted.
    DanglingCorrectId(u32),
    /// Two choices carry the same number.
    DuplicateChoiceId(u32),
    /// Choice numbers are not 1, 2, 3, … in source order.
    NonContiguousChoices(Vec<u32>),
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyWarning::DanglingCorrectId(id) => {
                write!(f, "correct answer {} has no matching choice", id)
            }
            ConsistencyWarning::DuplicateChoiceId(id) => {
                write!(f, "choice {} appears more than once", id)
            }
            ConsistencyWarning::NonContiguousChoices(ids) => {
                write!(f, "choice numbers are not contiguous: {:?}", ids)
            }
        }
    }
}
