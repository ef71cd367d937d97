//! Answer assembly: merge choices, correctness and explanations.

use crate::output::AnswerRecord;
use crate::question::ParsedQuestion;
use uuid::Uuid;

/// One [`AnswerRecord`] per choice, in choice order.
///
/// Total: a choice with no explanation gets "", a choice outside the
/// correct set is incorrect.
pub fn assemble_answers(question: &ParsedQuestion) -> Vec<AnswerRecord> {
    question
        .choices
        .iter()
        .map(|choice| AnswerRecord {
            id: Uuid::new_v4(),
            text: strip_id_prefix(&choice.text, choice.id).to_string(),
            is_correct: question.is_correct(choice.id),
            explanation: question.justification_for(choice.id).to_string(),
        })
        .collect()
}

/// Drop a leading "<id> " the text layer sometimes repeats inside the body.
fn strip_id_prefix(text: &str, id: u32) -> &str {
    let prefix = id.to_string();
    match text.strip_prefix(prefix.as_str()) {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => text,
    }
}
