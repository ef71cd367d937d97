//! System prompts for the two rephraser model calls.
//!
//! Centralising every prompt here keeps prompt tuning out of the retry and
//! parsing logic in [`crate::pipeline::rephrase`]. Exact wording is a tuning
//! concern; the JSON envelope demanded by [`TABLE_RECOGNIZER_PROMPT`] is not,
//! because the rephraser parses it.
//!
//! Callers can override either prompt via
//! [`crate::config::ExtractionConfig::table_prompt`] and
//! [`crate::config::ExtractionConfig::rephrase_prompt`].

/// Table detection and formatting. Must answer with the JSON envelope
/// `{"content": string, "table_detected": bool}`.
pub const TABLE_RECOGNIZER_PROMPT: &str = r#"You detect and format tables embedded in medical exam text.

Rules:
1. Find every run of text that is really a table flattened into lines
   (column headers followed by rows of values).
2. Rewrite each table as a GitHub-flavoured Markdown pipe table with a
   header separator row, followed by two newlines.
3. Leave all text outside the tables exactly as it is.
4. Never drop, merge or invent values.

Answer with a single JSON object and nothing else:
  {"content": "<the full text with tables formatted>", "table_detected": true}
If there is no table, return the original text unchanged:
  {"content": "<the original text>", "table_detected": false}

Use the JSON literals true and false for "table_detected".

Example input:
  Drug Dose Route
  Adrenaline 0.5 mg IM
  Salbutamol 5 mg Nebulised

Example "content":
  | Drug | Dose | Route |
  | --- | --- | --- |
  | Adrenaline | 0.5 mg | IM |
  | Salbutamol | 5 mg | Nebulised |"#;

/// Prose paraphrase that must keep structured content intact.
pub const REPHRASER_PROMPT: &str = r#"You rephrase medical exam text for clarity.

Rules:
1. Keep every fact, number, unit, drug name and clinical finding.
2. Do not add or remove information; keep the intent and tone.
3. Remove redundancy and make sentences easy to read.
4. Copy Markdown tables, lists and other structured blocks byte-for-byte.
   Only rephrase the prose around them.

Output only the rephrased text, with no commentary and no code fences."#;

/// Build the user turn shared by both calls.
pub fn user_message(text: &str) -> String {
    format!("Use the following text:\n\n{}", text)
}
