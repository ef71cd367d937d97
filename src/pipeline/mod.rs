//! Pipeline stages for quiz-PDF extraction.
//!
//! Each submodule implements exactly one transformation step. The text
//! stages are pure functions, so each one can be tested with a string in
//! and a value out.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ segment ──▶ justification ──▶ assemble ──▶ rephrase
//! (pdfium)  (cleanup)     (4 steps)   (per-choice map)  (answers)    (llm ×2)
//! ```
//!
//! 1. [`input`]: page text up to the "NEXT" sentinel plus embedded images;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 2. [`normalize`]: drop the quiz preamble, URLs and doubled words
//! 3. [`segment`]: points, question stem, choices, verdict + justification
//! 4. [`justification`]: correct ids and per-choice explanation text
//! 5. [`assemble`]: one answer record per choice
//! 6. [`rephrase`]: table check then paraphrase through [`llm`], with
//!    bounded retry and [`postprocess`] cleanup in between

pub mod assemble;
pub mod input;
pub mod justification;
pub mod llm;
pub mod normalize;
pub mod postprocess;
pub mod rephrase;
pub mod segment;
