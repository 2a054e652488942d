//! Letter drafting pipeline.
//!
//! Every uploaded letter flows through:
//! 1. `OcrService::extract_text()`: attachment bytes to raw text
//! 2. `extract()` + `Classifier::classify()`: entities, tone, threat score
//! 3. `RotationStore`: per-requester case law and maxim cursors
//! 4. `compose()` → `LlmProvider::complete()`: the drafted reply
//! 5. `ResponseRouter::route()`: inline message or exported file
//!
//! Requests are independent; the rotation store is the only shared state.

pub mod classify;
pub mod compose;
pub mod extract;
pub mod faq;
pub mod processor;
pub mod references;
pub mod rotation;
pub mod router;
pub mod types;

pub use processor::{LetterProcessor, ProcessedLetter};
