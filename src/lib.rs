//! Letter Assist drafts replies to uploaded correspondence.

pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod ocr;
pub mod pipeline;
