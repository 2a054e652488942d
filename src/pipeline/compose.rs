//! Deterministic prompt assembly.
//!
//! `compose` is a pure function of its inputs: every section is always
//! emitted, in a fixed order, with no conditional omission.

use crate::llm::provider::{ChatMessage, CompletionRequest};
use crate::pipeline::types::{ClassificationResult, EntitySet, ReferenceSelection};

/// Standing reminder carried by every system instruction.
pub const EDUCATION_ONLY_NOTICE: &str = "You do NOT give legal advice or litigation guidance. \
     Your output is for education and honour only, and the requester remains responsible \
     for anything they send.";

/// Fully assembled generation payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub system: String,
    pub user: String,
}

impl ComposedPrompt {
    /// Turn the prompt into a completion request.
    pub fn into_request(self, max_tokens: u32, temperature: f32) -> CompletionRequest {
        CompletionRequest::new(vec![
            ChatMessage::system(self.system),
            ChatMessage::user(self.user),
        ])
        .with_max_tokens(max_tokens)
        .with_temperature(temperature)
    }
}

/// System instruction for drafting replies to letters.
pub fn drafting_system_prompt() -> String {
    format!(
        "You are Letter Assist, a drafting assistant that helps people answer official \
         correspondence: council tax, energy and water suppliers, debt collectors, \
         solicitors, banks and local authorities.\n\n\
         {EDUCATION_ONLY_NOTICE}\n\n\
         When drafting:\n\
         - Write a complete reply the requester can send, addressed to the sender of the letter.\n\
         - Match firmness to the tone and threat score you are given; stay courteous at every level.\n\
         - Quote the supplied case law and maxim where they genuinely support a point.\n\
         - Do not invent facts, amounts, dates or reference numbers that are not in the letter.\n\
         - Write \"Name Unknown\" or \"undated\" exactly as given when those values appear.\n\
         - End with a short note reminding the requester that this is not legal advice."
    )
}

/// System instruction for free-text questions.
pub fn question_system_prompt() -> String {
    format!(
        "You are Letter Assist, an assistant for people dealing with official \
         correspondence, trust administration and equity.\n\n\
         {EDUCATION_ONLY_NOTICE}\n\n\
         Give clear, simple answers grounded in equity. Always distinguish between the \
         living person and the legal name used in correspondence."
    )
}

/// Assemble the drafting prompt for one letter.
pub fn compose(
    raw_text: &str,
    entities: &EntitySet,
    classification: &ClassificationResult,
    references: &ReferenceSelection,
) -> ComposedPrompt {
    let mut user = String::with_capacity(raw_text.len() + 1024);

    user.push_str("LETTER DETAILS\n");
    user.push_str(&format!("Addressee: {}\n", entities.name));
    user.push_str(&format!("Letter date: {}\n", entities.date));
    user.push_str(&format!(
        "Detected correspondence type: {}\n",
        entities.correspondence_type
    ));

    user.push_str("\nCLASSIFICATION\n");
    user.push_str(&format!("Tone: {}\n", classification.tone));
    user.push_str(&format!("Threat score: {}/100\n", classification.threat_score));
    user.push_str(&format!(
        "Correspondence type: {}\n",
        classification.correspondence_type
    ));

    user.push_str("\nREFERENCES\n");
    user.push_str(&format!("Case law: {}\n", references.case_law));
    user.push_str(&format!("Maxim: {}\n", references.maxim));

    user.push_str("\nTASK\n");
    user.push_str(
        "Draft a reply to the letter below on behalf of the addressee, \
         using the details, classification and references above.\n",
    );

    user.push_str("\nLETTER TEXT\n\"\"\"\n");
    user.push_str(raw_text);
    user.push_str("\n\"\"\"\n");

    ComposedPrompt {
        system: drafting_system_prompt(),
        user,
    }
}

/// Assemble the prompt for a free-text question.
pub fn compose_question(question: &str) -> ComposedPrompt {
    ComposedPrompt {
        system: question_system_prompt(),
        user: question.to_string(),
    }
}
