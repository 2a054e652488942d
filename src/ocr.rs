//! Optical character recognition for uploaded letters.
//!
//! [`VisionOcr`] sends the document to an OpenAI-compatible chat endpoint
//! as an inline base64 image (or PDF file part) and asks for a verbatim
//! transcription. A document with no legible text comes back as `""`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::OcrError;

/// Default OpenAI API base.
pub const DEFAULT_OCR_API_BASE: &str = "https://api.openai.com/v1";

/// Default vision-capable model.
pub const DEFAULT_OCR_MODEL: &str = "gpt-4o-mini";

/// Marker the model is told to return for blank or illegible documents.
const NO_TEXT_MARKER: &str = "NO_TEXT";

const OCR_MAX_TOKENS: u32 = 4096;

const OCR_INSTRUCTION: &str = "You are an OCR engine. Transcribe all text in the document \
     exactly as written, preserving line breaks. Do not summarise, translate or comment. \
     If the document contains no legible text, reply with exactly NO_TEXT.";

/// Turns document bytes into plain text.
#[async_trait]
pub trait OcrService: Send + Sync {
    fn name(&self) -> &str;

    /// Extract text. An empty string means the document had no readable text.
    async fn extract_text(&self, bytes: &[u8], mime_type: Option<&str>)
    -> Result<String, OcrError>;
}

/// Identify a document type from its leading bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF") {
        Some("application/pdf")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Vision-model OCR over HTTP.
pub struct VisionOcr {
    client: reqwest::Client,
    api_base: String,
    api_key: SecretString,
    model: String,
}

impl VisionOcr {
    pub fn new(
        api_base: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, OcrError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| OcrError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    /// Build the chat completion body for a document.
    fn request_body(&self, bytes: &[u8], mime_type: &str) -> Value {
        let data_url = format!("data:{mime_type};base64,{}", STANDARD.encode(bytes));
        let document_part = if mime_type == "application/pdf" {
            json!({
                "type": "file",
                "file": { "filename": "letter.pdf", "file_data": data_url },
            })
        } else {
            json!({
                "type": "image_url",
                "image_url": { "url": data_url },
            })
        };

        json!({
            "model": self.model,
            "temperature": 0,
            "max_tokens": OCR_MAX_TOKENS,
            "messages": [
                { "role": "system", "content": OCR_INSTRUCTION },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": "Transcribe this document." },
                        document_part,
                    ],
                },
            ],
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Normalise a transcription; the no-text marker becomes an empty string.
fn clean_transcription(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case(NO_TEXT_MARKER) {
        String::new()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl OcrService for VisionOcr {
    fn name(&self) -> &str {
        "vision"
    }

    async fn extract_text(
        &self,
        bytes: &[u8],
        mime_type: Option<&str>,
    ) -> Result<String, OcrError> {
        let mime = mime_type
            .filter(|m| m.starts_with("image/") || *m == "application/pdf")
            .or_else(|| sniff_mime(bytes))
            .ok_or_else(|| {
                OcrError::UnsupportedMedia(mime_type.unwrap_or("unknown").to_string())
            })?;

        debug!(mime, bytes = bytes.len(), model = %self.model, "Sending document to OCR");

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.request_body(bytes, mime))
            .send()
            .await
            .map_err(|e| OcrError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OcrError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = resp
            .json()
            .await
            .map_err(|e| OcrError::RequestFailed(format!("invalid response: {e}")))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| clean_transcription(&c))
            .unwrap_or_default();

        info!(chars = text.chars().count(), "OCR complete");
        Ok(text)
    }
}
