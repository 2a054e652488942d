//! Error types for Letter Assist.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Channel {name} refused delivery to {recipient}")]
    Forbidden { name: String, recipient: String },

    #[error("Download from channel {name} failed: {reason}")]
    DownloadFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// OCR service errors.
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("OCR request failed: {0}")]
    RequestFailed(String),

    #[error("OCR service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unsupported attachment type: {0}")]
    UnsupportedMedia(String),
}

/// Taxonomy tag carried by every surfaced pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoAttachment,
    DownloadFailed,
    EmptyExtraction,
    ExtractionFailed,
    GenerationFailed,
    ExportFailed,
    DeliveryForbidden,
    DeliveryFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAttachment => "no_attachment",
            Self::DownloadFailed => "download_failed",
            Self::EmptyExtraction => "empty_extraction",
            Self::ExtractionFailed => "extraction_failed",
            Self::GenerationFailed => "generation_failed",
            Self::ExportFailed => "export_failed",
            Self::DeliveryForbidden => "delivery_forbidden",
            Self::DeliveryFailed => "delivery_failed",
        }
    }
}

/// Pipeline-related errors.
///
/// Each variant is scoped to the request that raised it; none are retried.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No attachment found. Upload an image or scan of the letter.")]
    NoAttachment,

    #[error("Ask a question after the command, e.g. /ask how do I reply to a final notice?")]
    EmptyQuestion,

    #[error("Could not download the attachment: {0}")]
    DownloadFailed(String),

    #[error("No readable text was found in the document.")]
    EmptyExtraction,

    #[error("Text extraction failed: {0}")]
    ExtractionFailed(#[from] OcrError),

    #[error("Drafting the response failed: {0}")]
    GenerationFailed(#[from] LlmError),

    #[error("Could not export the response: {0}")]
    Export(#[from] std::io::Error),

    #[error("I couldn't message you privately. Please allow direct messages and try again.")]
    DeliveryForbidden,

    #[error("Delivering the response failed: {0}")]
    Delivery(String),
}

impl PipelineError {
    /// Taxonomy tag for logging and tests.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoAttachment | Self::EmptyQuestion => ErrorKind::NoAttachment,
            Self::DownloadFailed(_) => ErrorKind::DownloadFailed,
            Self::EmptyExtraction => ErrorKind::EmptyExtraction,
            Self::ExtractionFailed(_) => ErrorKind::ExtractionFailed,
            Self::GenerationFailed(_) => ErrorKind::GenerationFailed,
            Self::Export(_) => ErrorKind::ExportFailed,
            Self::DeliveryForbidden => ErrorKind::DeliveryForbidden,
            Self::Delivery(_) => ErrorKind::DeliveryFailed,
        }
    }

    /// The single message reported back to the requester.
    pub fn user_message(&self) -> String {
        format!("Error: {self}")
    }
}

impl From<ChannelError> for PipelineError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Forbidden { .. } => Self::DeliveryForbidden,
            ChannelError::DownloadFailed { reason, .. } => Self::DownloadFailed(reason),
            other => Self::Delivery(other.to_string()),
        }
    }
}
