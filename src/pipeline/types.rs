//! Shared types for the letter drafting pipeline.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;

// ── Inbound request ─────────────────────────────────────────────────

/// An uploaded file as the platform describes it, before download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Platform file reference (Telegram `file_id`, URL, ...).
    pub reference: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

impl Attachment {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            file_name: None,
            mime_type: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }
}

/// Where replies for a request go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTarget {
    /// The conversation the request arrived in (e.g. a group chat id).
    pub context: String,
    /// Private address of the requester (e.g. their user id).
    pub requester: String,
}

/// Which address a delivery is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Context,
    Private,
}

impl ReplyTarget {
    pub fn address(&self, recipient: Recipient) -> &str {
        match recipient {
            Recipient::Context => &self.context,
            Recipient::Private => &self.requester,
        }
    }
}

/// One uploaded letter awaiting a drafted reply. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetterRequest {
    pub id: Uuid,
    /// Stable requester identifier, used to key reference rotation.
    pub requester: String,
    pub attachment: Option<Attachment>,
    pub reply_to: ReplyTarget,
    pub received_at: DateTime<Utc>,
}

impl LetterRequest {
    pub fn new(
        requester: impl Into<String>,
        attachment: Option<Attachment>,
        reply_to: ReplyTarget,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester: requester.into(),
            attachment,
            reply_to,
            received_at: Utc::now(),
        }
    }
}

// ── Request lifecycle ───────────────────────────────────────────────

/// Per-request pipeline stage. `Failed` is reachable from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Extracted,
    Classified,
    Composed,
    Generated,
    Delivered,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Extracted => "extracted",
            Self::Classified => "classified",
            Self::Composed => "composed",
            Self::Generated => "generated",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }
}

// ── Classification vocabulary ───────────────────────────────────────

/// Strict decode failure for classifier output. Always recovered locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("classifier output {raw:?} is not a valid {field}")]
pub struct ClassificationInvalid {
    pub field: &'static str,
    pub raw: String,
}

/// Coarse severity of a piece of correspondence, lowest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tone {
    #[default]
    Admin,
    Request,
    Demand,
    Escalation,
    Threat,
}

impl Tone {
    pub const ALL: [Tone; 5] = [
        Self::Admin,
        Self::Request,
        Self::Demand,
        Self::Escalation,
        Self::Threat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Request => "REQUEST",
            Self::Demand => "DEMAND",
            Self::Escalation => "ESCALATION",
            Self::Threat => "THREAT",
        }
    }

    /// Strict decode of raw service output (trimmed, upper-cased).
    pub fn decode(raw: &str) -> Result<Self, ClassificationInvalid> {
        let normalized = normalize_word(raw);
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ClassificationInvalid {
                field: "tone",
                raw: raw.to_string(),
            })
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subject-matter category of the correspondence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrespondenceType {
    CouncilTax,
    Energy,
    Water,
    DebtCollection,
    Solicitor,
    BankFinance,
    LocalAuthority,
    #[default]
    General,
}

impl CorrespondenceType {
    pub const ALL: [CorrespondenceType; 8] = [
        Self::CouncilTax,
        Self::Energy,
        Self::Water,
        Self::DebtCollection,
        Self::Solicitor,
        Self::BankFinance,
        Self::LocalAuthority,
        Self::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CouncilTax => "COUNCIL_TAX",
            Self::Energy => "ENERGY",
            Self::Water => "WATER",
            Self::DebtCollection => "DEBT_COLLECTION",
            Self::Solicitor => "SOLICITOR",
            Self::BankFinance => "BANK_FINANCE",
            Self::LocalAuthority => "LOCAL_AUTHORITY",
            Self::General => "GENERAL",
        }
    }

    /// Strict decode of raw service output. Spaces and hyphens count as underscores.
    pub fn decode(raw: &str) -> Result<Self, ClassificationInvalid> {
        let normalized = normalize_word(raw).replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ClassificationInvalid {
                field: "correspondence type",
                raw: raw.to_string(),
            })
    }
}

impl fmt::Display for CorrespondenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trim, strip surrounding punctuation/quotes, upper-case.
fn normalize_word(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
        .to_uppercase()
}

/// Upper bound of the threat score.
pub const MAX_THREAT_SCORE: u8 = 100;

/// Output of either classifier strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub tone: Tone,
    /// Always within `0..=100`.
    pub threat_score: u8,
    pub correspondence_type: CorrespondenceType,
}

impl ClassificationResult {
    /// Build a result, clamping `threat_score` into `0..=100`.
    pub fn new(tone: Tone, threat_score: i64, correspondence_type: CorrespondenceType) -> Self {
        Self {
            tone,
            threat_score: clamp_score(threat_score),
            correspondence_type,
        }
    }
}

pub fn clamp_score(score: i64) -> u8 {
    score.clamp(0, i64::from(MAX_THREAT_SCORE)) as u8
}

// ── Entities ────────────────────────────────────────────────────────

pub const NAME_UNKNOWN: &str = "Name Unknown";
pub const UNDATED: &str = "undated";

/// Entities pulled out of the letter text. Sentinels are explicit values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySet {
    pub name: String,
    pub date: String,
    pub correspondence_type: CorrespondenceType,
}

impl Default for EntitySet {
    fn default() -> Self {
        Self {
            name: NAME_UNKNOWN.to_string(),
            date: UNDATED.to_string(),
            correspondence_type: CorrespondenceType::default(),
        }
    }
}

// ── Reference rotation ──────────────────────────────────────────────

/// Independent rotation cursors kept per requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceFamily {
    /// Case law; the list itself depends on the correspondence type.
    CaseLaw,
    Maxim,
}

impl ReferenceFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CaseLaw => "case_law",
            Self::Maxim => "maxim",
        }
    }
}

/// Reference material chosen for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSelection {
    pub case_law: String,
    pub maxim: String,
}

// ── Output ──────────────────────────────────────────────────────────

/// Drafted reply text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedResponse {
    pub text: String,
    /// Length in characters (not bytes).
    pub chars: usize,
}

impl GeneratedResponse {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let chars = text.chars().count();
        Self { text, chars }
    }
}

/// How a response reached the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMode {
    Inline,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub channel: DeliveryMode,
    pub success: bool,
}

// ── Collaborator traits ─────────────────────────────────────────────

/// Fetches the raw bytes behind an attachment reference. No retries.
#[async_trait]
pub trait AttachmentSource: Send + Sync {
    async fn fetch(&self, attachment: &Attachment) -> Result<Vec<u8>, ChannelError>;
}

/// Sends text or files back to a requester.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Channel name (e.g. "telegram").
    fn name(&self) -> &str;

    /// Send inline text to an address.
    async fn send_text(&self, address: &str, text: &str) -> Result<(), ChannelError>;

    /// Send a local file as an attachment.
    async fn send_file(
        &self,
        address: &str,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;
}
