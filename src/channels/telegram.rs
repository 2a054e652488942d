//! Telegram channel. Long-polls the Bot API for uploaded letters.
//!
//! Photos and documents become letter requests, `/ask <question>` goes to
//! question answering and `/start` gets a usage message. The same channel
//! downloads attachments and delivers replies.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::TelegramConfig;
use crate::error::ChannelError;
use crate::pipeline::LetterProcessor;
use crate::pipeline::types::{
    Attachment, AttachmentSource, DeliveryChannel, LetterRequest, ReplyTarget,
};

const API_BASE: &str = "https://api.telegram.org";

/// Seconds Telegram holds a `getUpdates` call open.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll.
const POLL_BACKOFF: Duration = Duration::from_secs(5);

const START_MESSAGE: &str = "Send me a photo or scan of a letter and I will draft a reply. \
     Use /ask <question> for general questions. This is education only, not legal advice.";

// ── Bot API payloads ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    from: Option<User>,
    text: Option<String>,
    #[serde(default)]
    photo: Vec<PhotoSize>,
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhotoSize {
    file_id: String,
    width: u32,
    height: u32,
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Document {
    file_id: String,
    file_name: Option<String>,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramFile {
    file_path: Option<String>,
}

/// What an inbound message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Inbound {
    Start,
    Question(String),
    /// A letter upload; `None` when the message carried no usable file.
    Letter(Option<Attachment>),
}

impl Message {
    fn inbound(&self) -> Inbound {
        if let Some((command, rest)) = self.text.as_deref().and_then(parse_command) {
            match command {
                "start" | "help" => return Inbound::Start,
                "ask" => return Inbound::Question(rest.to_string()),
                _ => {}
            }
        }

        // Largest rendition of a photo.
        let photo = self
            .photo
            .iter()
            .max_by_key(|p| p.file_size.unwrap_or(u64::from(p.width) * u64::from(p.height)))
            .map(|p| Attachment::new(&p.file_id).with_mime_type("image/jpeg"));

        let document = self.document.as_ref().map(|d| {
            let mut attachment = Attachment::new(&d.file_id);
            if let Some(ref name) = d.file_name {
                attachment = attachment.with_file_name(name);
            }
            if let Some(ref mime) = d.mime_type {
                attachment = attachment.with_mime_type(mime);
            }
            attachment
        });

        Inbound::Letter(photo.or(document))
    }
}

/// Split `/cmd@bot rest` into `("cmd", "rest")`.
fn parse_command(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start().strip_prefix('/')?;
    let (head, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let command = head.split('@').next().unwrap_or(head);
    Some((command, rest.trim()))
}

// ── Channel ─────────────────────────────────────────────────────────

/// Telegram channel connected to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig, timeout: Option<Duration>) -> Result<Self, ChannelError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| ChannelError::StartupFailed {
            name: "telegram".into(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            bot_token: config.bot_token.clone(),
            allowed_users: config.allowed_users.clone(),
            client,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{API_BASE}/bot{}/{method}", self.bot_token.expose_secret())
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{API_BASE}/file/bot{}/{file_path}", self.bot_token.expose_secret())
    }

    /// Check if a username is in the allowed list.
    pub fn is_user_allowed(&self, username: &str) -> bool {
        self.allowed_users.iter().any(|u| u == "*" || u == username)
    }

    /// Check if any of the provided identities is allowed.
    pub fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        identities.into_iter().any(|id| self.is_user_allowed(id))
    }

    /// POST a JSON Bot API call and unwrap its `result`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, ChannelError> {
        let mut request = self.client.post(self.api_url(method)).json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let resp = request.send().await.map_err(|e| ChannelError::SendFailed {
            name: "telegram".into(),
            reason: format!("{method}: {e}"),
        })?;

        let data: ApiResponse<T> = resp.json().await.map_err(|e| ChannelError::InvalidMessage(
            format!("{method} returned invalid JSON: {e}"),
        ))?;

        match data.result {
            Some(result) if data.ok => Ok(result),
            _ => Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "{method} failed: {}",
                    data.description.unwrap_or_else(|| "no description".into())
                ),
            }),
        }
    }

    /// Verify the token with `getMe`.
    pub async fn health_check(&self) -> Result<(), ChannelError> {
        self.call::<serde_json::Value>("getMe", serde_json::json!({}), None)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, ChannelError> {
        self.call(
            "getUpdates",
            serde_json::json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message"],
            }),
            Some(Duration::from_secs(POLL_TIMEOUT_SECS + 10)),
        )
        .await
    }

    /// Best-effort "typing" indicator.
    async fn send_typing(&self, chat_id: &str) {
        let _ = self
            .client
            .post(self.api_url("sendChatAction"))
            .json(&serde_json::json!({ "chat_id": chat_id, "action": "typing" }))
            .send()
            .await;
    }

    /// Poll for updates until the process exits. Each message runs in its own task.
    pub async fn run(self: Arc<Self>, processor: Arc<LetterProcessor>) -> Result<(), ChannelError> {
        self.health_check().await?;
        info!("Telegram channel listening for letters...");

        let mut offset: i64 = 0;
        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "Telegram poll error");
                    tokio::time::sleep(POLL_BACKOFF).await;
                    continue;
                }
            };

            for update in updates {
                // Advance offset past this update
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else {
                    continue;
                };

                let channel = Arc::clone(&self);
                let processor = Arc::clone(&processor);
                tokio::spawn(async move {
                    channel.handle_message(&processor, message).await;
                });
            }
        }
    }

    async fn handle_message(&self, processor: &LetterProcessor, message: Message) {
        let chat_id = message.chat.id.to_string();
        let user_id = message.from.as_ref().map(|u| u.id.to_string());
        let username = message
            .from
            .as_ref()
            .and_then(|u| u.username.as_deref())
            .unwrap_or("unknown");

        // Check allowlist against both username and numeric ID
        let mut identities = vec![username];
        if let Some(ref id) = user_id {
            identities.push(id.as_str());
        }
        if !self.is_any_user_allowed(identities) {
            warn!(
                username,
                user_id = user_id.as_deref().unwrap_or("unknown"),
                "Telegram: ignoring message from unauthorized user"
            );
            return;
        }

        let requester = user_id.unwrap_or_else(|| chat_id.clone());
        let reply_to = ReplyTarget {
            context: chat_id.clone(),
            requester: requester.clone(),
        };

        match message.inbound() {
            Inbound::Start => {
                if let Err(e) = self.send_text(&chat_id, START_MESSAGE).await {
                    warn!(error = %e, "Could not send start message");
                }
            }
            Inbound::Question(question) => {
                self.send_typing(&chat_id).await;
                let _ = processor
                    .handle_question(&requester, &reply_to, &question, self)
                    .await;
            }
            Inbound::Letter(attachment) => {
                self.send_typing(&chat_id).await;
                let request = LetterRequest::new(requester, attachment, reply_to);
                let _ = processor.handle(&request, self, self).await;
            }
        }
    }

    /// Map a Bot API send response onto the channel error taxonomy.
    async fn check_send(
        &self,
        resp: reqwest::Response,
        method: &str,
        recipient: &str,
    ) -> Result<(), ChannelError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::FORBIDDEN {
            return Err(ChannelError::Forbidden {
                name: "telegram".into(),
                recipient: recipient.to_string(),
            });
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ChannelError::SendFailed {
            name: "telegram".into(),
            reason: format!("{method} returned {status}: {body}"),
        })
    }
}

// ── Pipeline collaborators ──────────────────────────────────────────

#[async_trait]
impl AttachmentSource for TelegramChannel {
    async fn fetch(&self, attachment: &Attachment) -> Result<Vec<u8>, ChannelError> {
        let download_failed = |reason: String| ChannelError::DownloadFailed {
            name: "telegram".into(),
            reason,
        };

        let file: TelegramFile = self
            .call(
                "getFile",
                serde_json::json!({ "file_id": attachment.reference }),
                None,
            )
            .await
            .map_err(|e| download_failed(e.to_string()))?;
        let file_path = file
            .file_path
            .ok_or_else(|| download_failed("getFile returned no file_path".into()))?;

        let resp = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(|e| download_failed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(download_failed(format!("HTTP {}", resp.status().as_u16())));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| download_failed(e.to_string()))?;
        debug!(file_path = %file_path, bytes = bytes.len(), "Telegram file downloaded");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_text(&self, address: &str, text: &str) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&serde_json::json!({ "chat_id": address, "text": text }))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;
        self.check_send(resp, "sendMessage", address).await
    }

    async fn send_file(
        &self,
        address: &str,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("response.txt");

        let file_bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{}: {e}", path.display()),
            })?;
        let part = Part::bytes(file_bytes).file_name(file_name.to_string());

        let mut form = Form::new()
            .text("chat_id", address.to_string())
            .part("document", part);
        if let Some(cap) = caption {
            form = form.text("caption", cap.to_string());
        }

        let resp = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;
        self.check_send(resp, "sendDocument", address).await?;

        info!(chat_id = address, file_name, "Telegram document sent");
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
