//! Length-based delivery routing.
//!
//! Responses up to `inline_limit` characters go out as a message. Longer
//! responses are written to `<prefix>_<timestamp>.txt` and sent as a file.
//! There is no chunked inline mode.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::pipeline::types::{DeliveryChannel, DeliveryMode, DeliveryOutcome, GeneratedResponse};

/// Largest response (in characters) delivered inline.
pub const DEFAULT_INLINE_LIMIT: usize = 1900;

/// Longest text message the Telegram Bot API accepts.
pub const MAX_INLINE_LIMIT: usize = 4096;

/// Default file name prefix for exported responses.
pub const DEFAULT_EXPORT_PREFIX: &str = "response";

/// Caption attached to exported responses.
const FILE_CAPTION: &str = "The drafted response is too long for a message, so it is attached as a file.";

/// How many suffixed names to try when a timestamped name is already taken.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Local store for oversized responses.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    prefix: String,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<prefix>_<ISO-8601 basic timestamp>.txt`.
    pub fn file_name(&self, at: DateTime<Utc>) -> String {
        format!("{}_{}.txt", self.prefix, at.format("%Y%m%dT%H%M%S%.6fZ"))
    }

    /// Write `text` to a fresh file and return its path.
    pub async fn export(&self, text: &str) -> Result<PathBuf, std::io::Error> {
        fs::create_dir_all(&self.dir).await?;
        let base = self.file_name(Utc::now());

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                base.clone()
            } else {
                base.replacen(".txt", &format!("-{attempt}.txt"), 1)
            };
            let path = self.dir.join(name);

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(text.as_bytes()).await?;
                    file.flush().await?;
                    debug!(path = %path.display(), bytes = text.len(), "Exported response");
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }

        Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("no free export name for {base}"),
        ))
    }
}

/// Decides inline vs file delivery and performs it.
#[derive(Debug, Clone)]
pub struct ResponseRouter {
    inline_limit: usize,
    artifacts: ArtifactStore,
    keep_exports: bool,
}

impl ResponseRouter {
    pub fn new(inline_limit: usize, artifacts: ArtifactStore, keep_exports: bool) -> Self {
        Self {
            inline_limit,
            artifacts,
            keep_exports,
        }
    }

    pub fn inline_limit(&self) -> usize {
        self.inline_limit
    }

    /// Exact boundary: `chars <= inline_limit` is inline.
    pub fn mode_for(&self, response: &GeneratedResponse) -> DeliveryMode {
        if response.chars <= self.inline_limit {
            DeliveryMode::Inline
        } else {
            DeliveryMode::File
        }
    }

    /// Deliver `response` to `address` on `channel`.
    pub async fn route(
        &self,
        response: &GeneratedResponse,
        channel: &dyn DeliveryChannel,
        address: &str,
    ) -> Result<DeliveryOutcome, PipelineError> {
        let mode = self.mode_for(response);
        match mode {
            DeliveryMode::Inline => {
                channel.send_text(address, &response.text).await?;
            }
            DeliveryMode::File => {
                let path = self.artifacts.export(&response.text).await?;
                if let Err(e) = channel.send_file(address, &path, Some(FILE_CAPTION)).await {
                    warn!(path = %path.display(), "File delivery failed, keeping export");
                    return Err(e.into());
                }
                if !self.keep_exports {
                    self.remove_export(&path).await;
                }
            }
        }

        info!(
            channel = channel.name(),
            mode = ?mode,
            chars = response.chars,
            "Response delivered"
        );
        Ok(DeliveryOutcome {
            channel: mode,
            success: true,
        })
    }

    async fn remove_export(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Could not remove delivered export");
        }
    }
}
