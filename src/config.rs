//! Configuration types, read from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmBackend;
use crate::ocr::{DEFAULT_OCR_API_BASE, DEFAULT_OCR_MODEL};
use crate::pipeline::classify::ClassifierMode;
use crate::pipeline::router::{DEFAULT_EXPORT_PREFIX, DEFAULT_INLINE_LIMIT, MAX_INLINE_LIMIT};

/// Default drafting model.
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Pipeline behaviour settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Which classifier strategy to use.
    pub classifier: ClassifierMode,
    /// Largest response (characters) delivered inline.
    pub inline_limit: usize,
    /// Directory for exported oversized responses.
    pub export_dir: PathBuf,
    /// File name prefix for exported responses.
    pub export_prefix: String,
    /// Keep exported files after successful delivery.
    pub keep_exports: bool,
    /// Max output tokens for the drafting call.
    pub max_tokens: u32,
    /// Sampling temperature for the drafting call.
    pub temperature: f32,
    /// Deliver responses privately to the requester instead of in the original chat.
    pub private_delivery: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierMode::Rules,
            inline_limit: DEFAULT_INLINE_LIMIT,
            export_dir: PathBuf::from("./exports"),
            export_prefix: DEFAULT_EXPORT_PREFIX.to_string(),
            keep_exports: false,
            max_tokens: 1500,
            temperature: 0.7,
            private_delivery: false,
        }
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids; `*` allows everyone.
    pub allowed_users: Vec<String>,
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
    pub ocr_api_base: String,
    pub ocr_api_key: SecretString,
    pub ocr_model: String,
    /// Request timeout for the HTTP adapters. `None` means no timeout.
    pub http_timeout: Option<Duration>,
    pub pipeline: PipelineConfig,
    pub telegram: Option<TelegramConfig>,
    pub faq_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend = match var("LETTER_ASSIST_BACKEND") {
            Some(value) => LlmBackend::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                key: "LETTER_ASSIST_BACKEND".into(),
                message: format!("expected openai or anthropic, got {value:?}"),
            })?,
            None => LlmBackend::OpenAi,
        };

        let api_key = var(backend.api_key_var())
            .ok_or_else(|| ConfigError::MissingEnvVar(backend.api_key_var().to_string()))?;

        let ocr_api_key = var("LETTER_ASSIST_OCR_API_KEY")
            .or_else(|| var("OPENAI_API_KEY"))
            .ok_or_else(|| ConfigError::MissingEnvVar("LETTER_ASSIST_OCR_API_KEY".into()))?;

        let classifier = match var("LETTER_ASSIST_CLASSIFIER") {
            Some(value) => {
                ClassifierMode::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                    key: "LETTER_ASSIST_CLASSIFIER".into(),
                    message: format!("expected rules or llm, got {value:?}"),
                })?
            }
            None => ClassifierMode::Rules,
        };

        let defaults = PipelineConfig::default();
        let inline_limit: usize =
            parse_or(&var, "LETTER_ASSIST_INLINE_LIMIT", defaults.inline_limit)?;
        if inline_limit == 0 || inline_limit > MAX_INLINE_LIMIT {
            return Err(ConfigError::InvalidValue {
                key: "LETTER_ASSIST_INLINE_LIMIT".into(),
                message: format!("must be between 1 and {MAX_INLINE_LIMIT}"),
            });
        }

        let pipeline = PipelineConfig {
            classifier,
            inline_limit,
            export_dir: var("LETTER_ASSIST_EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.export_dir),
            export_prefix: var("LETTER_ASSIST_EXPORT_PREFIX").unwrap_or(defaults.export_prefix),
            keep_exports: parse_bool_or(&var, "LETTER_ASSIST_KEEP_EXPORTS", defaults.keep_exports)?,
            max_tokens: parse_or(&var, "LETTER_ASSIST_MAX_TOKENS", defaults.max_tokens)?,
            temperature: parse_or(&var, "LETTER_ASSIST_TEMPERATURE", defaults.temperature)?,
            private_delivery: parse_bool_or(
                &var,
                "LETTER_ASSIST_PRIVATE_DELIVERY",
                defaults.private_delivery,
            )?,
        };

        let http_timeout = match parse_or::<u64>(&var, "LETTER_ASSIST_HTTP_TIMEOUT_SECS", 0)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let telegram = var("TELEGRAM_BOT_TOKEN").map(|token| TelegramConfig {
            bot_token: SecretString::from(token),
            allowed_users: var("TELEGRAM_ALLOWED_USERS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        });

        Ok(Self {
            backend,
            api_key: SecretString::from(api_key),
            model: var("LETTER_ASSIST_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            ocr_api_base: var("LETTER_ASSIST_OCR_API_BASE")
                .unwrap_or_else(|| DEFAULT_OCR_API_BASE.to_string()),
            ocr_api_key: SecretString::from(ocr_api_key),
            ocr_model: var("LETTER_ASSIST_OCR_MODEL")
                .unwrap_or_else(|| DEFAULT_OCR_MODEL.to_string()),
            http_timeout,
            pipeline,
            telegram,
            faq_path: var("LETTER_ASSIST_FAQ_FILE").map(PathBuf::from),
            log_dir: var("LETTER_ASSIST_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
        None => Ok(default),
    }
}

fn parse_bool_or(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match var(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {v:?}"),
        }),
    }
}
