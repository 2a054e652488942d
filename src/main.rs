use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use letter_assist::channels::TelegramChannel;
use letter_assist::config::AppConfig;
use letter_assist::llm::{LlmConfig, create_provider};
use letter_assist::ocr::VisionOcr;
use letter_assist::pipeline::LetterProcessor;
use letter_assist::pipeline::classify::build_classifier;
use letter_assist::pipeline::faq::FaqTable;
use letter_assist::pipeline::rotation::RotationStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = AppConfig::from_env().context("Invalid configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(&config);

    eprintln!("📨 Letter Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   Classifier: {}", config.pipeline.classifier.as_str());
    eprintln!("   OCR model: {}", config.ocr_model);
    eprintln!("   Inline limit: {} chars", config.pipeline.inline_limit);
    eprintln!("   Exports: {}", config.pipeline.export_dir.display());

    // ── LLM + OCR ───────────────────────────────────────────────────────
    let llm = create_provider(&LlmConfig {
        backend: config.backend,
        api_key: config.api_key.clone(),
        model: config.model.clone(),
    })?;

    let ocr = Arc::new(VisionOcr::new(
        config.ocr_api_base.clone(),
        config.ocr_api_key.clone(),
        config.ocr_model.clone(),
        config.http_timeout,
    )?);

    // ── Pipeline ────────────────────────────────────────────────────────
    let faq = match config.faq_path {
        Some(ref path) => FaqTable::load(path)
            .with_context(|| format!("Failed to load FAQ table from {}", path.display()))?,
        None => FaqTable::empty(),
    };
    eprintln!("   FAQ entries: {}", faq.len());

    let classifier = build_classifier(config.pipeline.classifier, Arc::clone(&llm));
    let processor = Arc::new(
        LetterProcessor::new(
            llm,
            ocr,
            classifier,
            RotationStore::new(),
            config.pipeline.clone(),
        )
        .with_faq(faq),
    );

    // ── Channel ─────────────────────────────────────────────────────────
    let Some(ref telegram_config) = config.telegram else {
        anyhow::bail!("TELEGRAM_BOT_TOKEN not set; no channel to listen on");
    };
    let telegram = Arc::new(TelegramChannel::new(telegram_config, config.http_timeout)?);
    eprintln!("   Channels: telegram\n");

    tokio::select! {
        result = telegram.run(processor) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}

/// Console logging plus an optional daily-rolling file.
fn init_tracing(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    let (file_layer, guard) = match config.log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, "letter-assist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();

    guard
}
