use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use helpdesk_triage::bot::Bot;
use helpdesk_triage::channels::{Channel, CliChannel, TelegramChannel};
use helpdesk_triage::config::{BotConfig, TelegramTransport, TransportMode};
use helpdesk_triage::escalation::TelegramEscalationSink;
use helpdesk_triage::knowledge::KnowledgeBase;
use helpdesk_triage::llm::create_provider;
use helpdesk_triage::triage::TriagePipeline;

/// Stderr logging, plus a daily-rotated file when `log_dir` is set.
///
/// The returned guard flushes the file writer on drop and must outlive `main`'s work.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "helpdesk-triage.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    let config = BotConfig::from_env();
    let _log_guard = init_tracing(config.as_ref().ok().and_then(|c| c.log_dir.as_deref()));

    let config = config.inspect_err(|e| tracing::error!("{e}"))?;

    let knowledge = KnowledgeBase::from_path(&config.faq_path)
        .inspect_err(|e| tracing::error!("{e}"))
        .context("knowledge base is required at startup")?;

    let completion = create_provider(&config.llm)?;

    eprintln!("🤖 Helpdesk Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Model: {} ({})",
        completion.model_name(),
        config.llm.backend.label()
    );
    eprintln!("   FAQs: {} entries from {}", knowledge.len(), config.faq_path.display());

    let telegram = TelegramChannel::new(config.telegram.bot_token.clone());
    let (telegram, channel): (Arc<TelegramChannel>, Arc<dyn Channel>) = match config.telegram.mode {
        TransportMode::Cli => {
            eprintln!("   Mode: cli (type a message, /faqs or /human; Ctrl+D to exit)\n");
            let cli: Arc<dyn Channel> = Arc::new(CliChannel::new());
            (Arc::new(telegram), cli)
        }
        TransportMode::Telegram(transport) => {
            match &transport {
                TelegramTransport::Polling => eprintln!("   Mode: polling\n"),
                TelegramTransport::Webhook { listen, base_url } => {
                    eprintln!("   Mode: webhook on {listen}, public URL {base_url}\n")
                }
            }
            let telegram = Arc::new(telegram.with_transport(transport));
            let channel: Arc<dyn Channel> = telegram.clone();
            (telegram, channel)
        }
    };

    let sink = Arc::new(TelegramEscalationSink::new(
        Arc::clone(&telegram),
        config.telegram.support_chat_id.clone(),
        config.triage.messages.no_query_marker.clone(),
    ));

    let pipeline = Arc::new(TriagePipeline::new(
        Arc::new(knowledge),
        completion,
        sink,
        config.triage,
    ));

    if let Err(e) = channel.health_check().await {
        tracing::warn!("Channel health check failed: {e}");
    }

    Bot::new(pipeline, channel).run().await?;
    Ok(())
}
