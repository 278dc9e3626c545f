use std::sync::Arc;

use newsgate::audit::AuditLogger;
use newsgate::bot::Bot;
use newsgate::channels::{MessageSink, ParseMode, TelegramClient, TelegramSink};
use newsgate::config::Settings;
use newsgate::gateway::{DeepSeekGateway, ModelGateway};
use newsgate::pipeline::FilterPipeline;
use newsgate::stats::{LibSqlStats, StatsStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let settings = Settings::from_env()?;

    tracing::info!(
        model = %settings.model,
        db = %settings.db_path,
        audit = settings.audit_bot_token.is_some() && settings.audit_chat_id.is_some(),
        context_threshold = settings.thresholds.context,
        max_potential = settings.thresholds.max_potential,
        sum_potential = settings.thresholds.sum_potential,
        "newsgate v{} starting",
        env!("CARGO_PKG_VERSION"),
    );

    let gateway: Arc<dyn ModelGateway> = Arc::new(DeepSeekGateway::new(
        settings.deepseek_api_key.clone(),
        settings.model.clone(),
        settings.request_timeout,
    ));

    let stats: Arc<dyn StatsStore> = Arc::new(
        LibSqlStats::new_local(std::path::Path::new(&settings.db_path)).await?,
    );

    let client = TelegramClient::new(settings.bot_token.clone());
    client.health_check().await?;

    let forward: Arc<dyn MessageSink> = Arc::new(TelegramSink::new(
        client.clone(),
        settings.target_chat_id.clone(),
        ParseMode::Plain,
    ));

    // The audit bot is separate from the main bot; without its token or
    // chat id the audit trail is disabled but the pipeline still runs.
    let audit_sink: Option<Arc<dyn MessageSink>> = match (
        settings.audit_bot_token.as_ref(),
        settings.audit_chat_id.as_ref(),
    ) {
        (Some(token), Some(chat_id)) => Some(Arc::new(TelegramSink::new(
            TelegramClient::new(token.clone()),
            chat_id.clone(),
            ParseMode::Html,
        ))),
        _ => None,
    };
    let audit = AuditLogger::new(audit_sink);

    let pipeline = Arc::new(FilterPipeline::new(
        gateway,
        Arc::clone(&stats),
        forward,
        audit,
        settings.thresholds,
    ));

    let bot = Bot::new(client, pipeline, stats, settings.audit_chat_id.clone());
    bot.run().await?;

    Ok(())
}
