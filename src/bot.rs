//! Bot loop — routes Telegram updates to admin commands or the
//! filtration pipeline.
//!
//! Each non-command message gets its own spawned task; the pipeline
//! keeps all per-message state in locals, so runs are free to overlap.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{error, info, warn};

use crate::channels::{IncomingUpdate, ParseMode, TelegramClient};
use crate::error::Result;
use crate::pipeline::FilterPipeline;
use crate::stats::{StatsStore, StatsSummary};

/// The assembled bot.
pub struct Bot {
    client: TelegramClient,
    pipeline: Arc<FilterPipeline>,
    stats: Arc<dyn StatsStore>,
    /// When set, `/stats` and `/zero` are honored only from this chat.
    admin_chat_id: Option<String>,
}

impl Bot {
    pub fn new(
        client: TelegramClient,
        pipeline: Arc<FilterPipeline>,
        stats: Arc<dyn StatsStore>,
        admin_chat_id: Option<String>,
    ) -> Self {
        Self {
            client,
            pipeline,
            stats,
            admin_chat_id,
        }
    }

    /// Poll updates forever, dispatching each one.
    pub async fn run(&self) -> Result<()> {
        let mut updates = std::pin::pin!(self.client.updates());
        while let Some(update) = updates.next().await {
            self.dispatch(update).await;
        }
        info!("Update stream ended, bot stopping");
        Ok(())
    }

    async fn dispatch(&self, update: IncomingUpdate) {
        match command_of(update.text.trim()) {
            Some("stats") => self.handle_stats(&update.chat_id).await,
            Some("zero") => self.handle_zero(&update.chat_id).await,
            _ => self.handle_message(update),
        }
    }

    fn is_admin(&self, chat_id: &str) -> bool {
        match &self.admin_chat_id {
            Some(admin) => admin == chat_id,
            None => true,
        }
    }

    async fn handle_stats(&self, chat_id: &str) {
        if !self.is_admin(chat_id) {
            warn!(chat_id, "Ignoring /stats from non-admin chat");
            return;
        }
        let reply = match self.stats.get_stats().await {
            Ok(summary) => render_stats(&summary),
            Err(e) => {
                error!(error = %e, "Failed to read stats");
                "Failed to read statistics.".to_string()
            }
        };
        self.reply(chat_id, &reply).await;
    }

    async fn handle_zero(&self, chat_id: &str) {
        if !self.is_admin(chat_id) {
            warn!(chat_id, "Ignoring /zero from non-admin chat");
            return;
        }
        let reply = match self.stats.reset_all().await {
            Ok(()) => "Incoming and outgoing counters reset to zero.".to_string(),
            Err(e) => {
                error!(error = %e, "Failed to reset stats");
                "Failed to reset statistics.".to_string()
            }
        };
        self.reply(chat_id, &reply).await;
    }

    /// Run the pipeline in its own task so slow model calls never stall
    /// the update loop.
    fn handle_message(&self, update: IncomingUpdate) {
        let pipeline = Arc::clone(&self.pipeline);
        let client = self.client.clone();
        tokio::spawn(async move {
            let outcome = pipeline.run(&update.text).await;
            if let Some(notice) = outcome.failure_notice {
                if let Err(e) = client
                    .send_message(&update.chat_id, &notice, ParseMode::Plain)
                    .await
                {
                    warn!(error = %e, "Failed to deliver forwarding-failure notice");
                }
            }
        });
    }

    async fn reply(&self, chat_id: &str, text: &str) {
        if let Err(e) = self.client.send_message(chat_id, text, ParseMode::Plain).await {
            warn!(error = %e, "Failed to send command reply");
        }
    }
}

/// Command name of a `/command` message, if it is one. Group clients
/// send commands as `/command@botname`, so the mention is stripped.
fn command_of(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('/')?;
    let token = rest.split_whitespace().next()?;
    token.split('@').next()
}

/// Two-section stats report: all-time and trailing 24 hours.
fn render_stats(summary: &StatsSummary) -> String {
    format!(
        "Current statistics:\n\
         All time:\n\
         Incoming messages: {}\n\
         Outgoing messages: {}\n\
         Forward rate: {:.2}%\n\
         \n\
         Last 24 hours:\n\
         Incoming messages: {}\n\
         Outgoing messages: {}\n\
         Forward rate: {:.2}%",
        summary.total_incoming,
        summary.total_outgoing,
        summary.total_forward_rate_pct(),
        summary.last_day_incoming,
        summary.last_day_outgoing,
        summary.last_day_forward_rate_pct(),
    )
}
