//! Telegram Bot API client — long-polls for updates, sends chunked
//! messages with parse-mode fallback.

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout in seconds for getUpdates.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Markup dialect for an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Plain,
    Html,
}

/// One inbound text message from the Bot API.
#[derive(Debug, Clone)]
pub struct IncomingUpdate {
    pub chat_id: String,
    pub text: String,
}

/// Minimal Telegram Bot API client over reqwest.
#[derive(Clone)]
pub struct TelegramClient {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    /// Send a text message, splitting at the API's 4096-char limit.
    ///
    /// HTML sends retry without `parse_mode` if Telegram rejects the
    /// markup, so a formatting slip degrades instead of losing the
    /// message.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: ParseMode,
    ) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(chat_id, &chunk, parse_mode).await?;
        }
        Ok(())
    }

    async fn send_message_chunk(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: ParseMode,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if parse_mode == ParseMode::Html {
            body["parse_mode"] = serde_json::Value::String("HTML".into());
        }

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                chat_id: chat_id.to_string(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            return Ok(());
        }

        let first_status = resp.status();
        if parse_mode == ParseMode::Html {
            tracing::warn!(
                status = ?first_status,
                "sendMessage with HTML failed; retrying without parse_mode"
            );
            let plain = serde_json::json!({ "chat_id": chat_id, "text": text });
            let retry = self
                .client
                .post(self.api_url("sendMessage"))
                .json(&plain)
                .send()
                .await
                .map_err(|e| ChannelError::SendFailed {
                    chat_id: chat_id.to_string(),
                    reason: e.to_string(),
                })?;
            if retry.status().is_success() {
                return Ok(());
            }
            let retry_err = retry.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                chat_id: chat_id.to_string(),
                reason: format!("sendMessage failed (html: {first_status}, plain: {retry_err})"),
            });
        }

        let err = resp.text().await.unwrap_or_default();
        Err(ChannelError::SendFailed {
            chat_id: chat_id.to_string(),
            reason: format!("sendMessage returned {first_status}: {err}"),
        })
    }

    /// Verify the token by calling getMe.
    pub async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::HealthCheckFailed(format!(
                "getMe returned {}",
                resp.status()
            )))
        }
    }

    /// Long-poll getUpdates and stream inbound text messages.
    ///
    /// Non-text updates are skipped; transport errors back off for five
    /// seconds and polling continues.
    pub fn updates(&self) -> impl Stream<Item = IncomingUpdate> + use<> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let client = self.client.clone();
        let url = self.api_url("getUpdates");

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            tracing::info!("Telegram listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"],
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(serde_json::Value::as_array)
                else {
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64)
                    {
                        offset = uid + 1;
                    }

                    let Some(message) = update.get("message") else {
                        continue;
                    };
                    let Some(text) = message.get("text").and_then(serde_json::Value::as_str)
                    else {
                        continue;
                    };
                    let Some(chat_id) = message
                        .get("chat")
                        .and_then(|c| c.get("id"))
                        .and_then(serde_json::Value::as_i64)
                    else {
                        continue;
                    };

                    let incoming = IncomingUpdate {
                        chat_id: chat_id.to_string(),
                        text: text.to_string(),
                    };
                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        })
    }
}

// ── Message sink ────────────────────────────────────────────────────

/// A fixed destination for outbound text — the seam between the
/// pipeline/audit logic and the Telegram transport.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, text: &str) -> Result<(), ChannelError>;
}

/// A Telegram chat bound to a client and parse mode.
pub struct TelegramSink {
    client: TelegramClient,
    chat_id: String,
    parse_mode: ParseMode,
}

impl TelegramSink {
    pub fn new(client: TelegramClient, chat_id: String, parse_mode: ParseMode) -> Self {
        Self {
            client,
            chat_id,
            parse_mode,
        }
    }
}

#[async_trait]
impl MessageSink for TelegramSink {
    async fn deliver(&self, text: &str) -> Result<(), ChannelError> {
        self.client
            .send_message(&self.chat_id, text, self.parse_mode)
            .await
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts at the last
/// char boundary that fits. Cyrillic bodies are the normal case here,
/// so the byte limit rarely lands on a char boundary by itself.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let boundary = floor_char_boundary(remaining, max_len);
        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            // Don't split at position 0 (infinite loop guard)
            .filter(|&at| at > 0)
            .unwrap_or(boundary);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

/// Largest char boundary at or below `index`.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut at = index.min(text.len());
    while !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}
