//! Telegram transport — the only channel this bot speaks.

pub mod telegram;

pub use telegram::{IncomingUpdate, MessageSink, ParseMode, TelegramClient, TelegramSink};
