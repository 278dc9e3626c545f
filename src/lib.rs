//! newsgate — staged LLM content filtering for a Telegram news feed.

pub mod audit;
pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod stats;
