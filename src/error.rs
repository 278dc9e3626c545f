//! Error types for newsgate.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Stats store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Model gateway errors.
///
/// Every way a model call can fail is a distinct variant. Callers
/// always receive one of these as a value — nothing panics past the
/// gateway boundary.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Connection to model provider failed: {0}")]
    Connection(String),

    #[error("Model provider request timed out: {0}")]
    Timeout(String),

    #[error("Model provider returned HTTP {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("Malformed response envelope from model provider: {0}")]
    MalformedEnvelope(String),

    #[error("Model reply did not match schema (missing {missing:?}): {raw}")]
    SchemaMismatch { missing: Vec<String>, raw: String },
}

/// Stats store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open stats database: {0}")]
    Open(String),

    #[error("Stats query failed: {0}")]
    Query(String),
}

/// Telegram channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message to chat {chat_id}: {reason}")]
    SendFailed { chat_id: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Channel health check failed: {0}")]
    HealthCheckFailed(String),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
