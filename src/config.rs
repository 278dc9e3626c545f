//! Process configuration — loaded once from the environment at startup.

use std::time::Duration;

use secrecy::SecretString;
use tracing::warn;

use crate::error::ConfigError;

/// Default DeepSeek model.
const DEFAULT_MODEL: &str = "deepseek-chat";

/// Default per-call gateway timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Thresholds for the staged filtration decision.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    /// Stage 2 passes iff the eight context sub-scores sum to at least this.
    pub context: i64,
    /// Peak condition: at least one characteristic score must reach this.
    pub max_potential: i64,
    /// The five characteristic scores must sum to at least this.
    pub sum_potential: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            context: 6,
            max_potential: 8,
            sum_potential: 6.5,
        }
    }
}

/// Bot configuration.
///
/// Missing required values prevent startup. Missing audit values only
/// degrade the audit trail and admin-command restriction.
#[derive(Debug, Clone)]
pub struct Settings {
    /// DeepSeek API key.
    pub deepseek_api_key: SecretString,
    /// Main bot token (receives messages, forwards accepted ones).
    pub bot_token: String,
    /// Destination chat for accepted messages.
    pub target_chat_id: String,
    /// Token of the audit bot. Audit delivery is disabled without it.
    pub audit_bot_token: Option<String>,
    /// Chat that receives audit reports and may run admin commands.
    pub audit_chat_id: Option<String>,
    /// Model name sent to the provider.
    pub model: String,
    /// Path to the stats database file.
    pub db_path: String,
    /// Per-call timeout at the gateway boundary.
    pub request_timeout: Duration,
    /// Decision thresholds.
    pub thresholds: Thresholds,
}

impl Settings {
    /// Load settings from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let deepseek_api_key =
            SecretString::from(require_env("DEEPSEEK_API_KEY")?);
        let bot_token = require_env("TELEGRAM_BOT_TOKEN")?;
        let target_chat_id = require_env("TARGET_CHAT_ID")?;

        let audit_bot_token = optional_env("AUDIT_BOT_TOKEN");
        let audit_chat_id = optional_env("AUDIT_CHAT_ID");
        if audit_bot_token.is_none() {
            warn!("AUDIT_BOT_TOKEN not set — audit reports will not be delivered");
        }
        if audit_chat_id.is_none() {
            warn!("AUDIT_CHAT_ID not set — /stats and /zero are unrestricted");
        }

        let thresholds = Thresholds {
            context: parse_env("CONTEXT_THRESHOLD", Thresholds::default().context)?,
            max_potential: parse_env("MAX_POTENTIAL", Thresholds::default().max_potential)?,
            sum_potential: parse_env("SUM_POTENTIAL", Thresholds::default().sum_potential)?,
        };

        let timeout_secs: u64 = parse_env("GATEWAY_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;

        Ok(Self {
            deepseek_api_key,
            bot_token,
            target_chat_id,
            audit_bot_token,
            audit_chat_id,
            model: optional_env("DEEPSEEK_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            db_path: optional_env("STATS_DB_PATH")
                .unwrap_or_else(|| "./data/stats.db".to_string()),
            request_timeout: Duration::from_secs(timeout_secs),
            thresholds,
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    optional_env(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Read an env var, treating empty values as absent.
fn optional_env(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{e}"),
        }),
        None => Ok(default),
    }
}
