//! Model gateway — the single boundary to the DeepSeek chat API.
//!
//! Callers hand over a prompt, an optional [`ResponseSchema`], and a
//! token budget; they get back a [`ModelReply`] or a [`GatewayError`]
//! value. Transport faults never escape this module as panics, and no
//! retries happen here — a failed call degrades at the stage that made
//! it.

mod decode;
pub mod schema;

pub use decode::{FieldValue, StructuredReply, decode};
pub use schema::{FieldKind, ResponseSchema, SchemaField};

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::debug;

use crate::error::GatewayError;

const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/chat/completions";

/// A reply from the model: structured when a schema was supplied,
/// raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Structured(StructuredReply),
    Text(String),
}

/// Boundary trait for model evaluation. The pipeline depends on this,
/// not on the concrete HTTP client, so tests can script replies.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn evaluate(
        &self,
        prompt: &str,
        schema: Option<&ResponseSchema>,
        max_tokens: u32,
    ) -> Result<ModelReply, GatewayError>;
}

/// DeepSeek chat-completions gateway over reqwest.
pub struct DeepSeekGateway {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl DeepSeekGateway {
    pub fn new(api_key: SecretString, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.into(),
            base_url: DEEPSEEK_API_URL.to_string(),
            timeout,
        }
    }

    /// Point the gateway at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_payload(
        &self,
        prompt: &str,
        schema: Option<&ResponseSchema>,
        max_tokens: u32,
    ) -> serde_json::Value {
        let content = match schema {
            Some(schema) => format!(
                "{prompt}\n\nReturn your answer as strict JSON conforming to this schema:\n{}",
                schema.to_provider_json()
            ),
            None => prompt.to_string(),
        };

        let mut payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": content }],
            "max_tokens": max_tokens,
            "stream": false,
        });
        if schema.is_some() {
            // Ask the provider to enforce JSON output where supported.
            payload["response_format"] = json!({ "type": "json_object" });
        }
        payload
    }
}

#[async_trait]
impl ModelGateway for DeepSeekGateway {
    async fn evaluate(
        &self,
        prompt: &str,
        schema: Option<&ResponseSchema>,
        max_tokens: u32,
    ) -> Result<ModelReply, GatewayError> {
        let payload = self.build_payload(prompt, schema, max_tokens);

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(self.api_key.expose_secret())
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(e.to_string())
                } else {
                    GatewayError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedEnvelope(e.to_string()))?;

        let content = envelope
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                GatewayError::MalformedEnvelope(format!("no choices[0].message.content: {envelope}"))
            })?
            .trim();

        debug!(chars = content.len(), structured = schema.is_some(), "Model reply received");

        match schema {
            Some(schema) => decode(content, schema).map(ModelReply::Structured),
            None => Ok(ModelReply::Text(content.to_string())),
        }
    }
}
