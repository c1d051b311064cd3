//! Webhook notification channel
//!
//! This module provides a webhook channel for sending listing messages as
//! JSON via HTTP POST requests.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{check_response, http_client, validate_url, Channel, ChannelError, ChannelResult};
use crate::notifications::Message;

/// Webhook channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL endpoint
    pub url: String,
    /// Optional authentication token (sent as Bearer token)
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Custom headers to include in requests
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl WebhookConfig {
    /// Create a new webhook configuration
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            headers: HashMap::new(),
            timeout_secs: default_timeout(),
        }
    }

    /// Set authentication token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        validate_url(&self.url, "Webhook URL")?;

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Webhook notification channel
///
/// Sends messages as JSON payloads via HTTP POST requests.
///
/// # Payload Format
///
/// ```json
/// {
///   "event": "new_listing",
///   "subject": "【新着物件】メゾン新宿",
///   "text": "メゾン新宿\n8.5万円 / 1K / 25.5m2\n...",
///   "listing": {
///     "id": "jnc_000104425407",
///     "url": "https://suumo.jp/chintai/jnc_000104425407/",
///     "title": "メゾン新宿",
///     "price": "8.5万円",
///     "layout": "1K"
///   },
///   "sent_at": "2024-01-01T12:00:00Z"
/// }
/// ```
///
/// Operator alerts use `"event": "alert"` and `"listing": null`.
///
/// # Example
///
/// ```rust,ignore
/// use madori::notifications::channels::webhook::{WebhookChannel, WebhookConfig};
///
/// let config = WebhookConfig::new("https://hooks.example.com/listings")
///     .with_auth_token("secret-token")
///     .with_header("X-Custom-Header", "value")
///     .with_timeout(15);
///
/// let channel = WebhookChannel::new("webhook", config)?;
/// channel.send(&message).await?;
/// ```
pub struct WebhookChannel {
    id: String,
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    /// Create a new webhook channel
    pub fn new(id: impl Into<String>, config: WebhookConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;
        let client = http_client(config.timeout_secs)?;

        Ok(Self {
            id: id.into(),
            config,
            client,
        })
    }

    /// Create a simple webhook channel with just a URL
    pub fn from_url(url: impl Into<String>) -> ChannelResult<Self> {
        Self::new("webhook", WebhookConfig::new(url))
    }

    /// Get the webhook URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Build the webhook payload from a message
    fn build_payload(&self, message: &Message) -> serde_json::Value {
        serde_json::json!({
            "event": message.kind.as_str(),
            "subject": message.subject,
            "text": message.text,
            "listing": message.listing,
            "sent_at": Utc::now().to_rfc3339(),
        })
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, message: &Message) -> ChannelResult<()> {
        let payload = self.build_payload(message);

        let mut request = self.client.post(&self.config.url);

        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.json(&payload).send().await?;
        check_response(response).await?;

        tracing::debug!(channel = %self.id, url = %self.config.url, "Webhook delivered");
        Ok(())
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "url": self.config.url,
            "timeout_secs": self.config.timeout_secs,
            "has_auth": self.config.auth_token.is_some(),
            "custom_headers": self.config.headers.keys().collect::<Vec<_>>(),
        })
    }
}
