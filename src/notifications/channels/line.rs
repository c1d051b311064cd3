//! LINE Messaging API push channel
//!
//! Pushes a text message to one user with a channel access token.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{check_response, http_client, validate_url, Channel, ChannelError, ChannelResult};
use crate::notifications::Message;
use crate::utils::truncate_text;

/// Longest text the push API accepts in one text message
pub const MAX_TEXT_CHARS: usize = 5000;

const DEFAULT_ENDPOINT: &str = "https://api.line.me/v2/bot/message/push";

/// LINE channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineConfig {
    /// Channel access token
    pub access_token: String,
    /// Recipient user id
    pub user_id: String,
    /// Push endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout() -> u64 {
    15
}

impl LineConfig {
    pub fn new(access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            user_id: user_id.into(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout(),
        }
    }

    /// Point the channel at another endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.access_token.trim().is_empty() {
            return Err("LINE access token cannot be empty".to_string());
        }
        if self.user_id.trim().is_empty() {
            return Err("LINE user id cannot be empty".to_string());
        }
        validate_url(&self.endpoint, "LINE endpoint")?;
        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

pub struct LineChannel {
    config: LineConfig,
    client: Client,
}

impl LineChannel {
    pub fn new(config: LineConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;
        let client = http_client(config.timeout_secs)?;
        Ok(Self { config, client })
    }

    fn build_payload(&self, message: &Message) -> serde_json::Value {
        let text = format!("{}\n{}", message.subject, message.text);
        serde_json::json!({
            "to": self.config.user_id,
            "messages": [
                { "type": "text", "text": truncate_text(&text, MAX_TEXT_CHARS) }
            ],
        })
    }
}

#[async_trait]
impl Channel for LineChannel {
    fn id(&self) -> &str {
        "line"
    }

    async fn send(&self, message: &Message) -> ChannelResult<()> {
        let payload = self.build_payload(message);

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.access_token)
            .json(&payload)
            .send()
            .await?;
        check_response(response).await?;

        tracing::debug!(channel = "line", "LINE push delivered");
        Ok(())
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id(),
            "endpoint": self.config.endpoint,
            "timeout_secs": self.config.timeout_secs,
        })
    }
}
