//! Slack incoming-webhook channel

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{check_response, http_client, validate_url, Channel, ChannelError, ChannelResult};
use crate::notifications::{Message, MessageKind};

/// Slack channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Incoming webhook URL
    pub webhook_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl SlackConfig {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            timeout_secs: default_timeout(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        validate_url(&self.webhook_url, "Slack webhook URL")?;

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Posts `{"text": ...}` to a Slack incoming webhook
pub struct SlackChannel {
    config: SlackConfig,
    client: Client,
}

impl SlackChannel {
    pub fn new(config: SlackConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;
        let client = http_client(config.timeout_secs)?;
        Ok(Self { config, client })
    }

    fn build_payload(&self, message: &Message) -> serde_json::Value {
        let prefix = match message.kind {
            MessageKind::NewListing => ":house:",
            MessageKind::Alert => ":warning:",
        };

        serde_json::json!({
            "text": format!(
                "{prefix} *{}*\n{}",
                escape_mrkdwn(&message.subject),
                escape_mrkdwn(&message.text)
            ),
        })
    }
}

/// Escape the three characters Slack treats as control sequences
pub fn escape_mrkdwn(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

#[async_trait]
impl Channel for SlackChannel {
    fn id(&self) -> &str {
        "slack"
    }

    async fn send(&self, message: &Message) -> ChannelResult<()> {
        let payload = self.build_payload(message);

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await?;
        check_response(response).await?;

        tracing::debug!(channel = "slack", "Slack message delivered");
        Ok(())
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id(),
            "timeout_secs": self.config.timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_mrkdwn() {
        assert_eq!(escape_mrkdwn("a < b & c > d"), "a &lt; b &amp; c &gt; d");
        assert_eq!(escape_mrkdwn("8.5万円"), "8.5万円");
    }

    #[test]
    fn test_payload_is_escaped() {
        let channel = SlackChannel::new(SlackConfig::new("https://hooks.slack.com/services/T/B/X")).unwrap();
        let payload = channel.build_payload(&Message::alert("<script> & friends"));
        let text = payload["text"].as_str().unwrap();

        assert!(text.starts_with(":warning:"));
        assert!(text.contains("&lt;script&gt; &amp; friends"));
    }

    #[test]
    fn test_invalid_config() {
        assert!(SlackChannel::new(SlackConfig::new("")).is_err());
    }

    #[test]
    fn test_webhook_url_not_exposed() {
        let channel = SlackChannel::new(SlackConfig::new("https://hooks.slack.com/services/T/B/SECRET")).unwrap();
        assert!(!channel.config().to_string().contains("SECRET"));
    }
}
