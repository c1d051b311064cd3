//! Notification channels for delivering listing messages
//!
//! This module provides the channel trait and the channels: LINE Messaging
//! API push, Slack incoming webhooks, generic JSON webhooks and SMTP email.

pub mod email;
pub mod line;
pub mod slack;
pub mod webhook;

use async_trait::async_trait;
use std::time::Duration;

use crate::notifications::Message;

pub use email::{EmailChannel, EmailConfig};
pub use line::{LineChannel, LineConfig};
pub use slack::{SlackChannel, SlackConfig};
pub use webhook::{WebhookChannel, WebhookConfig};

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur during channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// A single attempt ran out of time
    #[error("Delivery attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid channel configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// SMTP transaction failed
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// Generic error
    #[error("Channel error: {0}")]
    Other(String),
}

impl ChannelError {
    /// Whether another attempt could succeed
    ///
    /// Client errors other than 429 mean the request itself is wrong and are
    /// never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(e) => !e.is_builder(),
            Self::Status { status, .. } => *status >= 500,
            Self::RateLimited(_) | Self::Timeout(_) => true,
            // 5xx replies and rejected client input will not change on retry
            Self::Smtp(e) => !(e.is_permanent() || e.is_client()),
            Self::InvalidConfig(_) | Self::Other(_) => false,
        }
    }
}

/// Trait for notification channels
///
/// Implement this trait to create custom notification channels. A `send`
/// is one delivery attempt; retry and per-attempt timeout are applied by the
/// dispatcher.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable channel id, used as the key of delivery outcomes
    fn id(&self) -> &str;

    /// Deliver one message
    async fn send(&self, message: &Message) -> ChannelResult<()>;

    /// Get channel configuration as JSON, without secrets
    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id(),
        })
    }
}

/// Map an HTTP response to a channel result
pub(crate) async fn check_response(response: reqwest::Response) -> ChannelResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read response body".to_string());

    if status.as_u16() == 429 {
        return Err(ChannelError::RateLimited(body));
    }

    Err(ChannelError::Status {
        status: status.as_u16(),
        body: crate::utils::truncate_text(&body, 200),
    })
}

/// Build the shared HTTP client for a channel
pub(crate) fn http_client(timeout_secs: u64) -> ChannelResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("madori/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ChannelError::Other(format!("Failed to create HTTP client: {e}")))
}

/// Validate an endpoint URL
pub(crate) fn validate_url(url: &str, what: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err(format!("{what} cannot be empty"));
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(format!("{what} must start with http:// or https://"));
    }

    url::Url::parse(url).map_err(|e| format!("{what} is not a valid URL: {e}"))?;
    Ok(())
}
