//! SMTP email channel
//!
//! Sends each message as a `multipart/alternative` mail with a plain-text and
//! an HTML part, over STARTTLS with login.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as Email, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Channel, ChannelError, ChannelResult};
use crate::notifications::Message;

/// Email channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailConfig {
    /// SMTP server host
    #[serde(default = "default_host")]
    pub smtp_host: String,
    /// SMTP submission port (STARTTLS)
    #[serde(default = "default_port")]
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    /// Sender address
    pub from: String,
    /// Recipient addresses
    pub to: Vec<String>,
    /// SMTP command timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_port() -> u16 {
    587
}

fn default_timeout() -> u64 {
    30
}

impl EmailConfig {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        from: impl Into<String>,
        to: Vec<String>,
    ) -> Self {
        Self {
            smtp_host: default_host(),
            smtp_port: default_port(),
            username: username.into(),
            password: password.into(),
            from: from.into(),
            to,
            timeout_secs: default_timeout(),
        }
    }

    /// Use another SMTP server
    pub fn with_server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.smtp_host = host.into();
        self.smtp_port = port;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.smtp_host.trim().is_empty() {
            return Err("SMTP host cannot be empty".to_string());
        }
        if self.smtp_port == 0 {
            return Err("SMTP port must be greater than 0".to_string());
        }
        if self.username.trim().is_empty() {
            return Err("SMTP username cannot be empty".to_string());
        }
        if self.password.is_empty() {
            return Err("SMTP password cannot be empty".to_string());
        }
        parse_mailbox(&self.from, "sender")?;
        if self.to.is_empty() {
            return Err("At least one recipient is required".to_string());
        }
        for to in &self.to {
            parse_mailbox(to, "recipient")?;
        }
        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn parse_mailbox(address: &str, what: &str) -> Result<Mailbox, String> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| format!("Invalid {what} address {address:?}: {e}"))
}

pub struct EmailChannel {
    config: EmailConfig,
    from: Mailbox,
    to: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailChannel {
    pub fn new(config: EmailConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let from = parse_mailbox(&config.from, "sender").map_err(ChannelError::InvalidConfig)?;
        let to = config
            .to
            .iter()
            .map(|addr| parse_mailbox(addr, "recipient"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ChannelError::InvalidConfig)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        Ok(Self {
            config,
            from,
            to,
            transport,
        })
    }

    /// Build the mail for one message
    fn build_email(&self, message: &Message) -> ChannelResult<Email> {
        let mut builder = Email::builder()
            .from(self.from.clone())
            .subject(message.subject.clone());
        for to in &self.to {
            builder = builder.to(to.clone());
        }

        builder
            .multipart(MultiPart::alternative_plain_html(
                plain_body(message),
                html_body(message),
            ))
            .map_err(|e| ChannelError::Other(format!("Failed to build email: {e}")))
    }
}

fn plain_body(message: &Message) -> String {
    format!("{}\n{}\n{}", message.subject, "=".repeat(40), message.text)
}

/// HTML part: subject as heading, one line per paragraph, URLs as links
fn html_body(message: &Message) -> String {
    let lines: String = message
        .text
        .lines()
        .map(|line| {
            if line.starts_with("http://") || line.starts_with("https://") {
                format!(
                    "<p><a href=\"{}\">{}</a></p>",
                    html_escape::encode_double_quoted_attribute(line),
                    html_escape::encode_text(line)
                )
            } else {
                format!("<p>{}</p>", html_escape::encode_text(line))
            }
        })
        .collect();

    format!(
        "<html><body>\n<h2>{}</h2>\n{}\n</body></html>",
        html_escape::encode_text(&message.subject),
        lines
    )
}

#[async_trait]
impl Channel for EmailChannel {
    fn id(&self) -> &str {
        "email"
    }

    async fn send(&self, message: &Message) -> ChannelResult<()> {
        let email = self.build_email(message)?;
        self.transport.send(email).await?;

        tracing::debug!(channel = "email", recipients = self.to.len(), "Email sent");
        Ok(())
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id(),
            "smtp_host": self.config.smtp_host,
            "smtp_port": self.config.smtp_port,
            "recipients": self.to.len(),
        })
    }
}
