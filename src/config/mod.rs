//! Configuration management for the madori monitor
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files, and turns it into the run's components.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::crawler::{HttpFetcher, DEFAULT_USER_AGENT};
use crate::notifications::channels::{
    EmailChannel, EmailConfig, LineChannel, LineConfig, SlackChannel, SlackConfig, WebhookChannel,
    WebhookConfig,
};
use crate::notifications::Dispatcher;
use crate::parser::{ExtractionRules, HtmlExtractor, RuleSet};
use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Search page and fetch behavior
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Identity store location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Notification channels
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Extraction rules
    #[serde(default)]
    pub rules: RulesConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Search page and fetch behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Search-results URL to watch
    #[serde(default)]
    pub search_url: String,

    /// Per-attempt fetch timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Fetch retries after the first attempt
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_fetch_retries() -> u32 {
    2
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            search_url: String::new(),
            request_timeout_secs: default_request_timeout(),
            fetch_retries: default_fetch_retries(),
            user_agent: default_user_agent(),
        }
    }
}

/// Identity store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/seen.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Notification channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub line: Option<LineConfig>,

    #[serde(default)]
    pub slack: Option<SlackConfig>,

    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,

    #[serde(default)]
    pub email: Option<EmailConfig>,

    /// Retry policy applied per channel
    #[serde(default)]
    pub retry: RetryConfig,

    /// Upper bound on one delivery attempt in seconds
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// Deliver to all channels of a listing at once
    #[serde(default = "default_concurrent")]
    pub concurrent: bool,
}

fn default_attempt_timeout() -> u64 {
    20
}

fn default_concurrent() -> bool {
    true
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            line: None,
            slack: None,
            webhooks: Vec::new(),
            email: None,
            retry: RetryConfig::default(),
            attempt_timeout_secs: default_attempt_timeout(),
            concurrent: default_concurrent(),
        }
    }
}

impl ChannelsConfig {
    /// Number of configured channels
    pub fn count(&self) -> usize {
        usize::from(self.line.is_some())
            + usize::from(self.slack.is_some())
            + usize::from(self.email.is_some())
            + self.webhooks.len()
    }
}

/// Extraction rule configuration
///
/// `custom` replaces the preset entirely when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub preset: RuleSet,

    #[serde(default)]
    pub custom: Option<ExtractionRules>,
}

impl RulesConfig {
    /// Rules in effect
    pub fn resolve(&self) -> ExtractionRules {
        self.custom.clone().unwrap_or_else(|| self.preset.rules())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_log_format() -> String {
    String::from("text")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// First set, non-empty variable among `names`
fn env_any(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env_any(&[name]) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{name} has an invalid value: {raw}")),
        None => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Fails when a numeric variable does not parse, or when only one of the
    /// LINE token and LINE user id is set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = env_any(&["MADORI_SEARCH_URL", "SUUMO_SEARCH_URL"]) {
            config.monitor.search_url = url;
        }
        if let Some(secs) = env_parse::<u64>("MADORI_REQUEST_TIMEOUT")? {
            config.monitor.request_timeout_secs = secs;
        }
        if let Some(retries) = env_parse::<u32>("MADORI_FETCH_RETRIES")? {
            config.monitor.fetch_retries = retries;
        }
        if let Some(ua) = env_any(&["MADORI_USER_AGENT"]) {
            config.monitor.user_agent = ua;
        }

        if let Some(path) = env_any(&["MADORI_DB_PATH", "DB_PATH"]) {
            config.storage.db_path = PathBuf::from(path);
        }

        let line_token = env_any(&["MADORI_LINE_ACCESS_TOKEN", "LINE_CHANNEL_ACCESS_TOKEN"]);
        let line_user = env_any(&["MADORI_LINE_USER_ID", "LINE_USER_ID"]);
        config.channels.line = match (line_token, line_user) {
            (Some(token), Some(user)) => Some(LineConfig::new(token, user)),
            (None, None) => None,
            (Some(_), None) => anyhow::bail!("LINE access token is set but LINE user id is missing"),
            (None, Some(_)) => anyhow::bail!("LINE user id is set but LINE access token is missing"),
        };

        config.channels.slack =
            env_any(&["MADORI_SLACK_WEBHOOK_URL", "SLACK_WEBHOOK_URL"]).map(SlackConfig::new);

        if let Some(url) = env_any(&["MADORI_WEBHOOK_URL"]) {
            let mut webhook = WebhookConfig::new(url);
            if let Some(token) = env_any(&["MADORI_WEBHOOK_TOKEN"]) {
                webhook = webhook.with_auth_token(token);
            }
            config.channels.webhooks.push(webhook);
        }

        if env_any(&["EMAIL_ENABLED"]).is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            let to = env_any(&["EMAIL_TO"])
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            let mut email = EmailConfig::new(
                env_any(&["SMTP_USERNAME"]).unwrap_or_default(),
                env_any(&["SMTP_PASSWORD"]).unwrap_or_default(),
                env_any(&["EMAIL_FROM"]).unwrap_or_default(),
                to,
            );
            if let Some(host) = env_any(&["SMTP_HOST"]) {
                email.smtp_host = host;
            }
            if let Some(port) = env_parse::<u16>("SMTP_PORT")? {
                email.smtp_port = port;
            }
            config.channels.email = Some(email);
        }

        if let Some(retries) = env_parse::<u32>("MADORI_NOTIFY_RETRIES")? {
            config.channels.retry.max_retries = retries;
        }

        if let Some(level) = env_any(&["MADORI_LOG_LEVEL", "LOG_LEVEL"]) {
            config.logging.level = level.to_lowercase();
        }
        if let Some(format) = env_any(&["MADORI_LOG_FORMAT"]) {
            config.logging.format = format.to_lowercase();
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise from the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_env(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.monitor.search_url)
            .with_context(|| format!("search_url is not a valid URL: {:?}", self.monitor.search_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("search_url must use http or https");
        }

        if self.monitor.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if self.channels.attempt_timeout_secs == 0 {
            anyhow::bail!("attempt_timeout_secs must be greater than 0");
        }

        if let Some(line) = &self.channels.line {
            line.validate()
                .map_err(|e| anyhow::anyhow!("channels.line: {e}"))?;
        }
        if let Some(slack) = &self.channels.slack {
            slack
                .validate()
                .map_err(|e| anyhow::anyhow!("channels.slack: {e}"))?;
        }
        for (i, webhook) in self.channels.webhooks.iter().enumerate() {
            webhook
                .validate()
                .map_err(|e| anyhow::anyhow!("channels.webhooks[{i}]: {e}"))?;
        }
        if let Some(email) = &self.channels.email {
            email
                .validate()
                .map_err(|e| anyhow::anyhow!("channels.email: {e}"))?;
        }

        self.rules
            .resolve()
            .compile()
            .context("Invalid extraction rules")?;

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be text or json");
        }

        Ok(())
    }

    /// Validate for a run; a live run needs at least one channel
    pub fn validate_for_run(&self, dry_run: bool) -> Result<()> {
        self.validate()?;

        if !dry_run && self.channels.count() == 0 {
            anyhow::bail!("no notification channel configured (set LINE, Slack, a webhook or email, or use --dry-run)");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.monitor.request_timeout_secs)
    }

    /// Fetcher for the search page
    pub fn build_fetcher(&self) -> Result<HttpFetcher> {
        let retry = RetryConfig {
            max_retries: self.monitor.fetch_retries,
            ..RetryConfig::with_delays(0, 1_000, 8_000)
        };
        HttpFetcher::with_config(&self.monitor.user_agent, retry).context("Failed to create fetcher")
    }

    /// Extractor for the configured rules
    pub fn build_extractor(&self) -> Result<HtmlExtractor> {
        HtmlExtractor::from_rules(&self.rules.resolve()).context("Invalid extraction rules")
    }

    /// Dispatcher with every configured channel
    ///
    /// Channel ids: `line`, `slack`, `webhook` (or `webhook:1`, `webhook:2`
    /// when several webhooks are configured) and `email`.
    pub fn build_dispatcher(&self) -> Result<Dispatcher> {
        let channels = &self.channels;
        let mut dispatcher = Dispatcher::new()
            .with_retry(channels.retry.clone())
            .with_attempt_timeout(Duration::from_secs(channels.attempt_timeout_secs))
            .with_concurrency(channels.concurrent);

        if let Some(line) = &channels.line {
            dispatcher.add_channel(Box::new(LineChannel::new(line.clone())?))?;
        }
        if let Some(slack) = &channels.slack {
            dispatcher.add_channel(Box::new(SlackChannel::new(slack.clone())?))?;
        }
        let numbered = channels.webhooks.len() > 1;
        for (i, webhook) in channels.webhooks.iter().enumerate() {
            let id = if numbered {
                format!("webhook:{}", i + 1)
            } else {
                "webhook".to_string()
            };
            dispatcher.add_channel(Box::new(WebhookChannel::new(id, webhook.clone())?))?;
        }
        if let Some(email) = &channels.email {
            dispatcher.add_channel(Box::new(EmailChannel::new(email.clone())?))?;
        }

        Ok(dispatcher)
    }
}
