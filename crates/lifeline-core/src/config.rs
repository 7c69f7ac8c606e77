//! Configuration: YAML config file + env var overrides.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::{ChannelId, UserId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub slack: SlackConfig,

    #[serde(default)]
    pub ask: AskConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token (xoxb-...). Usually supplied via SLACK_BOT_TOKEN.
    #[serde(default)]
    pub bot_token: String,

    /// Channel questions are posted into.
    #[serde(default)]
    pub channel_id: ChannelId,

    /// The human whose replies count.
    #[serde(default)]
    pub user_id: UserId,

    /// How often watched threads are polled for replies (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// How long a thread stays watched after its question is posted (seconds)
    #[serde(default = "default_watch_window")]
    pub watch_window_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskConfig {
    /// How long to wait for a reply before giving up (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Delay between a session settling and its eviction (seconds)
    #[serde(default = "default_evict_grace")]
    pub evict_grace_seconds: u64,
}

fn default_poll_interval() -> u64 {
    2
}
fn default_watch_window() -> u64 {
    1800
}
fn default_timeout() -> u64 {
    600
}
fn default_evict_grace() -> u64 {
    30
}

impl Config {
    /// Load config from a YAML file, apply env var overrides, validate.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;

        let mut config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config YAML")?;

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Build a config purely from environment variables (no config file).
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("SLACK_BOT_TOKEN") {
            self.slack.bot_token = token;
        }
        if let Ok(channel) = std::env::var("SLACK_CHANNEL_ID") {
            self.slack.channel_id = ChannelId::new(channel);
        }
        if let Ok(user) = std::env::var("SLACK_USER_ID") {
            self.slack.user_id = UserId::new(user);
        }
        if let Some(seconds) = env_u64("LIFELINE_TIMEOUT_SECONDS") {
            self.ask.timeout_seconds = seconds;
        }
        if let Some(seconds) = env_u64("LIFELINE_POLL_INTERVAL_SECONDS") {
            self.slack.poll_interval_seconds = seconds;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.slack.bot_token.is_empty() {
            bail!("Missing Slack bot token: set slack.bot_token in the config file or SLACK_BOT_TOKEN");
        }
        if self.slack.channel_id.is_empty() {
            bail!("Missing Slack channel id: set slack.channel_id or SLACK_CHANNEL_ID");
        }
        if self.slack.user_id.is_empty() {
            bail!("Missing Slack user id: set slack.user_id or SLACK_USER_ID");
        }
        if self.ask.timeout_seconds == 0 {
            bail!("ask.timeout_seconds must be greater than zero");
        }
        if self.slack.poll_interval_seconds == 0 {
            bail!("slack.poll_interval_seconds must be greater than zero");
        }
        if self.slack.watch_window_seconds == 0 {
            bail!("slack.watch_window_seconds must be greater than zero");
        }
        if self.slack.watch_window_seconds < self.ask.timeout_seconds {
            // replies can only arrive while the thread is still watched
            tracing::warn!(
                watch_window = self.slack.watch_window_seconds,
                timeout = self.ask.timeout_seconds,
                "slack.watch_window_seconds is shorter than ask.timeout_seconds; late replies will be missed"
            );
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl SlackConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn watch_window(&self) -> Duration {
        Duration::from_secs(self.watch_window_seconds)
    }
}

impl AskConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn evict_grace(&self) -> Duration {
        Duration::from_secs(self.evict_grace_seconds)
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            channel_id: ChannelId::default(),
            user_id: UserId::default(),
            poll_interval_seconds: default_poll_interval(),
            watch_window_seconds: default_watch_window(),
        }
    }
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            evict_grace_seconds: default_evict_grace(),
        }
    }
}
