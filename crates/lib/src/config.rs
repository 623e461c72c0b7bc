//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.parrot/config.json`) and
//! environment. Channel credentials live here; an endpoint is attached by
//! the CLI only when its credentials are present.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP endpoint settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Channel settings (Telegram, Twitter).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Bot defaults (command prefix, greeting).
    #[serde(default)]
    pub bot: BotConfig,
}

/// HTTP endpoint bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// Serve the HTTP endpoint (default true).
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_http_bind")]
    pub bind: String,

    /// Port (default 8000).
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_enabled() -> bool {
    true
}

fn default_http_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8000
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind: default_http_bind(),
            port: default_http_port(),
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
    #[serde(default)]
    pub twitter: TwitterChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
}

/// Twitter channel config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwitterChannelConfig {
    /// Bearer token. Overridden by TWITTER_BEARER_TOKEN env when set.
    pub bearer_token: Option<String>,

    /// DM poll interval in seconds (default 5).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// When true, use the streaming endpoint instead of DM polling.
    #[serde(default)]
    pub streaming: bool,

    /// Override the streaming URL (e.g. a relay).
    pub stream_url: Option<String>,
}

fn default_poll_interval_secs() -> u64 {
    5
}

impl Default for TwitterChannelConfig {
    fn default() -> Self {
        Self {
            bearer_token: None,
            poll_interval_secs: default_poll_interval_secs(),
            streaming: false,
            stream_url: None,
        }
    }
}

/// Bot defaults used by the CLI reference bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// Command prefix (default "/").
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Reply for the `start` command (default "Hello!").
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

fn default_command_prefix() -> String {
    "/".to_string()
}

fn default_greeting() -> String {
    "Hello!".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            greeting: default_greeting(),
        }
    }
}

fn env_token(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    env_token("TELEGRAM_BOT_TOKEN").or_else(|| {
        config
            .channels
            .telegram
            .bot_token
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the Twitter bearer token: env TWITTER_BEARER_TOKEN overrides config.
pub fn resolve_twitter_token(config: &Config) -> Option<String> {
    env_token("TWITTER_BEARER_TOKEN").or_else(|| {
        config
            .channels
            .twitter
            .bearer_token
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve config path from env or default (~/.parrot/config.json).
pub fn default_config_path() -> PathBuf {
    std::env::var("PARROT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".parrot").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or PARROT_CONFIG_PATH / the default).
/// Missing file => default config.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
