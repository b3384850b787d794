use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::models::ConversationId;

/// Errors produced while resolving the client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Unsupported configuration format `{0}`. Use 'yaml', 'json' or 'toml'.")]
    UnsupportedFormat(String),
    #[error("Invalid {var} value: {message}")]
    InvalidEnv { var: &'static str, message: String },
    #[error("failed to serialize configuration: {0}")]
    Serialize(String),
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Output format of the tracing subscriber.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// REST endpoint settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every REST path is joined onto. Always ends with `/`.
    pub base_url: Url,
}

/// Publish/subscribe channel settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChannelConfig {
    /// WebSocket endpoint performing the STOMP handshake.
    pub url: Url,
    /// Broadcast topic every session subscribes to on connect.
    pub general_topic: String,
    /// Prefix of the per-conversation topic; the conversation id is appended.
    pub conversation_topic_prefix: String,
    /// Fixed destination composed messages are published to.
    pub outbound_destination: String,
}

impl ChannelConfig {
    #[must_use]
    pub fn conversation_topic(&self, conversation: &ConversationId) -> String {
        format!("{}{}", self.conversation_topic_prefix, conversation)
    }
}

/// Backoff policy of the reconnect state machine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub max_attempts: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HistoryConfig {
    pub page_size: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// The main configuration structure for the FleetDesk client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub channel: ChannelConfig,
    pub reconnect: ReconnectConfig,
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
}

/// Values supplied on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_url: Option<Url>,
    pub channel_url: Option<Url>,
    pub log_level: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost:8080/api/").expect("static URL is valid"),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("ws://localhost:8080/ws").expect("static URL is valid"),
            general_topic: "/topic/public".to_string(),
            conversation_topic_prefix: "/topic/conversation/".to_string(),
            outbound_destination: "/app/chat.sendMessage".to_string(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 500,
            max_delay_ms: 15_000,
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { page_size: 50 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Generates a default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Default location of the configuration file, if the platform has a config directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("io", "fleetdesk", "fleetdesk")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// Precedence, lowest first: defaults, file, `FLEETDESK_*` environment
    /// variables, `overrides`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an environment
    /// variable is malformed, or the resolved configuration is invalid.
    pub fn load_config(
        config_path: Option<PathBuf>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|path| path.exists()) {
                Some(path) => Self::from_file(path)?,
                None => Self::with_defaults(),
            },
        };

        config.apply_env_overrides()?;

        if let Some(url) = &overrides.api_url {
            config.api.base_url = url.clone();
        }
        if let Some(url) = &overrides.channel_url {
            config.channel.url = url.clone();
        }
        if let Some(level) = &overrides.log_level {
            config.logging.level.clone_from(level);
        }

        config.api.base_url = with_trailing_slash(config.api.base_url);
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "loading configuration file");
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let parsed = match extension.as_str() {
            "yaml" | "yml" => serde_yml::from_str(&content).map_err(|err| err.to_string()),
            "json" => serde_json::from_str(&content).map_err(|err| err.to_string()),
            "toml" => toml::from_str(&content).map_err(|err| err.to_string()),
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        parsed.map_err(|message| ConfigError::Parse { path, message })
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var("FLEETDESK_API_URL") {
            self.api.base_url = parse_env_url("FLEETDESK_API_URL", &value)?;
        }
        if let Ok(value) = env::var("FLEETDESK_CHANNEL_URL") {
            self.channel.url = parse_env_url("FLEETDESK_CHANNEL_URL", &value)?;
        }
        if let Ok(value) = env::var("FLEETDESK_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Ok(value) = env::var("FLEETDESK_LOG_FORMAT") {
            self.logging.format = match value.to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "FLEETDESK_LOG_FORMAT",
                        message: "must be `text` or `json`".to_string(),
                    });
                }
            };
        }
        if let Ok(value) = env::var("FLEETDESK_RECONNECT_ENABLED") {
            self.reconnect.enabled = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "FLEETDESK_RECONNECT_ENABLED",
                message: "must be `true` or `false`".to_string(),
            })?;
        }
        if let Ok(value) = env::var("FLEETDESK_HISTORY_PAGE_SIZE") {
            self.history.page_size = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "FLEETDESK_HISTORY_PAGE_SIZE",
                message: "must be a positive number".to_string(),
            })?;
        }
        Ok(())
    }

    /// Validate the complete configuration.
    ///
    /// # Errors
    /// Returns every problem found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !matches!(self.api.base_url.scheme(), "http" | "https") {
            errors.push(format!(
                "api.base_url must use http or https, got `{}`",
                self.api.base_url
            ));
        }
        if !matches!(self.channel.url.scheme(), "ws" | "wss") {
            errors.push(format!(
                "channel.url must use ws or wss, got `{}`",
                self.channel.url
            ));
        }
        if self.channel.general_topic.trim().is_empty() {
            errors.push("channel.general_topic must not be empty".to_string());
        }
        if self.channel.conversation_topic_prefix.trim().is_empty() {
            errors.push("channel.conversation_topic_prefix must not be empty".to_string());
        }
        if self.channel.outbound_destination.trim().is_empty() {
            errors.push("channel.outbound_destination must not be empty".to_string());
        }
        if self.history.page_size == 0 {
            errors.push("history.page_size must be greater than 0".to_string());
        }
        if self.reconnect.multiplier < 1.0 {
            errors.push("reconnect.multiplier must be at least 1.0".to_string());
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            errors.push("reconnect.initial_delay_ms must not exceed max_delay_ms".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Serializes the configuration in the given file format.
    ///
    /// # Errors
    /// Returns an error for unknown formats or serializer failures.
    pub fn to_format_string(&self, format: &str) -> Result<String, ConfigError> {
        match format {
            "yaml" => {
                serde_yml::to_string(self).map_err(|err| ConfigError::Serialize(err.to_string()))
            }
            "json" => serde_json::to_string_pretty(self)
                .map_err(|err| ConfigError::Serialize(err.to_string())),
            "toml" => toml::to_string(self).map_err(|err| ConfigError::Serialize(err.to_string())),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

fn parse_env_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|err| ConfigError::InvalidEnv {
        var,
        message: err.to_string(),
    })
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
