//! # Configuration
//!
//! Client configuration: REST and channel endpoints, topic layout, reconnect
//! policy, history paging, and logging.

pub mod client;

pub use client::{
    ApiConfig, ChannelConfig, Config, ConfigError, ConfigOverrides, HistoryConfig, LogFormat,
    LoggingConfig, ReconnectConfig,
};
