//! Server configuration read from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use tidings_core::defaults::{
    ALTERNATE_LOCALE, DATABASE_URL, PRIMARY_LOCALE, SERVER_HOST, SERVER_PORT,
    STREAM_BUFFER_CAPACITY, STREAM_HEARTBEAT_SECS,
};
use tidings_core::{Error, LocaleConfig, Result};
use tidings_realtime::{PageConfig, PollConfig, WatcherConfig};

/// Per-connection stream settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Frames buffered per connection before events are dropped for it.
    pub buffer_capacity: usize,
    /// Interval between keepalive lines on an idle stream.
    pub heartbeat: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: STREAM_BUFFER_CAPACITY,
            heartbeat: Duration::from_secs(STREAM_HEARTBEAT_SECS),
        }
    }
}

impl StreamConfig {
    /// Reads `STREAM_BUFFER_CAPACITY` and `STREAM_HEARTBEAT_SECS`.
    pub fn from_env() -> Self {
        let buffer_capacity = env_parse("STREAM_BUFFER_CAPACITY", STREAM_BUFFER_CAPACITY).max(1);
        let heartbeat_secs = env_parse("STREAM_HEARTBEAT_SECS", STREAM_HEARTBEAT_SECS).max(1);
        Self {
            buffer_capacity,
            heartbeat: Duration::from_secs(heartbeat_secs),
        }
    }
}

/// Everything the server binary needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub stream: StreamConfig,
    pub poll: PollConfig,
    pub pages: PageConfig,
    pub locales: LocaleConfig,
    pub watchers: WatcherConfig,
}

impl ServerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DATABASE_URL` | `postgres://localhost/tidings` |
    /// | `HOST` | `0.0.0.0` |
    /// | `PORT` | `3000` |
    /// | `PRIMARY_LOCALE` / `ALTERNATE_LOCALE` | `en` / `ar` |
    ///
    /// Stream, polling, paging, and watcher settings are read by their own
    /// `from_env` constructors.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DATABASE_URL.to_string());
        let host = std::env::var("HOST").unwrap_or_else(|_| SERVER_HOST.to_string());
        let port = env_parse("PORT", SERVER_PORT);
        let locales = LocaleConfig::new(
            std::env::var("PRIMARY_LOCALE").unwrap_or_else(|_| PRIMARY_LOCALE.to_string()),
            std::env::var("ALTERNATE_LOCALE").unwrap_or_else(|_| ALTERNATE_LOCALE.to_string()),
        );

        Ok(Self {
            host,
            port,
            database_url,
            stream: StreamConfig::from_env(),
            poll: PollConfig::from_env(),
            pages: PageConfig::from_env(),
            locales,
            watchers: WatcherConfig::from_env()?,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address: {}", e)))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
