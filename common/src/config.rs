//! Service configuration loaded from the environment.

use std::str::FromStr;
use std::time::Duration;

/// Default delay before a pool that reported an asynchronous error is rebuilt.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines.
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Service name used in logs and response metadata.
    pub service_name: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Bookkeeping database holding the `connections` table.
    pub database_url: String,
    /// Delay before rebuilding a pool after an asynchronous pool error.
    pub reconnect_delay_secs: u64,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Loads configuration for the named service.
    ///
    /// Reads a `.env` file first (if present), then the process environment.
    /// Unparseable values fall back to their defaults.
    pub fn load_with_service(service_name: &str) -> Self {
        if dotenv::dotenv().is_ok() {
            tracing::debug!("Loaded .env file");
        }

        Self {
            service_name: service_name.to_string(),
            host: env_var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(env_var("SERVER_PORT").as_deref(), 8081),
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:data/app.db".to_string()),
            reconnect_delay_secs: parse_or(
                env_var("POOL_RECONNECT_DELAY_SECS").as_deref(),
                DEFAULT_RECONNECT_DELAY_SECS,
            ),
            log_format: parse_or(env_var("LOG_FORMAT").as_deref(), LogFormat::Pretty),
        }
    }

    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// `host:port` bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(value: Option<&str>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
