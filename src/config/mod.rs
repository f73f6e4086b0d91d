//! Configuration management for gridwatch
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transport::TelegramConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Utility status provider configuration
    pub provider: ProviderConfig,

    /// Monitoring loop configuration
    pub monitor: MonitorConfig,

    /// Telegram delivery configuration
    pub telegram: TelegramConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Provider-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider API base URL
    pub base_url: String,

    /// Rate ceiling (requests per second)
    pub max_requests_per_second: f64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Anti-bot credential lifetime in seconds
    pub credential_ttl_secs: u64,
}

/// Monitoring loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Pause between polling cycles, in seconds
    pub poll_cycle_gap_secs: f64,

    /// Delay between consecutive address dispatches, in seconds
    pub per_address_stagger_secs: f64,

    /// Persistence retry attempts before a transition is abandoned
    pub persist_retries: u32,

    /// Cap on subscribed addresses per subscriber
    pub max_addresses_per_subscriber: usize,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("GRIDWATCH_PROVIDER_URL")
            .unwrap_or_else(|_| String::from("https://www.iec.co.il"));

        let max_requests_per_second = std::env::var("GRIDWATCH_MAX_RPS")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(1.1);

        let request_timeout_secs = std::env::var("GRIDWATCH_REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(20);

        let credential_ttl_secs = std::env::var("GRIDWATCH_CREDENTIAL_TTL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1800);

        let poll_cycle_gap_secs = std::env::var("GRIDWATCH_CYCLE_GAP")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(2.0);

        let per_address_stagger_secs = std::env::var("GRIDWATCH_STAGGER")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(1.2);

        let persist_retries = std::env::var("GRIDWATCH_PERSIST_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(3);

        let max_addresses_per_subscriber = std::env::var("GRIDWATCH_MAX_ADDRESSES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(3);

        let bot_token = std::env::var("GRIDWATCH_BOT_TOKEN")
            .or_else(|_| std::env::var("TELEGRAM_BOT_TOKEN"))
            .unwrap_or_default();

        let telegram = match std::env::var("GRIDWATCH_TELEGRAM_API") {
            Ok(api_base) => TelegramConfig::new(bot_token).with_api_base(api_base),
            Err(_) => TelegramConfig::new(bot_token),
        };

        let sqlite_path = std::env::var("GRIDWATCH_SQLITE_PATH")
            .unwrap_or_else(|_| String::from("data/gridwatch.db"))
            .into();

        let log_level =
            std::env::var("GRIDWATCH_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));

        let log_format =
            std::env::var("GRIDWATCH_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(Self {
            provider: ProviderConfig {
                base_url,
                max_requests_per_second,
                request_timeout_secs,
                credential_ttl_secs,
            },
            monitor: MonitorConfig {
                poll_cycle_gap_secs,
                per_address_stagger_secs,
                persist_retries,
                max_addresses_per_subscriber,
            },
            telegram,
            database: DatabaseConfig { sqlite_path },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.provider.max_requests_per_second <= 0.0 {
            anyhow::bail!("max_requests_per_second must be positive");
        }

        if self.provider.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if self.monitor.poll_cycle_gap_secs < 0.0 || self.monitor.per_address_stagger_secs < 0.0 {
            anyhow::bail!("monitor delays must not be negative");
        }

        if self.monitor.max_addresses_per_subscriber == 0 {
            anyhow::bail!("max_addresses_per_subscriber must be greater than 0");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.request_timeout_secs)
    }

    /// Get credential lifetime as Duration
    #[must_use]
    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(self.provider.credential_ttl_secs)
    }

    /// Get cycle gap as Duration
    #[must_use]
    pub fn poll_cycle_gap(&self) -> Duration {
        Duration::from_secs_f64(self.monitor.poll_cycle_gap_secs)
    }

    /// Get per-address stagger as Duration
    #[must_use]
    pub fn per_address_stagger(&self) -> Duration {
        Duration::from_secs_f64(self.monitor.per_address_stagger_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig {
                base_url: String::from("https://www.iec.co.il"),
                max_requests_per_second: 1.1,
                request_timeout_secs: 20,
                credential_ttl_secs: 1800,
            },
            monitor: MonitorConfig {
                poll_cycle_gap_secs: 2.0,
                per_address_stagger_secs: 1.2,
                persist_retries: 3,
                max_addresses_per_subscriber: 3,
            },
            telegram: TelegramConfig::new(String::new()),
            database: DatabaseConfig {
                sqlite_path: PathBuf::from("data/gridwatch.db"),
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}
