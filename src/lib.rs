//! gridwatch - Electric utility outage monitor
//!
//! Polls the electric utility's address-level status API and tells
//! subscribers, over Telegram, when the power at their address goes out,
//! when an ongoing outage changes, and when it comes back.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`provider`] - Utility status API client with rate limiting
//! - [`monitor`] - Polling loop, outage lifecycle, and notifications
//! - [`models`] - Core data structures and types
//! - [`storage`] - Database operations (SQLite)
//! - [`transport`] - Telegram message delivery
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use gridwatch::config::Config;
//! use gridwatch::provider::ProviderClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let provider = ProviderClient::with_config(
//!         &config.provider.base_url,
//!         config.provider.max_requests_per_second,
//!         config.request_timeout(),
//!         config.credential_ttl(),
//!     )?;
//!     let cities = provider.fetch_cities("").await?;
//!     println!("{} cities known to the utility", cities.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod monitor;
pub mod provider;
pub mod storage;
pub mod transport;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{AddressKey, City, OutageRecord, OutageStatus, Street};
    pub use crate::monitor::{LifecycleEngine, Notifier, OutageMonitor, OutageTracker, Transition};
    pub use crate::provider::ProviderClient;
    pub use crate::storage::{OutageStore, SqliteOutageStore};
    pub use crate::transport::{TelegramTransport, Transport};
}

// Direct re-exports for convenience
pub use models::{AddressKey, OutageRecord, OutageStatus};
