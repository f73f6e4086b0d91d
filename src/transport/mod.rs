//! Message delivery boundary
//!
//! The monitoring engine talks to subscribers through the [`Transport`]
//! trait: send a text to a numeric recipient id, delete a previously sent
//! message by handle. Both calls may fail per-subscriber without affecting
//! other subscribers. [`TelegramTransport`] is the shipping implementation,
//! speaking the Bot API over JSON POST requests.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::TransportError;

/// Opaque handle to a delivered message, used for later deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle(pub i64);

/// Chat delivery contract used by the notification dispatcher
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a text to a subscriber, returning the message handle
    async fn send_message(
        &self,
        subscriber_id: i64,
        text: &str,
    ) -> Result<MessageHandle, TransportError>;

    /// Delete a previously delivered message
    async fn delete_message(
        &self,
        subscriber_id: i64,
        handle: MessageHandle,
    ) -> Result<(), TransportError>;
}

/// Telegram transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token
    pub bot_token: String,
    /// API base URL (overridable for mock servers)
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_timeout() -> u64 {
    10
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: default_api_base(),
            timeout_secs: default_timeout(),
        }
    }

    /// Override the API base URL (for tests)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.bot_token.is_empty() {
            return Err("Bot token cannot be empty".to_string());
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err("API base must start with http:// or https://".to_string());
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Serialize)]
struct DeleteMessageRequest {
    chat_id: i64,
    message_id: i64,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize, Default)]
struct SentMessage {
    message_id: i64,
}

/// Telegram Bot API transport
pub struct TelegramTransport {
    client: Client,
    config: TelegramConfig,
}

impl TelegramTransport {
    /// Create a transport from configuration
    pub fn new(config: TelegramConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    async fn call<T, B>(
        &self,
        method: &str,
        body: &B,
        subscriber_id: i64,
    ) -> Result<T, TransportError>
    where
        T: serde::de::DeserializeOwned + Default,
        B: Serialize + Sync,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;

        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TransportError::MalformedResponse(e.to_string()))?;

        if !parsed.ok {
            return Err(TransportError::Rejected {
                subscriber_id,
                description: parsed
                    .description
                    .unwrap_or_else(|| "unknown API error".to_string()),
            });
        }

        parsed
            .result
            .ok_or_else(|| TransportError::MalformedResponse("missing result field".to_string()))
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_message(
        &self,
        subscriber_id: i64,
        text: &str,
    ) -> Result<MessageHandle, TransportError> {
        let body = SendMessageRequest {
            chat_id: subscriber_id,
            text,
            parse_mode: "HTML",
        };
        let sent: SentMessage = self.call("sendMessage", &body, subscriber_id).await?;
        Ok(MessageHandle(sent.message_id))
    }

    async fn delete_message(
        &self,
        subscriber_id: i64,
        handle: MessageHandle,
    ) -> Result<(), TransportError> {
        let body = DeleteMessageRequest {
            chat_id: subscriber_id,
            message_id: handle.0,
        };
        // deleteMessage returns a bare boolean result
        let _: bool = self.call("deleteMessage", &body, subscriber_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(TelegramConfig::new("123:abc").validate().is_ok());
        assert!(TelegramConfig::new("").validate().is_err());

        let config = TelegramConfig::new("123:abc").with_api_base("ftp://bad");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_method_url() {
        let config = TelegramConfig::new("123:abc").with_api_base("http://localhost:9999/");
        let transport = TelegramTransport::new(config).unwrap();
        assert_eq!(
            transport.method_url("sendMessage"),
            "http://localhost:9999/bot123:abc/sendMessage"
        );
    }
}
