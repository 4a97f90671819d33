//! Telegram bot alert channel.

use crate::alert::{AlertChannel, AlertError};
use crate::config::TelegramConfig;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Sends alerts with the Bot API `sendMessage` method.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Result<Self, AlertError> {
        if config.bot_token.is_empty() || config.chat_id.is_empty() {
            return Err(AlertError::Config(
                "telegram bot_token and chat_id are required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AlertError::Config(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }
}

#[async_trait]
impl AlertChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, text: &str) -> Result<(), AlertError> {
        let response = self
            .client
            .post(self.send_message_url())
            .json(&SendMessage {
                chat_id: &self.config.chat_id,
                text,
            })
            .send()
            .await
            .map_err(|e| AlertError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AlertError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}
