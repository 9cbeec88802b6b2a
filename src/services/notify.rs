//! Notification sinks

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use super::NotificationSink;
use crate::error::{Error, Result};

/// Writes notifications to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        info!(target: "notification", "{} - {}", title, body);
        Ok(())
    }
}

/// Delivers notifications to a Telegram chat through the Bot API
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: "https://api.telegram.org".to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Override the API base URL (self-hosted Bot API servers)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        )
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        let payload = json!({
            "chat_id": self.chat_id,
            "text": format!("{}\n\n{}", title, body),
        });

        let response = self
            .client
            .post(self.send_message_url())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Notification(format!(
                "Telegram API returned {}",
                status
            )));
        }

        debug!("Telegram notification sent to chat {}", self.chat_id);
        Ok(())
    }
}
