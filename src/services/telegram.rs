use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::config::{Config, NOTIFICATION_MAX_CHARS, TELEGRAM_API_URL};
use crate::error::{AnalysisError, Result};
use crate::utils::split_message;

/// What happened to a part handed to a [`Notifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No destination configured; nothing left the process.
    Skipped,
}

/// Delivers text to the chat. `part` / `total` number multi-part messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_chunk(&self, text: &str, part: usize, total: usize) -> Result<Delivery>;
}

pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl TelegramNotifier {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_url: TELEGRAM_API_URL.to_string(),
            bot_token: config.telegram_bot_token.clone(),
            chat_id: config.telegram_chat_id.clone(),
        }
    }

    async fn send_message(&self, token: &str, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, token);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
            }))
            .send()
            .await
            .map_err(|e| AnalysisError::SinkDelivery(e.without_url().to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::SinkDelivery(format!("Telegram API error {}: {}", status, body)));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_chunk(&self, text: &str, part: usize, total: usize) -> Result<Delivery> {
        let (Some(token), Some(chat_id)) = (self.bot_token.as_deref(), self.chat_id.as_deref()) else {
            tracing::warn!("Telegram bot token or chat id not configured, skipping part {}/{}", part, total);
            return Ok(Delivery::Skipped);
        };

        for piece in split_message(text, NOTIFICATION_MAX_CHARS) {
            self.send_message(token, chat_id, &piece).await?;
        }
        tracing::info!("Notification part {}/{} sent to Telegram", part, total);
        Ok(Delivery::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_notifier_skips_quietly() {
        let notifier = TelegramNotifier::new(&Config::default());
        assert_eq!(notifier.send_chunk("⚽ teste", 1, 1).await.unwrap(), Delivery::Skipped);
    }
}
