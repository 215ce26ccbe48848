//! Telegram delivery.

use crate::notifier::{NotificationSink, NotifyError};
use async_trait::async_trait;
use pricealert_core::AlertId;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::debug;

/// Sends alert messages to a Telegram chat id taken from the alert's recipient.
pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    /// Create a new sink with the given bot token.
    pub fn new(token: &str) -> Self {
        Self { bot: Bot::new(token) }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

/// Parse a Telegram chat id. Group ids are negative.
pub fn parse_chat_id(recipient: &str) -> Result<ChatId, NotifyError> {
    recipient
        .trim()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| NotifyError::InvalidRecipient(recipient.to_string()))
}

#[async_trait]
impl NotificationSink for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, alert_id: &AlertId, message: &str, recipient: &str) -> Result<(), NotifyError> {
        let chat_id = parse_chat_id(recipient)?;
        self.bot
            .send_message(chat_id, message)
            .parse_mode(ParseMode::Html)
            .await?;
        debug!(alert_id = %alert_id, chat_id = chat_id.0, "Telegram message sent");
        Ok(())
    }
}
