//! Telegram group notifier: posts ticket cards into forum topics.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{Lookup, parse_or};
use crate::error::{ChannelError, ConfigError};
use crate::notify::{ChatCard, ChatClient};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Supergroup whose forum topics receive cards.
    pub group_id: i64,
}

impl TelegramConfig {
    /// Returns `None` when `TELEGRAM_BOT_TOKEN` is unset (chat disabled).
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Option<Self>, ConfigError> {
        let Some(token) = lookup("TELEGRAM_BOT_TOKEN").filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };
        if lookup("TELEGRAM_GROUP_ID").is_none_or(|s| s.trim().is_empty()) {
            return Err(ConfigError::MissingRequired {
                key: "TELEGRAM_GROUP_ID".into(),
                hint: "Required when TELEGRAM_BOT_TOKEN is set".into(),
            });
        }
        Ok(Some(Self {
            bot_token: SecretString::from(token.trim().to_string()),
            group_id: parse_or(lookup, "TELEGRAM_GROUP_ID", 0)?,
        }))
    }
}

/// Bot API client implementing [`ChatClient`].
pub struct TelegramNotifier {
    bot_token: SecretString,
    group_id: i64,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token,
            group_id: config.group_id,
            api_base: TELEGRAM_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at a different Bot API server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token.expose_secret())
    }

    fn message_body(&self, topic: i64, card: &ChatCard) -> serde_json::Value {
        serde_json::json!({
            "chat_id": self.group_id,
            "message_thread_id": topic,
            "text": card.text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
            "reply_markup": {
                "inline_keyboard": [[
                    { "text": card.link_label, "url": card.link_url }
                ]]
            }
        })
    }
}

#[async_trait]
impl ChatClient for TelegramNotifier {
    async fn send(&self, topic: i64, card: &ChatCard) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&self.message_body(topic, card))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                // reqwest errors embed the URL, which carries the token.
                reason: e.without_url().to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("sendMessage failed ({status}): {body}"),
            });
        }
        Ok(())
    }
}
