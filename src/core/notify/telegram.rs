use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::Recipient;

use super::{SendResult, Sender};

/// Channel config: `{"chat_id": "123456"}` or `{"chat_id": "@channel"}`.
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }
}

fn recipient(config: &serde_json::Value) -> Option<Recipient> {
    let raw = match config.get("chat_id")? {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if let Ok(id) = raw.parse::<i64>() {
        return Some(Recipient::Id(ChatId(id)));
    }
    raw.starts_with('@')
        .then(|| Recipient::ChannelUsername(raw))
}

#[async_trait]
impl Sender for TelegramSender {
    fn kind(&self) -> &str {
        "telegram"
    }

    async fn send(&self, config: &serde_json::Value, content: &str) -> SendResult {
        let Some(to) = recipient(config) else {
            return SendResult::failed("telegram channel has no usable chat_id");
        };
        match self.bot.send_message(to, content).await {
            Ok(_) => SendResult::ok(),
            Err(e) => SendResult::failed(format!("telegram: {}", e)),
        }
    }
}
