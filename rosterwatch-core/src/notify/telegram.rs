use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use crate::config::NotifySection;

use super::{NotifyError, NotifyResult, Notifier};

pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> NotifyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        })
    }

    pub fn from_config(config: &NotifySection) -> NotifyResult<Self> {
        let bot_token = config
            .bot_token
            .clone()
            .ok_or_else(|| NotifyError::Configuration("notify.bot_token is not set".into()))?;
        let chat_id = config
            .chat_id
            .clone()
            .ok_or_else(|| NotifyError::Configuration("notify.chat_id is not set".into()))?;
        Self::new(config.api_base.clone(), bot_token, chat_id)
    }

    async fn send_chunk(&self, text: &str) -> NotifyResult<bool> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let response = self
            .client
            .post(&url)
            .form(&[("chat_id", self.chat_id.as_str()), ("text", text)])
            .send()
            .await?;
        let status = response.status();
        let body: SendResponse = response.json().await?;
        if body.ok {
            info!(chat_id = %self.chat_id, "message delivered to Telegram");
        } else {
            error!(
                chat_id = %self.chat_id,
                %status,
                description = body.description.as_deref().unwrap_or(""),
                "Telegram rejected message"
            );
        }
        Ok(body.ok)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, text: &str) -> NotifyResult<bool> {
        let mut delivered = true;
        for chunk in split_message(text, TELEGRAM_MESSAGE_LIMIT) {
            delivered &= self.send_chunk(&chunk).await?;
        }
        Ok(delivered)
    }
}

/// Splits `text` into chunks of at most `max_units` UTF-16 code units (the
/// unit Telegram measures message length in), breaking after the last
/// newline that fits. A single overlong line is cut on a char boundary.
pub fn split_message(text: &str, max_units: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;
    while let Some(byte_limit) = utf16_boundary(remaining, max_units) {
        let (chunk, rest) = match remaining[..byte_limit].rfind('\n') {
            Some(newline) if newline > 0 => (&remaining[..newline], &remaining[newline + 1..]),
            // a char wider than the whole budget still has to go somewhere
            _ if byte_limit == 0 => {
                let width = remaining.chars().next().map_or(remaining.len(), char::len_utf8);
                remaining.split_at(width)
            }
            _ => remaining.split_at(byte_limit),
        };
        chunks.push(chunk.to_string());
        remaining = rest;
    }
    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}

/// Byte offset of the first char that would push `text` past `max_units`
/// UTF-16 code units, or `None` when the whole text fits.
fn utf16_boundary(text: &str, max_units: usize) -> Option<usize> {
    let mut units = 0;
    for (index, ch) in text.char_indices() {
        units += ch.len_utf16();
        if units > max_units {
            return Some(index);
        }
    }
    None
}
