mod telegram;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub use telegram::{split_message, TelegramNotifier, TELEGRAM_MESSAGE_LIMIT};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("notifier not configured: {0}")]
    Configuration(String),
}

pub type NotifyResult<T> = Result<T, NotifyError>;

/// Delivers operator-facing text. `Ok(false)` means the remote side
/// answered but refused the message.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, text: &str) -> NotifyResult<bool>;
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, text: &str) -> NotifyResult<bool> {
        info!(lines = text.lines().count(), "notification (not sent)\n{text}");
        Ok(true)
    }
}
