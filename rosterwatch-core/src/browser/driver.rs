use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};

use super::error::BrowserResult;
use super::storage::StorageSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserMode {
    Headless,
    Visible,
}

impl fmt::Display for BrowserMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BrowserMode::Headless => "headless",
            BrowserMode::Visible => "visible",
        })
    }
}

/// Which of the two awaited markers were present when the wait ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct MarkerPresence {
    pub first: bool,
    pub second: bool,
}

impl MarkerPresence {
    pub fn any(&self) -> bool {
        self.first || self.second
    }
}

/// A live browser instance. Dropping the box without calling
/// [`BrowserSession::shutdown`] leaves the process running.
#[async_trait]
pub trait BrowserSession: Send {
    fn mode(&self) -> BrowserMode;
    async fn navigate(&mut self, url: &str) -> BrowserResult<()>;
    async fn wait_for_markers(
        &mut self,
        first: &str,
        second: &str,
        timeout: Duration,
    ) -> BrowserResult<MarkerPresence>;
    async fn read_storage(&mut self) -> BrowserResult<StorageSnapshot>;
    async fn shutdown(self: Box<Self>) -> BrowserResult<()>;
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, mode: BrowserMode) -> BrowserResult<Box<dyn BrowserSession>>;
}

/// Re-runs `check` every `interval` until a marker is present or `timeout`
/// elapses. The last check happens at the deadline.
pub async fn poll_markers<F, Fut>(mut check: F, timeout: Duration, interval: Duration) -> MarkerPresence
where
    F: FnMut() -> Fut,
    Fut: Future<Output = MarkerPresence>,
{
    let deadline = Instant::now() + timeout;
    loop {
        let presence = check().await;
        if presence.any() {
            return presence;
        }
        let now = Instant::now();
        if now >= deadline {
            return MarkerPresence::default();
        }
        sleep(interval.min(deadline - now)).await;
    }
}
