use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ChromiumSection;

use super::driver::{poll_markers, BrowserMode, BrowserSession, MarkerPresence, SessionLauncher};
use super::error::{BrowserError, BrowserResult};
use super::profile::{BrowserProfile, ProfileManager};
use super::reaper::StaleProcessReaper;
use super::storage::{decode_storage_payload, StorageSnapshot, READ_STORAGE_SCRIPT};

const MARKER_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub struct BrowserLauncher {
    config: Arc<ChromiumSection>,
    profile: BrowserProfile,
    reaper: StaleProcessReaper,
}

impl BrowserLauncher {
    pub fn new(config: ChromiumSection, profiles: &ProfileManager) -> Self {
        let profile = profiles.profile();
        let reaper = StaleProcessReaper::new(profile.clone());
        Self {
            config: Arc::new(config),
            profile,
            reaper,
        }
    }

    async fn launch_once(&self, mode: BrowserMode) -> BrowserResult<ChromiumSession> {
        let chromium_config = self.build_chromium_config(mode)?;
        info!(
            profile = %self.profile.name(),
            user_data_dir = %self.profile.path().display(),
            %mode,
            "Launching Chromium instance"
        );

        let (mut browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::SessionCreation(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                if let Err(close_err) = browser.close().await {
                    warn!(error = %close_err, "Failed to close browser after page error");
                }
                handler_task.abort();
                return Err(BrowserError::SessionCreation(format!(
                    "failed to open initial page: {err}"
                )));
            }
        };

        self.profile.touch().await?;

        Ok(ChromiumSession {
            browser,
            page,
            handler_task: Some(handler_task),
            mode,
            profile: self.profile.clone(),
        })
    }

    fn build_chromium_config(&self, mode: BrowserMode) -> BrowserResult<ChromiumConfig> {
        let [width, height] = self.config.window_size;
        let mut builder = ChromiumConfig::builder()
            .user_data_dir(self.profile.path())
            .window_size(width, height);

        if let Some(executable) = &self.config.executable_path {
            builder = builder.chrome_executable(executable);
        }
        if mode == BrowserMode::Visible {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.config.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![
            format!("--profile-directory={}", self.profile.name()),
            format!("--window-size={width},{height}"),
        ];
        if mode == BrowserMode::Headless {
            if self.config.disable_gpu {
                args.push("--disable-gpu".into());
            }
            args.push("--disable-dev-shm-usage".into());
        }
        args.push("--no-first-run".into());
        args.push("--password-store=basic".into());

        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

#[async_trait]
impl SessionLauncher for BrowserLauncher {
    async fn launch(&self, mode: BrowserMode) -> BrowserResult<Box<dyn BrowserSession>> {
        let session = self
            .reaper
            .launch_with_recovery(|_| self.launch_once(mode))
            .await?;
        Ok(Box::new(session))
    }
}

#[derive(Debug)]
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: Option<JoinHandle<()>>,
    mode: BrowserMode,
    profile: BrowserProfile,
}

async fn marker_presence(page: &Page, first: &str, second: &str) -> MarkerPresence {
    let script = marker_script(first, second);
    let evaluated = match page.evaluate(script.as_str()).await {
        Ok(result) => result.into_value::<MarkerPresence>(),
        Err(err) => {
            // the document may still be swapping during navigation
            debug!(error = %err, "marker check failed");
            return MarkerPresence::default();
        }
    };
    evaluated.unwrap_or_else(|err| {
        debug!(error = %err, "marker check returned unexpected payload");
        MarkerPresence::default()
    })
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    fn mode(&self) -> BrowserMode {
        self.mode
    }

    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        info!(url, "Opening URL");
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.goto(params).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn wait_for_markers(
        &mut self,
        first: &str,
        second: &str,
        timeout: Duration,
    ) -> BrowserResult<MarkerPresence> {
        let page = &self.page;
        Ok(poll_markers(
            || marker_presence(page, first, second),
            timeout,
            MARKER_POLL_INTERVAL,
        )
        .await)
    }

    async fn read_storage(&mut self) -> BrowserResult<StorageSnapshot> {
        let value = self
            .page
            .evaluate(READ_STORAGE_SCRIPT)
            .await
            .map_err(|err| BrowserError::Storage(format!("failed to run storage script: {err}")))?
            .into_value()
            .map_err(|err| BrowserError::Storage(format!("failed to decode storage dump: {err}")))?;
        let snapshot = decode_storage_payload(value)?;
        debug!(entries = snapshot.len(), "client storage read");
        Ok(snapshot)
    }

    async fn shutdown(mut self: Box<Self>) -> BrowserResult<()> {
        info!(profile = %self.profile.name(), mode = %self.mode, "Shutting down Chromium instance");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Browser handler join error");
            }
        }
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!(
                    profile = %self.profile.name(),
                    "ChromiumSession dropped without explicit shutdown"
                );
            }
        }
    }
}

fn marker_script(first: &str, second: &str) -> String {
    // serde_json gives a correctly escaped JS string literal
    let first = serde_json::Value::String(first.to_string());
    let second = serde_json::Value::String(second.to_string());
    format!(
        "(() => ({{ first: document.getElementsByClassName({first}).length > 0, second: document.getElementsByClassName({second}).length > 0 }}))()"
    )
}
