use std::sync::Arc;

use chrono::{DateTime, Utc};
use rosterwatch_core::browser::{BrowserLauncher, ProfileManager};
use rosterwatch_core::session::AcquisitionController;
use rosterwatch_core::watch::{CycleReport, WatchCycle, WatchSummary, Watcher};
use rosterwatch_core::WatchConfig;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{render, AppError, DisplayFallback, OutputFormat, Result};

#[derive(Debug, Serialize)]
pub struct TokenReport {
    pub fingerprint: String,
    pub acquired_at: DateTime<Utc>,
}

impl DisplayFallback for TokenReport {
    fn display(&self) -> String {
        format!(
            "credential acquired at {} (sha256:{})",
            self.acquired_at.to_rfc3339(),
            self.fingerprint
        )
    }
}

impl DisplayFallback for CycleReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "cycle {}: {} entities, +{} -{}, notified: {}",
            self.cycle_id,
            self.entities,
            self.added.len(),
            self.removed.len(),
            if self.notified { "yes" } else { "no" }
        )];
        if let Some(message) = &self.message {
            lines.push(message.clone());
        }
        lines.join("\n")
    }
}

impl DisplayFallback for WatchSummary {
    fn display(&self) -> String {
        format!(
            "watcher stopped after {} cycles ({} ok, {} failed)",
            self.cycles, self.succeeded, self.failed
        )
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

/// Fires `cancel` on ctrl-c.
fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; stopping");
            cancel.cancel();
        }
    });
}

pub fn run_watcher(config: &WatchConfig, format: OutputFormat) -> Result<WatchSummary> {
    runtime()?.block_on(async {
        let cancel = CancellationToken::new();
        cancel_on_interrupt(cancel.clone());

        let cycle = WatchCycle::from_config(config, cancel.clone())?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher =
            Watcher::new(cycle, config.schedule.clone(), cancel).with_reports(tx);
        let worker = tokio::spawn(async move { watcher.run().await });

        while let Some(report) = rx.recv().await {
            render(&report, format)?;
        }
        let summary = worker
            .await
            .map_err(|err| AppError::Runtime(err.to_string()))??;
        Ok::<_, AppError>(summary)
    })
}

pub fn run_once(config: &WatchConfig) -> Result<CycleReport> {
    runtime()?.block_on(async {
        let cancel = CancellationToken::new();
        cancel_on_interrupt(cancel.clone());
        let mut cycle = WatchCycle::from_config(config, cancel)?;
        Ok::<_, AppError>(cycle.run_once().await?)
    })
}

pub fn acquire_token(config: &WatchConfig) -> Result<TokenReport> {
    runtime()?.block_on(async {
        let cancel = CancellationToken::new();
        cancel_on_interrupt(cancel.clone());
        let profiles = ProfileManager::from_config(config)?;
        let launcher = Arc::new(BrowserLauncher::new(config.chromium.clone(), &profiles));
        let mut controller =
            AcquisitionController::from_config(launcher, &config.session, cancel);
        let credential = controller.acquire().await?;
        Ok::<_, AppError>(TokenReport {
            fingerprint: credential.fingerprint(),
            acquired_at: Utc::now(),
        })
    })
}
