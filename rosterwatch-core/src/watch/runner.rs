use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ScheduleSection;

use super::cycle::{CycleReport, WatchCycle, WatchResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatchSummary {
    pub cycles: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs cycles back to back with the configured delay until cancelled or a
/// fatal error occurs.
pub struct Watcher {
    cycle: WatchCycle,
    schedule: ScheduleSection,
    cancel: CancellationToken,
    reports: Option<UnboundedSender<CycleReport>>,
}

impl Watcher {
    pub fn new(cycle: WatchCycle, schedule: ScheduleSection, cancel: CancellationToken) -> Self {
        Self {
            cycle,
            schedule,
            cancel,
            reports: None,
        }
    }

    pub fn with_reports(mut self, reports: UnboundedSender<CycleReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    pub async fn run(&mut self) -> WatchResult<WatchSummary> {
        let mut summary = WatchSummary::default();
        info!(
            refresh_secs = self.schedule.refresh_interval().as_secs(),
            "watcher started"
        );
        while !self.cancel.is_cancelled() {
            summary.cycles += 1;
            let delay = match self.cycle.run_once().await {
                Ok(report) => {
                    summary.succeeded += 1;
                    info!(
                        cycle_id = %report.cycle_id,
                        entities = report.entities,
                        added = report.added.len(),
                        removed = report.removed.len(),
                        notified = report.notified,
                        "watch cycle finished"
                    );
                    if let Some(reports) = &self.reports {
                        if reports.send(report).is_err() {
                            warn!("cycle report receiver dropped");
                            self.reports = None;
                        }
                    }
                    self.schedule.refresh_interval()
                }
                Err(err) if err.is_cancelled() => {
                    info!("watch cycle cancelled");
                    break;
                }
                Err(err) if err.is_fatal() => {
                    error!(error = %err, "fatal watch error; stopping");
                    return Err(err);
                }
                Err(err) => {
                    summary.failed += 1;
                    error!(error = %err, "watch cycle failed");
                    self.schedule.failure_retry()
                }
            };

            info!(delay_secs = delay.as_secs(), "waiting before next cycle");
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }
        info!(
            cycles = summary.cycles,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "watcher stopped"
        );
        Ok(summary)
    }
}
