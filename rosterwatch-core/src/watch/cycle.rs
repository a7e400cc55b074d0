use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::browser::{BrowserError, BrowserLauncher, ProfileManager};
use crate::config::WatchConfig;
use crate::graph::{fetch_entities, GraphApi, GraphClient, GraphError};
use crate::notify::{LogNotifier, Notifier, NotifyError, TelegramNotifier};
use crate::roster::{
    diff, EntityRecord, EntitySnapshot, NotificationFormatter, SnapshotError, SnapshotStore,
};
use crate::session::{AcquisitionController, AcquisitionError};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("credential acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),
    #[error("entity fetch failed: {0}")]
    Graph(#[from] GraphError),
    #[error("snapshot store failed: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("browser setup failed: {0}")]
    Browser(#[from] BrowserError),
    #[error("notifier setup failed: {0}")]
    Notify(#[from] NotifyError),
}

impl WatchError {
    /// Errors that will repeat on every cycle until the operator steps in.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WatchError::Graph(err) if err.is_permission())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WatchError::Acquisition(AcquisitionError::Cancelled))
    }
}

pub type WatchResult<T> = Result<T, WatchError>;

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entities: usize,
    pub added: Vec<EntityRecord>,
    pub removed: Vec<EntityRecord>,
    pub notified: bool,
    pub message: Option<String>,
}

impl CycleReport {
    pub fn has_drift(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// One pass of acquire, fetch, diff, persist and notify.
pub struct WatchCycle {
    acquisition: AcquisitionController,
    api: Arc<dyn GraphApi>,
    store: SnapshotStore,
    notifier: Arc<dyn Notifier>,
    formatter: NotificationFormatter,
    owner_id: String,
    page_size: u32,
}

impl WatchCycle {
    pub fn new(
        acquisition: AcquisitionController,
        api: Arc<dyn GraphApi>,
        store: SnapshotStore,
        notifier: Arc<dyn Notifier>,
        owner_id: impl Into<String>,
        page_size: u32,
    ) -> Self {
        Self {
            acquisition,
            api,
            store,
            notifier,
            formatter: NotificationFormatter::default(),
            owner_id: owner_id.into(),
            page_size,
        }
    }

    pub fn with_formatter(mut self, formatter: NotificationFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn from_config(config: &WatchConfig, cancel: CancellationToken) -> WatchResult<Self> {
        let profiles = ProfileManager::from_config(config)?;
        let launcher = Arc::new(BrowserLauncher::new(config.chromium.clone(), &profiles));
        let acquisition = AcquisitionController::from_config(launcher, &config.session, cancel);
        let api = Arc::new(GraphClient::new(&config.api)?);
        let notifier: Arc<dyn Notifier> = if config.notify.enabled {
            Arc::new(TelegramNotifier::from_config(&config.notify)?)
        } else {
            info!("telegram notifications disabled; drift is only logged");
            Arc::new(LogNotifier)
        };
        Ok(Self::new(
            acquisition,
            api,
            SnapshotStore::new(config.snapshot_path()),
            notifier,
            config.api.owner_id.clone(),
            config.api.page_size,
        )
        .with_formatter(NotificationFormatter::from_config(&config.notify)))
    }

    pub async fn run_once(&mut self) -> WatchResult<CycleReport> {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%cycle_id, owner_id = %self.owner_id, "watch cycle started");

        let prior = self.store.load()?;
        let credential = self.acquisition.acquire().await?;
        let current = fetch_entities(
            self.api.as_ref(),
            &credential,
            &self.owner_id,
            self.page_size,
        )
        .await?;

        let drift = diff(&prior, &current);
        let message = self.formatter.format(&drift, &prior, &current);
        info!(
            %cycle_id,
            entities = current.len(),
            added = drift.added.len(),
            removed = drift.removed.len(),
            "drift computed"
        );

        // persisted before dispatch so a failed send never replays the drift
        self.store.save(&current)?;

        let notified = match &message {
            Some(text) => self.dispatch(text).await,
            None => {
                info!(%cycle_id, "no drift; nothing to send");
                false
            }
        };

        Ok(CycleReport {
            cycle_id,
            started_at,
            finished_at: Utc::now(),
            entities: current.len(),
            added: records(&drift.added, &current),
            removed: records(&drift.removed, &prior),
            notified,
            message,
        })
    }

    async fn dispatch(&self, text: &str) -> bool {
        match self.notifier.send(text).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(notifier = self.notifier.name(), "notification was not accepted");
                false
            }
            Err(err) => {
                error!(notifier = self.notifier.name(), error = %err, "notification failed");
                false
            }
        }
    }
}

fn records<'a>(
    ids: impl IntoIterator<Item = &'a String>,
    labels: &EntitySnapshot,
) -> Vec<EntityRecord> {
    ids.into_iter()
        .map(|id| EntityRecord::new(id.clone(), labels.get(id).unwrap_or_default()))
        .collect()
}
