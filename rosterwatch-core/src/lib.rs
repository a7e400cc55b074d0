pub mod browser;
pub mod config;
pub mod error;
pub mod graph;
pub mod notify;
pub mod roster;
pub mod session;
pub mod watch;

pub use config::{
    load_watch_config, ApiSection, ChromiumSection, NotifySection, PathsSection, ScheduleSection,
    SessionSection, WatchConfig,
};
pub use error::{ConfigError, Result};
pub use graph::{fetch_entities, ApiMethod, ApiRequest, GraphApi, GraphClient, GraphError};
pub use notify::{LogNotifier, Notifier, NotifyError, TelegramNotifier};
pub use roster::{
    diff, DriftResult, EntityRecord, EntitySnapshot, NotificationFormatter, SnapshotStore,
};
pub use session::{AcquisitionController, AcquisitionError, AcquisitionState, Credential};
pub use watch::{CycleReport, WatchCycle, WatchError, WatchSummary, Watcher};
