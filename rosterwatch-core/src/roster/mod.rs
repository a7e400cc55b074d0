mod drift;
mod format;
mod snapshot;
mod store;

pub use drift::{diff, DriftResult};
pub use format::NotificationFormatter;
pub use snapshot::{EntityId, EntityRecord, EntitySnapshot};
pub use store::{SnapshotError, SnapshotResult, SnapshotStore};
