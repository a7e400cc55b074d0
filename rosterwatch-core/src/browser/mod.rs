mod automation;
mod driver;
mod error;
mod profile;
mod reaper;
mod storage;

pub use automation::{BrowserLauncher, ChromiumSession};
pub use driver::{poll_markers, BrowserMode, BrowserSession, MarkerPresence, SessionLauncher};
pub use error::{BrowserError, BrowserResult};
pub use profile::{BrowserProfile, ProfileManager};
pub use reaper::{CommandExecutor, StaleProcessReaper, SystemCommandExecutor};
pub use storage::{decode_storage_payload, StorageSnapshot, READ_STORAGE_SCRIPT};
