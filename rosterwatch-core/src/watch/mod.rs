mod cycle;
mod runner;

pub use cycle::{CycleReport, WatchCycle, WatchError, WatchResult};
pub use runner::{WatchSummary, Watcher};
