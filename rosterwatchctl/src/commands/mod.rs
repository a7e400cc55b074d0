pub mod snapshot;
pub mod watch;
