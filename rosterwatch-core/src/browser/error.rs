use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser session could not be created: {0}")]
    SessionCreation(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("profile error: {0}")]
    Profile(String),
    #[error("client storage read failed: {0}")]
    Storage(String),
    #[error("stale process cleanup failed: {0}")]
    Reap(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}
