use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("permission denied by api (code {code}): {message}")]
    Permission { code: i64, message: String },
    #[error("api error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("unexpected api response: {0}")]
    Unexpected(String),
}

impl GraphError {
    /// The credential cannot be used for this call; retrying will not help.
    pub fn is_permission(&self) -> bool {
        matches!(self, GraphError::Permission { .. })
    }
}

pub type GraphResult<T> = Result<T, GraphError>;
