use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::WatchConfig;

use super::error::{BrowserError, BrowserResult};

/// Lock artifacts Chromium leaves in the user data dir while an instance owns it.
const SINGLETON_ARTIFACTS: [&str; 3] = ["SingletonLock", "SingletonSocket", "SingletonCookie"];

/// A persistent Chromium profile. The login session survives between runs,
/// so the same directory is reused for every launch.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    name: String,
    user_data_dir: PathBuf,
}

impl BrowserProfile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.user_data_dir
    }

    pub async fn touch(&self) -> BrowserResult<()> {
        if self.user_data_dir.exists() {
            let marker = self.user_data_dir.join(".last_used");
            let mut file = fs::File::create(&marker).await.map_err(|err| {
                BrowserError::Profile(format!("failed to write profile marker: {err}"))
            })?;
            file.write_all(Utc::now().to_rfc3339().as_bytes())
                .await
                .map_err(|err| {
                    BrowserError::Profile(format!("failed to update profile marker: {err}"))
                })?;
        }
        Ok(())
    }

    /// Removes the singleton lock files a crashed instance leaves behind.
    /// Returns how many were removed.
    pub fn clear_singleton_locks(&self) -> BrowserResult<usize> {
        let mut removed = 0;
        for artifact in SINGLETON_ARTIFACTS {
            let path = self.user_data_dir.join(artifact);
            // symlink_metadata: SingletonLock is a dangling symlink on Linux.
            if std::fs::symlink_metadata(&path).is_err() {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "removed stale profile lock");
                    removed += 1;
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove stale profile lock");
                    return Err(BrowserError::Profile(format!(
                        "failed to remove {}: {err}",
                        path.display()
                    )));
                }
            }
        }
        Ok(removed)
    }
}

#[derive(Debug, Clone)]
pub struct ProfileManager {
    base_dir: PathBuf,
    name: String,
}

impl ProfileManager {
    pub fn new<P: AsRef<Path>>(base_dir: P, name: impl Into<String>) -> BrowserResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir).map_err(|err| {
            BrowserError::Profile(format!("failed to create profile base dir: {err}"))
        })?;
        Ok(Self {
            base_dir,
            name: name.into(),
        })
    }

    pub fn from_config(config: &WatchConfig) -> BrowserResult<Self> {
        Self::new(config.profile_dir(), config.chromium.profile_name.clone())
    }

    pub fn profile(&self) -> BrowserProfile {
        BrowserProfile {
            name: self.name.clone(),
            user_data_dir: self.base_dir.clone(),
        }
    }
}
