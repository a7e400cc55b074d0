use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use super::snapshot::EntitySnapshot;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to access snapshot {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("snapshot {path} is not valid JSON: {source}")]
    Serde {
        source: serde_json::Error,
        path: PathBuf,
    },
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// The single persisted snapshot file. Writes replace the file in one rename,
/// so readers see either the old or the new snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty snapshot.
    pub fn load(&self) -> SnapshotResult<EntitySnapshot> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no stored snapshot yet; starting empty");
                return Ok(EntitySnapshot::new());
            }
            Err(source) => return Err(self.io_error(source)),
        };
        let snapshot: EntitySnapshot =
            serde_json::from_str(&content).map_err(|source| SnapshotError::Serde {
                source,
                path: self.path.clone(),
            })?;
        debug!(path = %self.path.display(), entities = snapshot.len(), "snapshot loaded");
        Ok(snapshot)
    }

    pub fn save(&self, snapshot: &EntitySnapshot) -> SnapshotResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|source| SnapshotError::Io {
            source,
            path: dir.clone(),
        })?;

        let json = serde_json::to_vec_pretty(snapshot).map_err(|source| SnapshotError::Serde {
            source,
            path: self.path.clone(),
        })?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|source| SnapshotError::Io {
            source,
            path: dir.clone(),
        })?;
        tmp.write_all(&json).map_err(|source| self.io_error(source))?;
        tmp.as_file()
            .sync_all()
            .map_err(|source| self.io_error(source))?;
        tmp.persist(&self.path)
            .map_err(|err| self.io_error(err.error))?;

        info!(path = %self.path.display(), entities = snapshot.len(), "snapshot saved");
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> SnapshotError {
        SnapshotError::Io {
            source,
            path: self.path.clone(),
        }
    }
}
