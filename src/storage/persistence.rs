//! JSON file store for registry snapshots.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{StorageError, StorageResult};
use crate::watch::{RegistrySnapshot, SNAPSHOT_VERSION};

/// Reads and writes a [`RegistrySnapshot`] at a fixed path.
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

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the snapshot, or an empty one if the file does not exist yet.
    #[must_use = "Load errors should be handled appropriately"]
    pub fn load(&self) -> StorageResult<RegistrySnapshot> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                crate::debug_event!("storage", "no snapshot", "{}", self.path.display());
                return Ok(RegistrySnapshot::default());
            }
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let snapshot: RegistrySnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }

        crate::debug_event!(
            "storage",
            "loaded",
            "{} watches from {}",
            snapshot.watches.len(),
            self.path.display()
        );
        Ok(snapshot)
    }

    /// Write the snapshot atomically (temp file in the same directory, then rename).
    #[must_use = "Save errors should be handled to ensure data is persisted"]
    pub fn save(&self, snapshot: &RegistrySnapshot) -> StorageResult<()> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let json = serde_json::to_vec_pretty(snapshot)?;
        let mut file = NamedTempFile::new_in(&dir).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.persist(&self.path).map_err(|e| io_err(e.error))?;

        crate::debug_event!(
            "storage",
            "saved",
            "{} watches to {}",
            snapshot.watches.len(),
            self.path.display()
        );
        Ok(())
    }
}
