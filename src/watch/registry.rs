//! Registry of live watches, keyed by path.
//!
//! Registries are small and curated by hand, so lookups are linear scans
//! over a `Vec` that keeps insertion order for listings.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::entry::{Watch, WatchBackend, normalize_path};
use super::error::WatchError;

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable form of the registry handed to storage.
///
/// Kernel handles are never included; they are re-armed on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub watches: Vec<Watch>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            watches: Vec::new(),
        }
    }
}

/// Collection of watches with unique paths.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    watches: Vec<Watch>,
}

impl WatchRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from a snapshot.
    ///
    /// Later duplicates of a path are dropped.
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let mut registry = Self::new();
        for watch in snapshot.watches {
            if let Err(e) = registry.add(watch) {
                tracing::warn!("[registry] skipping snapshot entry: {e}");
            }
        }
        registry
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            version: SNAPSHOT_VERSION,
            watches: self.watches.clone(),
        }
    }

    pub fn lookup(&self, path: &Path) -> Option<&Watch> {
        let path = normalize_path(path);
        self.watches.iter().find(|w| w.path() == path)
    }

    pub fn lookup_mut(&mut self, path: &Path) -> Option<&mut Watch> {
        let path = normalize_path(path);
        self.watches.iter_mut().find(|w| w.path() == path)
    }

    /// Insert a watch whose path is not yet registered.
    pub fn add(&mut self, watch: Watch) -> Result<&mut Watch, WatchError> {
        if self.lookup(watch.path()).is_some() {
            return Err(WatchError::DuplicatePath {
                path: watch.path().to_path_buf(),
            });
        }

        crate::debug_event!("registry", "added", "{}", watch.path().display());
        self.watches.push(watch);
        let last = self.watches.len() - 1;
        Ok(&mut self.watches[last])
    }

    /// Remove a watch, disarming it first when a backend is available.
    ///
    /// Disarm failures are logged; the watch is removed regardless.
    pub fn remove(
        &mut self,
        path: &Path,
        backend: Option<&dyn WatchBackend>,
    ) -> Result<Watch, WatchError> {
        let normalized = normalize_path(path);
        let index = self
            .watches
            .iter()
            .position(|w| w.path() == normalized)
            .ok_or_else(|| WatchError::NotFound {
                path: path.to_path_buf(),
            })?;

        let mut watch = self.watches.remove(index);
        match backend {
            Some(backend) => {
                if let Err(e) = watch.disarm(backend) {
                    tracing::warn!("[registry] {e}");
                }
            }
            None => watch.clear_handle(),
        }

        crate::debug_event!("registry", "removed", "{}", watch.path().display());
        Ok(watch)
    }

    pub fn all(&self) -> impl Iterator<Item = &Watch> {
        self.watches.iter()
    }

    pub fn all_mut(&mut self) -> impl Iterator<Item = &mut Watch> {
        self.watches.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }
}
