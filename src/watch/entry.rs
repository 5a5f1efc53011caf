//! A single path subscription and its kernel registration.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::codec::{self, EntryFilter, EventMask};
use super::error::WatchError;
use crate::notify::{EntryKind, StructuredMessage};

/// Opaque identifier of a notification target (a channel, a user, stdout).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Destination(String);

impl Destination {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Destination {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Destination {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Watch descriptor assigned by the kernel when a path is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(pub i32);

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd{}", self.0)
    }
}

/// Kernel side of arming and disarming watches.
///
/// Implemented by the inotify descriptor; tests substitute an in-memory fake.
pub trait WatchBackend {
    fn add_watch(&self, path: &Path, mask: EventMask) -> std::io::Result<WatchHandle>;

    fn rm_watch(&self, handle: WatchHandle) -> std::io::Result<()>;
}

/// Strip trailing separators and `.` components.
pub fn normalize_path(path: &Path) -> PathBuf {
    let normalized: PathBuf = path.components().collect();
    if normalized.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        normalized
    }
}

/// One path's subscription: what to listen for and who to tell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watch {
    path: PathBuf,
    mask: EventMask,
    #[serde(default)]
    entry_filter: EntryFilter,
    #[serde(default)]
    destinations: IndexSet<Destination>,
    #[serde(skip)]
    handle: Option<WatchHandle>,
}

impl Watch {
    /// Build an unarmed watch.
    ///
    /// The path must exist now. It is stored canonicalised (symlinks and
    /// `..` resolved), so every spelling of one directory is one watch.
    pub fn create(path: &Path, mask_spec: &str, filter_spec: &str) -> Result<Self, WatchError> {
        let canonical = std::fs::canonicalize(path).map_err(|_| WatchError::PathNotFound {
            path: path.to_path_buf(),
        })?;

        let watch = Self {
            path: normalize_path(&canonical),
            mask: codec::parse_mask(mask_spec),
            entry_filter: codec::parse_entry_filter(filter_spec),
            destinations: IndexSet::new(),
            handle: None,
        };

        crate::debug_event!(
            "watch",
            "created",
            "{} mask={} filter={:?}",
            watch.path.display(),
            watch.mask_letters(),
            watch.entry_filter
        );

        Ok(watch)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mask(&self) -> EventMask {
        self.mask
    }

    pub fn entry_filter(&self) -> EntryFilter {
        self.entry_filter
    }

    pub fn handle(&self) -> Option<WatchHandle> {
        self.handle
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    pub fn destinations(&self) -> impl Iterator<Item = &Destination> {
        self.destinations.iter()
    }

    pub fn has_destination(&self, id: &Destination) -> bool {
        self.destinations.contains(id)
    }

    pub fn mask_letters(&self) -> String {
        codec::mask_to_letters(self.mask)
    }

    pub fn mask_words(&self) -> String {
        codec::mask_to_words(self.mask)
    }

    /// Register with the kernel and remember the returned handle.
    ///
    /// An already armed watch is re-armed; the old handle is dropped.
    pub fn arm(&mut self, backend: &dyn WatchBackend) -> Result<WatchHandle, WatchError> {
        let handle = backend
            .add_watch(&self.path, self.mask)
            .map_err(|source| WatchError::KernelWatch {
                path: self.path.clone(),
                source,
            })?;

        crate::debug_event!("watch", "armed", "{} -> {handle}", self.path.display());
        self.handle = Some(handle);
        Ok(handle)
    }

    /// Remove the kernel registration. No-op when not armed.
    ///
    /// The handle is cleared even if the kernel call fails; a failed
    /// `rm_watch` usually means the kernel already dropped the watch.
    pub fn disarm(&mut self, backend: &dyn WatchBackend) -> Result<(), WatchError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        crate::debug_event!("watch", "disarmed", "{} ({handle})", self.path.display());
        backend
            .rm_watch(handle)
            .map_err(|source| WatchError::KernelWatch {
                path: self.path.clone(),
                source,
            })
    }

    /// Forget the kernel handle without telling the kernel.
    ///
    /// Used once the notification descriptor is gone.
    pub(crate) fn clear_handle(&mut self) {
        self.handle = None;
    }

    /// Add a destination. Returns false if it was already present.
    pub fn add_destination(&mut self, id: Destination) -> bool {
        self.destinations.insert(id)
    }

    /// Remove a destination, reporting whether it was present.
    pub fn remove_destination(&mut self, id: &Destination) -> bool {
        self.destinations.shift_remove(id)
    }

    /// Whether a record with `event_mask` concerns this watch.
    ///
    /// Any overlapping bit matches; several bits may be set in one record.
    pub fn matches(&self, event_mask: EventMask, is_directory: bool) -> bool {
        self.entry_filter.admits(is_directory) && self.mask.intersects(event_mask)
    }

    pub fn render_event(&self, event_mask: EventMask, filename: &str) -> StructuredMessage {
        StructuredMessage {
            entry_kind: EntryKind::from_is_dir(event_mask.is_dir()),
            event_description: codec::mask_to_words(event_mask),
            path: self.path.clone(),
            filename: filename.to_string(),
        }
    }
}
