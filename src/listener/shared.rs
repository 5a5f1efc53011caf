//! State shared between the foreground API and the listener task.
//!
//! The registry, the handle -> path reverse index and the kernel backend sit
//! behind one mutex so arming, disarming and destination changes never race
//! with dispatch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::notify::Notification;
use crate::watch::{Watch, WatchBackend, WatchError, WatchHandle, WatchRegistry};

use super::record::RawEvent;

/// Kernel backend as held by the shared state.
pub type SharedBackend = Arc<dyn WatchBackend + Send + Sync>;

#[derive(Default)]
pub struct Shared {
    pub(crate) registry: WatchRegistry,
    index: HashMap<WatchHandle, PathBuf>,
    backend: Option<SharedBackend>,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("registry", &self.registry)
            .field("index", &self.index)
            .field("attached", &self.backend.is_some())
            .finish()
    }
}

impl Shared {
    pub fn new(registry: WatchRegistry) -> Self {
        Self {
            registry,
            index: HashMap::new(),
            backend: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.backend.is_some()
    }

    /// Path registered under a kernel handle.
    pub fn resolve(&self, handle: WatchHandle) -> Option<&Path> {
        self.index.get(&handle).map(PathBuf::as_path)
    }

    pub fn armed_count(&self) -> usize {
        self.index.len()
    }

    /// Use `backend` for all subsequent arming.
    pub fn attach(&mut self, backend: SharedBackend) {
        self.backend = Some(backend);
    }

    /// Drop the backend. Any handles still recorded are forgotten.
    pub fn detach(&mut self) -> Option<SharedBackend> {
        for watch in self.registry.all_mut() {
            watch.clear_handle();
        }
        self.index.clear();
        self.backend.take()
    }

    /// Arm the watch for `path` if a backend is attached.
    ///
    /// Returns `Ok(None)` while detached; the watch is armed on next start.
    pub fn arm(&mut self, path: &Path) -> Result<Option<WatchHandle>, WatchError> {
        let Some(backend) = self.backend.as_deref() else {
            return Ok(None);
        };
        arm_one(&mut self.registry, &mut self.index, backend, path).map(Some)
    }

    /// Arm every registered watch. Failures are logged and left unarmed.
    pub fn arm_all(&mut self) -> usize {
        let Some(backend) = self.backend.as_deref() else {
            return 0;
        };

        self.index.clear();
        let paths: Vec<PathBuf> = self
            .registry
            .all()
            .map(|watch| watch.path().to_path_buf())
            .collect();
        for path in paths {
            if let Err(e) = arm_one(&mut self.registry, &mut self.index, backend, &path) {
                tracing::warn!("[listener] {e}");
            }
        }
        self.index.len()
    }

    /// Forget a handle the kernel has already released (`IN_IGNORED` after
    /// the watched entry was deleted or unmounted).
    ///
    /// Returns the path that lost its registration, if any.
    pub fn forget(&mut self, handle: WatchHandle) -> Option<PathBuf> {
        let path = self.index.remove(&handle)?;
        if let Some(watch) = self.registry.lookup_mut(&path) {
            if watch.handle() == Some(handle) {
                watch.clear_handle();
            }
        }
        Some(path)
    }

    /// Disarm every watch. Failures are logged, never fatal.
    pub fn disarm_all(&mut self) {
        if let Some(backend) = self.backend.as_deref() {
            for watch in self.registry.all_mut() {
                if let Err(e) = watch.disarm(backend) {
                    tracing::warn!("[listener] {e}");
                }
            }
        }
        self.index.clear();
    }

    /// Remove a watch from the registry, disarming it first.
    pub fn remove(&mut self, path: &Path) -> Result<Watch, WatchError> {
        if let Some(handle) = self.registry.lookup(path).and_then(Watch::handle) {
            self.index.remove(&handle);
        }

        let backend = self.backend.as_deref().map(|b| b as &dyn WatchBackend);
        self.registry.remove(path, backend)
    }

    /// Match a named record against its watch.
    ///
    /// `None` when the handle is unknown (removed while the record was in
    /// flight), the watch does not match, or nobody is subscribed.
    pub fn route(&self, event: &RawEvent) -> Option<Notification> {
        let Some(path) = self.index.get(&event.handle) else {
            crate::debug_event!("listener", "unknown handle", "{}", event.handle);
            return None;
        };
        let watch = self.registry.lookup(path)?;

        if !watch.matches(event.mask, event.mask.is_dir()) {
            crate::debug_event!(
                "listener",
                "no match",
                "{} {:?} {}",
                path.display(),
                event.mask,
                event.name
            );
            return None;
        }

        let destinations: Vec<_> = watch.destinations().cloned().collect();
        if destinations.is_empty() {
            crate::debug_event!("listener", "no destinations", "{}", path.display());
            return None;
        }

        Some(Notification {
            destinations,
            message: watch.render_event(event.mask, &event.name),
        })
    }
}

/// Arm one watch and record its handle in `index`.
///
/// The kernel keys watches by inode, so two spellings of one directory get
/// the same handle and the second registration replaces the first one's
/// mask. A handle already owned by another path is refused: the newcomer
/// stays unarmed and the owner's mask is put back.
fn arm_one(
    registry: &mut WatchRegistry,
    index: &mut HashMap<WatchHandle, PathBuf>,
    backend: &dyn WatchBackend,
    path: &Path,
) -> Result<WatchHandle, WatchError> {
    let watch = registry
        .lookup_mut(path)
        .ok_or_else(|| WatchError::NotFound {
            path: path.to_path_buf(),
        })?;

    if let Some(old) = watch.handle() {
        index.remove(&old);
    }

    let handle = watch.arm(backend)?;
    let watch_path = watch.path().to_path_buf();

    let owner = index
        .get(&handle)
        .filter(|owner| **owner != watch_path)
        .cloned();
    let Some(owner) = owner else {
        index.insert(handle, watch_path);
        return Ok(handle);
    };

    watch.clear_handle();
    if let Some(owner_watch) = registry.lookup_mut(&owner) {
        if let Err(e) = owner_watch.arm(backend) {
            tracing::warn!("[listener] restoring {}: {e}", owner.display());
        }
    }
    tracing::warn!(
        "[listener] {} is the same entry as {}; left unarmed",
        watch_path.display(),
        owner.display()
    );
    Err(WatchError::DuplicatePath { path: watch_path })
}
