//! Public entry point: the watch manager.
//!
//! Owns the shared registry state, the listener and the notification
//! broadcaster. Every mutation takes the shared lock once, so a watch is
//! never half-armed from the dispatcher's point of view.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::config::ListenerConfig;
use crate::listener::{Listener, ListenerState, Shared};
use crate::notify::{Notification, NotificationBroadcaster};
use crate::watch::{Destination, RegistrySnapshot, Watch, WatchError, WatchRegistry};

/// One row of [`WatchManager::list_watches`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSummary {
    pub path: PathBuf,
    pub mask_letters: String,
    pub type_letter: &'static str,
    pub destinations: Vec<Destination>,
    /// Whether the requesting destination is on the list.
    pub subscribed: bool,
}

impl fmt::Display for WatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.path.display())?;
        if !self.type_letter.is_empty() {
            write!(f, "{}:", self.type_letter)?;
        }
        write!(f, "{})", self.mask_letters)?;
        if self.subscribed {
            f.write_str(" (watched)")?;
        }
        Ok(())
    }
}

/// Listener status as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub listening: bool,
    pub state: ListenerState,
    pub watches: usize,
    pub armed: usize,
}

/// Outcome of a create or subscribe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Created {
    /// A new watch was registered.
    New,
    /// A watch for the path already existed.
    Existing,
}

/// Manages watches and the listener for one process.
#[derive(Debug)]
pub struct WatchManager {
    shared: Arc<Mutex<Shared>>,
    listener: Listener,
    broadcaster: NotificationBroadcaster,
}

impl WatchManager {
    /// Create a manager with an empty registry. Nothing is armed until
    /// [`start`](Self::start).
    pub fn new(config: &ListenerConfig) -> Self {
        Self::with_registry(WatchRegistry::new(), config)
    }

    /// Create a manager from a persisted snapshot.
    pub fn from_snapshot(snapshot: RegistrySnapshot, config: &ListenerConfig) -> Self {
        Self::with_registry(WatchRegistry::from_snapshot(snapshot), config)
    }

    fn with_registry(registry: WatchRegistry, config: &ListenerConfig) -> Self {
        let shared = Arc::new(Mutex::new(Shared::new(registry)));
        let broadcaster = NotificationBroadcaster::new(config.channel_capacity);
        let listener = Listener::new(shared.clone(), broadcaster.clone(), config);
        Self {
            shared,
            listener,
            broadcaster,
        }
    }

    /// Snapshot for the storage collaborator. Kernel handles are excluded.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.shared.lock().registry.snapshot()
    }

    /// Receive every notification the listener dispatches.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.broadcaster.subscribe()
    }

    pub fn broadcaster(&self) -> &NotificationBroadcaster {
        &self.broadcaster
    }

    /// Register a watch without subscribing anyone.
    ///
    /// An existing watch for `path` is left untouched.
    pub fn create_watch(
        &self,
        path: &Path,
        event_spec: &str,
        type_spec: &str,
    ) -> Result<(Watch, Created), WatchError> {
        self.register(path, event_spec, type_spec, None)
    }

    /// Subscribe `destination` to `path`, creating and arming the watch if
    /// needed. Subscribing twice is a no-op.
    pub fn subscribe(
        &self,
        path: &Path,
        event_spec: &str,
        type_spec: &str,
        destination: Destination,
    ) -> Result<(Watch, Created), WatchError> {
        self.register(path, event_spec, type_spec, Some(destination))
    }

    fn register(
        &self,
        path: &Path,
        event_spec: &str,
        type_spec: &str,
        destination: Option<Destination>,
    ) -> Result<(Watch, Created), WatchError> {
        if !path.exists() {
            return Err(WatchError::PathNotFound {
                path: path.to_path_buf(),
            });
        }

        let mut shared = self.shared.lock();

        if let Some(watch) = shared.registry.lookup_mut(&resolve(path)) {
            if let Some(destination) = destination {
                if watch.add_destination(destination.clone()) {
                    crate::log_event!(
                        "manager",
                        "subscribed",
                        "{destination} to {}",
                        watch.path().display()
                    );
                } else {
                    crate::debug_event!(
                        "manager",
                        "already subscribed",
                        "{destination} to {}",
                        watch.path().display()
                    );
                }
            } else {
                crate::debug_event!("manager", "watch exists", "{}", watch.path().display());
            }
            return Ok((watch.clone(), Created::Existing));
        }

        let mut watch = Watch::create(path, event_spec, type_spec)?;
        if let Some(destination) = destination {
            watch.add_destination(destination);
        }
        let watch_path = watch.path().to_path_buf();
        shared.registry.add(watch)?;

        if let Err(e) = shared.arm(&watch_path) {
            // stays registered; the next start retries
            tracing::warn!("[manager] {e}");
        }

        let watch = shared
            .registry
            .lookup(&watch_path)
            .cloned()
            .ok_or_else(|| WatchError::NotFound {
                path: watch_path.clone(),
            })?;

        crate::log_event!(
            "manager",
            "watch added",
            "{} ({})",
            watch.path().display(),
            watch.mask_letters()
        );
        Ok((watch, Created::New))
    }

    /// Remove `destination` from the watch for `path`.
    pub fn unsubscribe(&self, path: &Path, destination: &Destination) -> Result<(), WatchError> {
        let mut shared = self.shared.lock();
        let watch = shared
            .registry
            .lookup_mut(&resolve(path))
            .ok_or_else(|| WatchError::NotFound {
                path: path.to_path_buf(),
            })?;

        if !watch.remove_destination(destination) {
            return Err(WatchError::NotSubscribed {
                path: path.to_path_buf(),
                destination: destination.clone(),
            });
        }

        crate::log_event!(
            "manager",
            "unsubscribed",
            "{destination} from {}",
            watch.path().display()
        );
        Ok(())
    }

    /// Disarm and forget the watch for `path`.
    pub fn remove_watch(&self, path: &Path) -> Result<Watch, WatchError> {
        let removed = self.shared.lock().remove(&resolve(path))?;
        crate::log_event!("manager", "watch removed", "{}", removed.path().display());
        Ok(removed)
    }

    /// Look up a watch by path.
    pub fn lookup(&self, path: &Path) -> Option<Watch> {
        self.shared.lock().registry.lookup(&resolve(path)).cloned()
    }

    /// Destinations subscribed to `path`.
    pub fn watchers_of(&self, path: &Path) -> Result<Vec<Destination>, WatchError> {
        self.shared
            .lock()
            .registry
            .lookup(&resolve(path))
            .map(|watch| watch.destinations().cloned().collect())
            .ok_or_else(|| WatchError::NotFound {
                path: path.to_path_buf(),
            })
    }

    /// Summaries of all watches, marking those `requester` is subscribed to.
    pub fn list_watches(&self, requester: Option<&Destination>) -> Vec<WatchSummary> {
        self.shared
            .lock()
            .registry
            .all()
            .map(|watch| WatchSummary {
                path: watch.path().to_path_buf(),
                mask_letters: watch.mask_letters(),
                type_letter: watch.entry_filter().letter(),
                destinations: watch.destinations().cloned().collect(),
                subscribed: requester.is_some_and(|r| watch.has_destination(r)),
            })
            .collect()
    }

    pub fn status(&self) -> Status {
        let shared = self.shared.lock();
        Status {
            listening: self.listener.alive(),
            state: self.listener.state(),
            watches: shared.registry.len(),
            armed: shared.armed_count(),
        }
    }

    /// Start listening. No-op if already listening.
    pub fn start(&mut self) -> Result<(), WatchError> {
        self.listener.start()
    }

    /// Stop listening and release the kernel descriptor.
    pub async fn stop(&mut self) -> Result<(), WatchError> {
        self.listener.stop().await
    }
}

/// Registry key for `path`: canonical while it exists, lexical once it is gone.
fn resolve(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> WatchManager {
        WatchManager::new(&ListenerConfig::default())
    }

    #[test]
    fn test_create_watch_leaves_existing_untouched() {
        let dir = TempDir::new().unwrap();
        let manager = manager();

        let (_, created) = manager
            .subscribe(dir.path(), "C", "", Destination::from("#ops"))
            .unwrap();
        assert_eq!(created, Created::New);

        let (watch, created) = manager.create_watch(dir.path(), "D", "dir").unwrap();
        assert_eq!(created, Created::Existing);
        assert_eq!(watch.mask_letters(), "C");
        assert_eq!(watch.destinations().count(), 1);
    }

    #[test]
    fn test_subscribe_twice_keeps_one_copy() {
        let dir = TempDir::new().unwrap();
        let manager = manager();
        let dest = Destination::from("#ops");

        manager.subscribe(dir.path(), "C", "", dest.clone()).unwrap();
        let (watch, created) = manager.subscribe(dir.path(), "C", "", dest.clone()).unwrap();

        assert_eq!(created, Created::Existing);
        assert_eq!(watch.destinations().collect::<Vec<_>>(), vec![&dest]);
    }

    #[test]
    fn test_subscribe_adds_second_destination() {
        let dir = TempDir::new().unwrap();
        let manager = manager();

        manager.subscribe(dir.path(), "C", "", "#ops".into()).unwrap();
        manager.subscribe(dir.path(), "D", "", "alice".into()).unwrap();

        assert_eq!(
            manager.watchers_of(dir.path()).unwrap(),
            vec![Destination::from("#ops"), Destination::from("alice")]
        );
    }

    #[test]
    fn test_missing_path_fails_fast() {
        let manager = manager();
        let missing = Path::new("/no/such/dir/anywhere");

        assert!(matches!(
            manager.create_watch(missing, "", ""),
            Err(WatchError::PathNotFound { .. })
        ));
        assert!(matches!(
            manager.subscribe(missing, "", "", "#ops".into()),
            Err(WatchError::PathNotFound { .. })
        ));
        assert!(manager.list_watches(None).is_empty());
    }

    #[test]
    fn test_alias_spelling_joins_existing_watch() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("d");
        std::fs::create_dir(&target).unwrap();
        let alias = target.join("..").join("d");
        let manager = manager();

        manager.subscribe(&target, "create", "", "#a".into()).unwrap();
        let (watch, created) = manager.subscribe(&alias, "delete", "", "#b".into()).unwrap();

        assert_eq!(created, Created::Existing);
        assert_eq!(watch.mask_letters(), "C");
        assert_eq!(manager.list_watches(None).len(), 1);
        assert_eq!(
            manager.watchers_of(&alias).unwrap(),
            vec![Destination::from("#a"), Destination::from("#b")]
        );

        manager.remove_watch(&alias).unwrap();
        assert!(manager.lookup(&target).is_none());
    }

    #[test]
    fn test_unsubscribe() {
        let dir = TempDir::new().unwrap();
        let manager = manager();
        let dest = Destination::from("#ops");
        manager.subscribe(dir.path(), "", "", dest.clone()).unwrap();

        manager.unsubscribe(dir.path(), &dest).unwrap();

        assert!(matches!(
            manager.unsubscribe(dir.path(), &dest),
            Err(WatchError::NotSubscribed { .. })
        ));
        assert!(matches!(
            manager.unsubscribe(Path::new("/nowhere"), &dest),
            Err(WatchError::NotFound { .. })
        ));
        // watch itself survives
        assert!(manager.lookup(dir.path()).is_some());
    }

    #[test]
    fn test_remove_watch() {
        let dir = TempDir::new().unwrap();
        let manager = manager();
        manager.create_watch(dir.path(), "", "").unwrap();

        manager.remove_watch(dir.path()).unwrap();

        assert!(manager.lookup(dir.path()).is_none());
        assert!(matches!(
            manager.remove_watch(dir.path()),
            Err(WatchError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_watches() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let manager = manager();
        manager.subscribe(a.path(), "CD", "", "#ops".into()).unwrap();
        manager.create_watch(b.path(), "update", "files").unwrap();

        let rows = manager.list_watches(Some(&Destination::from("#ops")));

        assert_eq!(rows.len(), 2);
        assert!(rows[0].subscribed);
        assert_eq!(rows[0].to_string(), format!("{} (CD) (watched)", a.path().display()));
        assert!(!rows[1].subscribed);
        assert_eq!(rows[1].to_string(), format!("{} (F:U)", b.path().display()));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let manager = manager();
        manager
            .subscribe(dir.path(), "move", "dir", "#ops".into())
            .unwrap();

        let restored = WatchManager::from_snapshot(manager.snapshot(), &ListenerConfig::default());

        let rows = restored.list_watches(None);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mask_letters, "M");
        assert_eq!(rows[0].type_letter, "D");
        assert_eq!(rows[0].destinations, vec![Destination::from("#ops")]);
    }

    #[test]
    fn test_status_when_stopped() {
        let dir = TempDir::new().unwrap();
        let manager = manager();
        manager.create_watch(dir.path(), "", "").unwrap();

        let status = manager.status();

        assert!(!status.listening);
        assert_eq!(status.state, ListenerState::Stopped);
        assert_eq!(status.watches, 1);
        assert_eq!(status.armed, 0);
    }
}
