//! Background listener that owns the inotify descriptor.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped --start--> Armed --spawn--> Listening --stop--> Stopping --> Stopped
//! ```
//!
//! `start` opens the descriptor and arms every registered watch, then spawns
//! a task that waits for readability (or cancellation), decodes records and
//! routes them. `stop` cancels the task, waits a bounded grace period,
//! disarms everything and closes the descriptor.

pub mod kernel;
pub mod record;
mod shared;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ListenerConfig;
use crate::notify::NotificationBroadcaster;
use crate::watch::{EventMask, WatchError};

pub use kernel::Inotify;
pub use record::{RawEvent, Records};
pub use shared::{Shared, SharedBackend};

/// Pause after a failed read before waiting again.
const READ_RETRY: Duration = Duration::from_millis(250);

/// Listener lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Armed,
    Listening,
    Stopping,
}

/// Owns the listener task and its cancellation token.
#[derive(Debug)]
pub struct Listener {
    shared: Arc<Mutex<Shared>>,
    broadcaster: NotificationBroadcaster,
    stop_grace: Duration,
    buffer_size: usize,
    state: ListenerState,
    task: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
}

impl Listener {
    pub fn new(
        shared: Arc<Mutex<Shared>>,
        broadcaster: NotificationBroadcaster,
        config: &ListenerConfig,
    ) -> Self {
        Self {
            shared,
            broadcaster,
            stop_grace: Duration::from_millis(config.stop_grace_ms),
            buffer_size: config.buffer_size.max(record::MIN_BUFFER_LEN),
            state: ListenerState::Stopped,
            task: None,
            cancel: None,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Listening and the task has not died on its own.
    pub fn alive(&self) -> bool {
        self.state == ListenerState::Listening
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Open the descriptor, arm all watches and spawn the listener task.
    ///
    /// No-op while alive. Must be called inside a tokio runtime.
    pub fn start(&mut self) -> Result<(), WatchError> {
        if self.alive() {
            crate::debug_event!("listener", "already listening");
            return Ok(());
        }
        if self.state != ListenerState::Stopped {
            tracing::warn!("[listener] task ended unexpectedly, restarting");
            self.teardown();
        }

        let kernel = Arc::new(Inotify::open().map_err(|e| WatchError::InitFailed {
            reason: format!("inotify_init1: {e}"),
        })?);

        let armed = {
            let mut shared = self.shared.lock();
            shared.attach(kernel.clone());
            let armed = shared.arm_all();
            crate::log_event!(
                "listener",
                "armed",
                "{armed} of {} watches on fd {}",
                shared.registry.len(),
                kernel.raw_fd()
            );
            armed
        };
        self.state = ListenerState::Armed;

        let token = CancellationToken::new();
        self.task = Some(tokio::spawn(listen(
            kernel,
            self.shared.clone(),
            self.broadcaster.clone(),
            token.clone(),
            self.buffer_size,
        )));
        self.cancel = Some(token);
        self.state = ListenerState::Listening;

        crate::debug_event!("listener", "started", "{armed} armed");
        Ok(())
    }

    /// Cancel the task, then disarm every watch and close the descriptor.
    ///
    /// Cleanup always runs. If the task outlives the grace period it is
    /// aborted and [`WatchError::ResourceLeak`] is returned.
    pub async fn stop(&mut self) -> Result<(), WatchError> {
        if self.state == ListenerState::Stopped {
            return Ok(());
        }
        self.state = ListenerState::Stopping;

        if let Some(token) = self.cancel.take() {
            token.cancel();
        }

        let mut leak = None;
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.stop_grace, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("[listener] task ended abnormally: {e}"),
                Err(_) => {
                    task.abort();
                    let _ = tokio::time::timeout(self.stop_grace, task).await;
                    let err = WatchError::ResourceLeak {
                        grace: self.stop_grace,
                    };
                    tracing::error!("[listener] {err}");
                    leak = Some(err);
                }
            }
        }

        self.teardown();
        crate::log_event!("listener", "stopped");

        match leak {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Disarm all watches and release the descriptor.
    fn teardown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.cancel = None;

        let backend = {
            let mut shared = self.shared.lock();
            shared.disarm_all();
            shared.detach()
        };
        // last reference closes the fd
        drop(backend);

        self.state = ListenerState::Stopped;
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(token) = &self.cancel {
            token.cancel();
        }
    }
}

/// The listener task: wait, decode, dispatch, until cancelled.
async fn listen(
    kernel: Arc<Inotify>,
    shared: Arc<Mutex<Shared>>,
    broadcaster: NotificationBroadcaster,
    cancel: CancellationToken,
    buffer_size: usize,
) {
    let mut buffer = vec![0u8; buffer_size];
    crate::log_event!("listener", "listening", "fd {}", kernel.raw_fd());

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = kernel.read_events(&mut buffer) => read,
        };

        match read {
            Ok(len) => {
                dispatch_buffer(&shared, &broadcaster, &buffer[..len]);
            }
            Err(e) => {
                tracing::error!("[listener] read failed: {e}");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(READ_RETRY) => {}
                }
            }
        }
    }

    crate::debug_event!("listener", "task exiting");
}

/// Decode and dispatch every record of one read, in order.
///
/// Returns the number of notifications sent.
pub fn dispatch_buffer(
    shared: &Mutex<Shared>,
    broadcaster: &NotificationBroadcaster,
    bytes: &[u8],
) -> usize {
    let mut sent = 0;
    for record in Records::new(bytes) {
        match record {
            Ok(event) => {
                if dispatch(shared, broadcaster, &event) {
                    sent += 1;
                }
            }
            Err(e) => tracing::warn!("[listener] {e}; dropping rest of read"),
        }
    }

    crate::debug_event!("listener", "read", "{} bytes, {sent} sent", bytes.len());
    sent
}

/// Route one record. Returns whether a notification was sent.
pub fn dispatch(
    shared: &Mutex<Shared>,
    broadcaster: &NotificationBroadcaster,
    event: &RawEvent,
) -> bool {
    if event.mask.contains(EventMask::IGNORED) {
        // kernel already dropped the watch (entry deleted or unmounted);
        // handles removed on purpose are no longer indexed
        if let Some(path) = shared.lock().forget(event.handle) {
            tracing::warn!(
                "[listener] {} is no longer watched by the kernel",
                path.display()
            );
        }
    }

    if event.is_meta() {
        if event.is_overflow() {
            tracing::warn!("[listener] queue overflow, events were lost");
        } else {
            crate::debug_event!(
                "listener",
                "meta event ignored",
                "{} {:?}",
                event.handle,
                event.mask
            );
        }
        return false;
    }

    crate::debug_event!(
        "listener",
        "raw event",
        "{} {:?} {:?}",
        event.handle,
        event.mask,
        event.name
    );

    // lock released before sending
    let notification = shared.lock().route(event);
    match notification {
        Some(notification) => {
            broadcaster.send(notification);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::record::encode;
    use super::*;
    use crate::watch::{Destination, EventMask, FakeBackend, Watch, WatchHandle};
    use tempfile::TempDir;

    fn armed_shared(dir: &std::path::Path, events: &str) -> (Arc<Mutex<Shared>>, WatchHandle) {
        let mut shared = Shared::default();
        let mut watch = Watch::create(dir, events, "").unwrap();
        watch.add_destination(Destination::from("#ops"));
        shared.registry.add(watch).unwrap();
        shared.attach(Arc::new(FakeBackend::default()));
        shared.arm_all();
        let handle = shared.registry.lookup(dir).unwrap().handle().unwrap();
        (Arc::new(Mutex::new(shared)), handle)
    }

    #[tokio::test]
    async fn test_create_only_watch_dispatches_once() {
        let dir = TempDir::new().unwrap();
        let (shared, handle) = armed_shared(dir.path(), "create");
        let broadcaster = NotificationBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();

        let mut bytes = encode(handle.0, EventMask::MODIFY, 0, "a.txt");
        bytes.extend(encode(handle.0, EventMask::CREATE, 0, "a.txt"));
        dispatch_buffer(&shared, &broadcaster, &bytes);

        let notification = rx.try_recv().unwrap();
        assert_eq!(notification.message.filename, "a.txt");
        assert_eq!(notification.message.event_description, "create");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_meta_and_unknown_records_not_dispatched() {
        let dir = TempDir::new().unwrap();
        let (shared, handle) = armed_shared(dir.path(), "CD");
        let broadcaster = NotificationBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();

        let mut bytes = encode(-1, EventMask::Q_OVERFLOW, 0, "");
        bytes.extend(encode(handle.0, EventMask::IGNORED, 0, ""));
        bytes.extend(encode(handle.0 + 50, EventMask::CREATE, 0, "stray"));
        dispatch_buffer(&shared, &broadcaster, &bytes);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_tail_keeps_earlier_records() {
        let dir = TempDir::new().unwrap();
        let (shared, handle) = armed_shared(dir.path(), "C");
        let broadcaster = NotificationBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();

        let mut bytes = encode(handle.0, EventMask::CREATE, 0, "first");
        let mut tail = encode(handle.0, EventMask::CREATE, 0, "second");
        tail.truncate(record::HEADER_LEN + 2);
        bytes.extend(tail);
        dispatch_buffer(&shared, &broadcaster, &bytes);

        assert_eq!(rx.try_recv().unwrap().message.filename, "first");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let mut listener = Listener::new(
            shared,
            NotificationBroadcaster::new(4),
            &ListenerConfig::default(),
        );

        listener.stop().await.unwrap();
        assert_eq!(listener.state(), ListenerState::Stopped);
        assert!(!listener.alive());
    }

    #[tokio::test]
    async fn test_released_handle_is_forgotten() {
        let dir = TempDir::new().unwrap();
        let (shared, handle) = armed_shared(dir.path(), "C");
        let broadcaster = NotificationBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();

        let mut bytes = encode(handle.0, EventMask::DELETE_SELF, 0, "");
        bytes.extend(encode(handle.0, EventMask::IGNORED, 0, ""));
        bytes.extend(encode(handle.0, EventMask::CREATE, 0, "late"));

        assert_eq!(dispatch_buffer(&shared, &broadcaster, &bytes), 0);
        assert!(rx.try_recv().is_err());

        let shared = shared.lock();
        assert_eq!(shared.armed_count(), 0);
        assert!(!shared.registry.lookup(dir.path()).unwrap().is_armed());
        // still registered; the next start re-arms it
        assert_eq!(shared.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_past_grace_reports_leak_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let (shared, _) = armed_shared(dir.path(), "C");
        let config = ListenerConfig {
            stop_grace_ms: 50,
            ..ListenerConfig::default()
        };
        let mut listener = Listener::new(shared.clone(), NotificationBroadcaster::new(4), &config);

        // a task that never observes cancellation
        listener.task = Some(tokio::spawn(std::future::pending::<()>()));
        listener.cancel = Some(CancellationToken::new());
        listener.state = ListenerState::Listening;

        let err = listener.stop().await.unwrap_err();

        assert!(matches!(err, WatchError::ResourceLeak { .. }));
        assert_eq!(listener.state(), ListenerState::Stopped);
        assert!(!listener.alive());

        let shared = shared.lock();
        assert_eq!(shared.armed_count(), 0);
        assert!(!shared.is_attached());
        assert!(!shared.registry.lookup(dir.path()).unwrap().is_armed());
    }
}
