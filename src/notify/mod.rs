//! Rendering and delivery of matched events.
//!
//! The listener turns a matched record into a [`Notification`] and pushes it
//! onto a broadcast channel, which never blocks the listener. Delivery
//! collaborators subscribe and render the [`StructuredMessage`] with a
//! [`MessageTemplate`].

mod template;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::watch::Destination;

pub use template::{MessageTemplate, DEFAULT_EVENT_FORMAT};

/// Whether the affected entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn from_is_dir(is_dir: bool) -> Self {
        if is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination-neutral description of one filesystem event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredMessage {
    pub entry_kind: EntryKind,
    pub event_description: String,
    pub path: PathBuf,
    pub filename: String,
}

impl StructuredMessage {
    /// Dotfiles and dot-directories.
    pub fn is_hidden(&self) -> bool {
        self.filename.starts_with('.')
    }
}

/// A rendered event and everyone who should hear about it.
#[derive(Debug, Clone)]
pub struct Notification {
    pub destinations: Vec<Destination>,
    pub message: StructuredMessage,
}

/// Fan-out of notifications from the listener to delivery tasks.
#[derive(Debug, Clone)]
pub struct NotificationBroadcaster {
    sender: broadcast::Sender<Notification>,
}

impl NotificationBroadcaster {
    /// Create a new broadcaster with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Queue a notification for every subscriber. Never blocks.
    pub fn send(&self, notification: Notification) {
        let path = notification.message.path.display().to_string();
        match self.sender.send(notification) {
            Ok(count) => {
                crate::debug_event!("notify", "sent", "{path} to {count} subscribers");
            }
            Err(_) => {
                crate::debug_event!("notify", "dropped", "no subscribers for {path}");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

/// Output side: hands a message to concrete destinations.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    async fn deliver(
        &self,
        destinations: &[Destination],
        message: &StructuredMessage,
    ) -> anyhow::Result<()>;
}

/// Drive `delivery` from a subscriber until the broadcaster is dropped.
///
/// Hidden entries are skipped unless `show_hidden` is set.
pub fn spawn_delivery(
    mut receiver: broadcast::Receiver<Notification>,
    delivery: Arc<dyn Delivery>,
    show_hidden: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        crate::debug_event!("notify", "delivery started", "{}", delivery.name());

        loop {
            match receiver.recv().await {
                Ok(notification) => {
                    if !show_hidden && notification.message.is_hidden() {
                        crate::debug_event!(
                            "notify",
                            "hidden",
                            "{}",
                            notification.message.filename
                        );
                        continue;
                    }

                    if let Err(e) = delivery
                        .deliver(&notification.destinations, &notification.message)
                        .await
                    {
                        tracing::error!("[{}] delivery failed: {e}", delivery.name());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("[{}] lagged by {n} notifications", delivery.name());
                }
                Err(broadcast::error::RecvError::Closed) => {
                    crate::debug_event!("notify", "channel closed");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(Vec<Destination>, String)>>,
    }

    #[async_trait]
    impl Delivery for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn deliver(
            &self,
            destinations: &[Destination],
            message: &StructuredMessage,
        ) -> anyhow::Result<()> {
            self.seen
                .lock()
                .push((destinations.to_vec(), message.filename.clone()));
            Ok(())
        }
    }

    fn notification(file: &str) -> Notification {
        Notification {
            destinations: vec![Destination::from("#ops")],
            message: StructuredMessage {
                entry_kind: EntryKind::File,
                event_description: "create".to_string(),
                path: PathBuf::from("/tmp/x"),
                filename: file.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_delivery_skips_hidden_files() {
        let broadcaster = NotificationBroadcaster::new(16);
        let recorder = Arc::new(Recorder::default());
        let task = spawn_delivery(broadcaster.subscribe(), recorder.clone(), false);

        broadcaster.send(notification(".swap"));
        broadcaster.send(notification("report.txt"));
        drop(broadcaster);
        task.await.unwrap();

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, "report.txt");
        assert_eq!(seen[0].0, vec![Destination::from("#ops")]);
    }

    #[tokio::test]
    async fn test_delivery_shows_hidden_when_enabled() {
        let broadcaster = NotificationBroadcaster::new(16);
        let recorder = Arc::new(Recorder::default());
        let task = spawn_delivery(broadcaster.subscribe(), recorder.clone(), true);

        broadcaster.send(notification(".swap"));
        drop(broadcaster);
        task.await.unwrap();

        assert_eq!(recorder.seen.lock().len(), 1);
    }

    #[test]
    fn test_send_without_subscribers_is_harmless() {
        let broadcaster = NotificationBroadcaster::new(4);
        broadcaster.send(notification("a"));
    }
}
