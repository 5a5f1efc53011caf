//! Subscription-driven filesystem change notifications on top of inotify.
//!
//! Clients subscribe destinations to paths with an event spec ("create and
//! delete") and an entry-type spec ("files"). A background listener reads the
//! kernel queue and fans matched events out to every subscribed destination.

#[cfg(not(target_os = "linux"))]
compile_error!("inwatch requires Linux inotify");

pub mod cli;
pub mod config;
pub mod listener;
pub mod logging;
pub mod manager;
pub mod notify;
pub mod storage;
pub mod watch;

pub use config::Settings;
pub use manager::{Created, Status, WatchManager, WatchSummary};
pub use notify::{
    Delivery, EntryKind, MessageTemplate, Notification, NotificationBroadcaster,
    StructuredMessage, spawn_delivery,
};
pub use storage::{SnapshotStore, StorageError};
pub use watch::{
    Destination, EntryFilter, EventKind, EventMask, RegistrySnapshot, Watch, WatchError,
    WatchRegistry,
};
