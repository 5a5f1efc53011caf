//! Persistence of the watch list between runs.

mod error;
mod persistence;

pub use error::{StorageError, StorageResult};
pub use persistence::SnapshotStore;
