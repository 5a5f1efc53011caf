//! Watch specifications and the registry that holds them.
//!
//! # Architecture
//!
//! ```text
//! codec     "create and update" <-> EventMask, "dir" -> EntryFilter
//!   |
//! entry     Watch: path + mask + filter + destinations + kernel handle
//!   |
//! registry  WatchRegistry: unique paths, snapshot for storage
//! ```

pub mod codec;
mod entry;
mod error;
mod registry;

pub use codec::{
    EntryFilter, EventKind, EventMask, mask_to_letters, mask_to_words, parse_entry_filter,
    parse_mask,
};
pub use entry::{Destination, Watch, WatchBackend, WatchHandle, normalize_path};
pub use error::WatchError;
pub use registry::{RegistrySnapshot, SNAPSHOT_VERSION, WatchRegistry};

#[cfg(test)]
pub(crate) use entry::tests::FakeBackend;
