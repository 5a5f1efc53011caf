//! Error types for the watch manager.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::entry::Destination;

/// Errors from watch, registry and listener operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("no such file or directory: {}", path.display())]
    PathNotFound { path: PathBuf },

    #[error("a watch for {} already exists", path.display())]
    DuplicatePath { path: PathBuf },

    #[error("kernel refused watch on {}: {source}", path.display())]
    KernelWatch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path {} not found", path.display())]
    NotFound { path: PathBuf },

    #[error("path {} not watched by {destination}", path.display())]
    NotSubscribed {
        path: PathBuf,
        destination: Destination,
    },

    #[error("malformed notification record: {reason}")]
    MalformedRecord { reason: String },

    #[error("listener did not stop within {grace:?}; task abandoned")]
    ResourceLeak { grace: Duration },

    #[error("failed to initialize listener: {reason}")]
    InitFailed { reason: String },
}

impl WatchError {
    /// Errors caused by the request itself rather than the kernel or runtime.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            WatchError::PathNotFound { .. }
                | WatchError::NotFound { .. }
                | WatchError::NotSubscribed { .. }
                | WatchError::DuplicatePath { .. }
        )
    }
}
