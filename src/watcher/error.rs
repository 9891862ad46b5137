//! Watcher error types.

use std::path::PathBuf;

/// Errors that can occur while tailing or watching files.
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// `open` called on a reader that is already tailing a file.
    #[error("Reader already open: {0}")]
    AlreadyOpen(PathBuf),

    /// Path has no parent directory to watch.
    #[error("No parent directory to watch for {0}")]
    NoParent(PathBuf),

    /// Notify watcher error.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
