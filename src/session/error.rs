//! Session error types.

use crate::watcher::WatcherError;

/// Errors raised while locating or attaching to a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {id}")]
    NotFound { id: String },

    #[error("Session {id} is not active (pid {pid} has exited)")]
    Inactive { id: String, pid: u32 },

    #[error("No active session found")]
    NoActiveSession,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Watcher(#[from] WatcherError),
}
