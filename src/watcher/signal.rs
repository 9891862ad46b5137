//! Filesystem notifications forwarded to the owning event loop.
//!
//! Notify callbacks run on the watcher's thread. They never touch reader
//! or registry state; they only send an [`FsSignal`] so every state
//! transition happens on the single task that owns that state.

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::events::SourceKind;

/// A change the owner loop should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsSignal {
    /// A tailed source of the attached session changed.
    SourceChanged {
        /// Attachment generation; stale generations are ignored.
        generation: u64,
        source: SourceKind,
    },
    /// Something changed in the session log directory.
    DirChanged(PathBuf),
}

pub type SignalSender = mpsc::UnboundedSender<FsSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<FsSignal>;

/// Create the signal channel shared by all watchers of one monitor.
#[must_use]
pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    mpsc::unbounded_channel()
}
