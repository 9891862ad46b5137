//! File tailing for session logs.
//!
//! Provides the byte-precise [`TailReader`] and the [`FsSignal`] channel
//! through which watcher callbacks reach the owning task.

mod error;
mod line_buffer;
mod signal;
mod tailer;

pub use error::WatcherError;
pub use line_buffer::LineBuffer;
pub use signal::{signal_channel, FsSignal, SignalReceiver, SignalSender};
pub use tailer::TailReader;
