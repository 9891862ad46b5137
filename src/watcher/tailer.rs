//! Incremental JSONL file tailer.
//!
//! Replays a file once on open, then reads only bytes appended since the
//! last read whenever the file changes.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::error::WatcherError;
use super::line_buffer::LineBuffer;

/// Tails one file, emitting each complete line exactly once.
///
/// The reader owns a byte cursor that only moves forward by the number of
/// bytes actually read, and a [`LineBuffer`] holding any partial trailing
/// line until its newline lands. Change notifications are delivered to a
/// caller-supplied callback; the caller then invokes [`TailReader::poll`]
/// from the task that owns the reader.
pub struct TailReader {
    /// Path being tailed, `None` while closed.
    path: Option<PathBuf>,
    /// Byte offset of the next unread byte.
    cursor: u64,
    pending: LineBuffer,
    watcher: Option<RecommendedWatcher>,
    /// Cleared on close so in-flight callbacks become no-ops.
    live: Arc<AtomicBool>,
}

impl std::fmt::Debug for TailReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailReader")
            .field("path", &self.path)
            .field("cursor", &self.cursor)
            .field("pending", &self.pending.pending_len())
            .field("watching", &self.watcher.is_some())
            .finish()
    }
}

impl Default for TailReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TailReader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: None,
            cursor: 0,
            pending: LineBuffer::new(),
            watcher: None,
            live: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start tailing `path` and return every complete line already in it.
    ///
    /// The file does not need to exist yet; its parent directory does,
    /// since that is what gets watched. `on_change` runs on the watcher
    /// thread for each relevant notification and must only signal.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::AlreadyOpen`] if this reader is tailing a
    /// file, or a notify error if the watch cannot be established.
    pub fn open<F>(&mut self, path: impl Into<PathBuf>, on_change: F) -> Result<Vec<String>, WatcherError>
    where
        F: Fn() + Send + 'static,
    {
        if let Some(current) = &self.path {
            return Err(WatcherError::AlreadyOpen(current.clone()));
        }
        let path = path.into();
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| WatcherError::NoParent(path.clone()))?
            .to_path_buf();

        let live = Arc::new(AtomicBool::new(true));
        let mut watcher = Self::build_watcher(&path, Arc::clone(&live), on_change)?;
        watcher.watch(&parent, RecursiveMode::NonRecursive)?;

        // Subscribed before the replay so an append racing the initial
        // read still produces a notification; the cursor prevents re-reads.
        self.live = live;
        self.watcher = Some(watcher);
        self.path = Some(path.clone());
        self.cursor = 0;
        self.pending.clear();

        let lines = self.poll();
        tracing::debug!(
            path = %path.display(),
            cursor = self.cursor,
            lines = lines.len(),
            "Tail reader opened"
        );
        Ok(lines)
    }

    fn build_watcher<F>(
        path: &Path,
        live: Arc<AtomicBool>,
        on_change: F,
    ) -> Result<RecommendedWatcher, WatcherError>
    where
        F: Fn() + Send + 'static,
    {
        let file_name = path.file_name().map(ToOwned::to_owned);
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if !live.load(Ordering::Acquire) {
                return;
            }
            match res {
                Ok(event) => {
                    if !is_content_change(&event.kind) {
                        return;
                    }
                    if event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == file_name.as_deref())
                    {
                        on_change();
                    }
                }
                Err(e) => tracing::debug!(error = %e, "Tail watch error"),
            }
        })?;
        Ok(watcher)
    }

    /// Read whatever was appended since the last read.
    ///
    /// A closed reader, a missing file or a failed read yields no lines
    /// and leaves the cursor untouched; the next notification retries. A
    /// file smaller than the cursor was truncated or replaced and is
    /// replayed from the start.
    pub fn poll(&mut self) -> Vec<String> {
        let Some(path) = self.path.as_deref() else {
            return Vec::new();
        };
        let Ok(metadata) = std::fs::metadata(path) else {
            return Vec::new();
        };
        let size = metadata.len();

        if size < self.cursor {
            tracing::warn!(
                path = %path.display(),
                old_offset = self.cursor,
                new_len = size,
                "File truncated, replaying from start"
            );
            self.cursor = 0;
            self.pending.clear();
        }
        if size == self.cursor {
            return Vec::new();
        }

        match read_range(path, self.cursor, size) {
            Ok(bytes) => {
                self.cursor += bytes.len() as u64;
                self.pending.push(&bytes)
            }
            Err(e) => {
                tracing::trace!(path = %path.display(), error = %e, "Transient read failure");
                Vec::new()
            }
        }
    }

    /// Stop watching and forget the file. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.live.store(false, Ordering::Release);
        self.watcher = None;
        if let Some(path) = self.path.take() {
            tracing::debug!(path = %path.display(), cursor = self.cursor, "Tail reader closed");
        }
        self.cursor = 0;
        self.pending.clear();
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.path.is_some()
    }

    /// Get the current byte offset.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Get the path being tailed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Drop for TailReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// Our own opens and reads also generate access events; reacting to them
/// would loop.
fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        EventKind::Access(_) | EventKind::Modify(ModifyKind::Metadata(_)) => false,
        _ => true,
    }
}

/// Read at most `end - start` bytes starting at `start`.
fn read_range(path: &Path, start: u64, end: u64) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::with_capacity(usize::try_from(end - start).unwrap_or(0));
    file.take(end - start).read_to_end(&mut buf)?;
    Ok(buf)
}
