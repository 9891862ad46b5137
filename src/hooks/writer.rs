//! Producer-side session log writer.
//!
//! A writer is acquired for one session id. It writes the session's
//! metadata file once, appends one JSON line per record and flushes after
//! every append so the monitor sees each record as soon as it exists.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::events::{now_millis, SessionMetadata};
use crate::session::LogLayout;

use super::error::HookError;

/// Appends hook records to `hooks/<session-id>.jsonl`.
#[derive(Debug)]
pub struct SessionLogWriter {
    session_id: String,
    log_path: PathBuf,
    meta_path: PathBuf,
    file: File,
}

impl SessionLogWriter {
    /// Open the log of `session_id` for appending.
    ///
    /// `metadata` is only evaluated when the session has no metadata file yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the id cannot name a file, or if the directory,
    /// metadata or log cannot be written.
    pub fn acquire<F>(layout: &LogLayout, session_id: &str, metadata: F) -> Result<Self, HookError>
    where
        F: FnOnce() -> SessionMetadata,
    {
        validate_session_id(session_id)?;

        let dir = layout.hooks_dir();
        std::fs::create_dir_all(&dir).map_err(|source| HookError::Write {
            path: dir.clone(),
            source,
        })?;

        let meta_path = layout.metadata(session_id);
        if !meta_path.exists() {
            write_metadata(&meta_path, &metadata())?;
        }

        let log_path = layout.hook_log(session_id);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|source| HookError::Write {
                path: log_path.clone(),
                source,
            })?;

        tracing::debug!(session_id, path = %log_path.display(), "Session log acquired");
        Ok(Self {
            session_id: session_id.to_string(),
            log_path,
            meta_path,
            file,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Append one record as a single line.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    pub fn append(&mut self, record: &serde_json::Value) -> Result<(), HookError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        // One write per record keeps concurrent appenders from interleaving.
        self.file
            .write_all(&line)
            .and_then(|()| self.file.flush())
            .map_err(|source| HookError::Write {
                path: self.log_path.clone(),
                source,
            })
    }

    /// Finish writing. With `delete`, the session's log and metadata are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush or a removal fails.
    pub fn release(mut self, delete: bool) -> Result<(), HookError> {
        self.file.flush().map_err(|source| HookError::Write {
            path: self.log_path.clone(),
            source,
        })?;
        if delete {
            for path in [&self.log_path, &self.meta_path] {
                match std::fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(source) => {
                        return Err(HookError::Write {
                            path: path.clone(),
                            source,
                        })
                    }
                }
            }
            tracing::debug!(session_id = %self.session_id, "Session log removed");
        }
        Ok(())
    }
}

impl Drop for SessionLogWriter {
    fn drop(&mut self) {
        let _ = self.file.flush();
    }
}

/// Metadata for a session produced by the process that invoked this hook.
#[must_use]
pub fn producer_metadata(session_id: &str, cwd: Option<&str>) -> SessionMetadata {
    let cwd = cwd.map(ToOwned::to_owned).unwrap_or_else(|| {
        std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    });
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();

    SessionMetadata {
        session_id: session_id.to_string(),
        pid: producer_pid(),
        start_time: now_millis(),
        cwd,
        user,
    }
}

/// Pid of the process that spawned this hook.
#[cfg(unix)]
fn producer_pid() -> u32 {
    std::os::unix::process::parent_id()
}

#[cfg(not(unix))]
fn producer_pid() -> u32 {
    std::process::id()
}

fn validate_session_id(session_id: &str) -> Result<(), HookError> {
    let valid = !session_id.is_empty()
        && !session_id.starts_with('.')
        && !session_id.contains(['/', '\\'])
        && !session_id.chars().any(char::is_control);
    if valid {
        Ok(())
    } else {
        Err(HookError::InvalidSessionId(session_id.to_string()))
    }
}

/// Write metadata through a temporary file so readers never see a partial document.
fn write_metadata(path: &Path, metadata: &SessionMetadata) -> Result<(), HookError> {
    let tmp = path.with_extension(format!("meta.{}.tmp", std::process::id()));
    let content = serde_json::to_vec(metadata)?;
    std::fs::write(&tmp, content)
        .and_then(|()| std::fs::rename(&tmp, path))
        .map_err(|source| HookError::Write {
            path: path.to_path_buf(),
            source,
        })
}
