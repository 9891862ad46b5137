//! Session discovery, liveness filtering and dead-session cleanup.
//!
//! A session exists when its hook log exists. It is active when its
//! metadata is absent (not yet written) or when the recorded pid is
//! still running.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::events::{SessionMetadata, SourceKind};
use crate::watcher::{FsSignal, SignalSender, WatcherError};

use super::error::SessionError;
use super::layout::LogLayout;
use super::liveness::{LivenessProbe, ProcessProbe};

/// A discovered session and the files that back it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub hook_log: PathBuf,
    pub telemetry_logs: PathBuf,
    pub telemetry_metrics: PathBuf,
    pub metadata: Option<SessionMetadata>,
    pub alive: bool,
}

impl Session {
    /// Start time used for recency ordering. Sessions without metadata sort oldest.
    #[must_use]
    pub fn start_time(&self) -> i64 {
        self.metadata.as_ref().map_or(0, |m| m.start_time)
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.metadata.as_ref().map(|m| m.pid)
    }

    #[must_use]
    pub fn source_path(&self, source: SourceKind) -> &Path {
        match source {
            SourceKind::Hooks => &self.hook_log,
            SourceKind::TelemetryLogs => &self.telemetry_logs,
            SourceKind::TelemetryMetrics => &self.telemetry_metrics,
        }
    }
}

/// Tracks the sessions found under a [`LogLayout`].
pub struct SessionRegistry {
    layout: LogLayout,
    probe: Box<dyn LivenessProbe>,
    cleanup_enabled: bool,
    known: HashMap<String, Session>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("layout", &self.layout)
            .field("cleanup_enabled", &self.cleanup_enabled)
            .field("known", &self.known.len())
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Registry that probes real processes.
    #[must_use]
    pub fn new(layout: LogLayout) -> Self {
        Self::with_probe(layout, ProcessProbe)
    }

    #[must_use]
    pub fn with_probe(layout: LogLayout, probe: impl LivenessProbe + 'static) -> Self {
        Self {
            layout,
            probe: Box::new(probe),
            cleanup_enabled: true,
            known: HashMap::new(),
        }
    }

    /// Enable or disable deletion of dead sessions before discovery.
    #[must_use]
    pub fn with_cleanup(mut self, enabled: bool) -> Self {
        self.cleanup_enabled = enabled;
        self
    }

    #[must_use]
    pub fn layout(&self) -> &LogLayout {
        &self.layout
    }

    /// Sessions seen so far, in no particular order.
    pub fn known(&self) -> impl Iterator<Item = &Session> {
        self.known.values()
    }

    #[must_use]
    pub fn is_known(&self, id: &str) -> bool {
        self.known.contains_key(id)
    }

    /// Read a session's metadata. Missing or unreadable metadata yields `None`.
    #[must_use]
    pub fn read_metadata(&self, id: &str) -> Option<SessionMetadata> {
        let path = self.layout.metadata(id);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(meta) => Some(meta),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "Ignoring unreadable session metadata");
                None
            }
        }
    }

    /// Build the current view of one session, including its liveness.
    #[must_use]
    pub fn inspect(&self, id: &str) -> Session {
        let metadata = self.read_metadata(id);
        let alive = metadata
            .as_ref()
            .map_or(true, |meta| self.probe.is_alive(meta.pid));
        Session {
            id: id.to_string(),
            hook_log: self.layout.hook_log(id),
            telemetry_logs: self.layout.telemetry_logs(id),
            telemetry_metrics: self.layout.telemetry_metrics(id),
            metadata,
            alive,
        }
    }

    /// Ids of every hook log in the hooks directory.
    fn log_ids(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.layout.hooks_dir()) else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| LogLayout::is_hook_log(path) && path.is_file())
            .filter_map(|path| self.layout.session_id_from_path(&path))
            .collect()
    }

    /// Delete the files of every dead session except `exempt`.
    ///
    /// Only sessions whose metadata exists and names a dead pid are removed.
    /// Returns the number of sessions removed.
    pub fn cleanup(&mut self, exempt: Option<&str>) -> usize {
        let mut removed = 0;
        for id in self.log_ids() {
            if exempt == Some(id.as_str()) {
                continue;
            }
            let Some(meta) = self.read_metadata(&id) else {
                continue;
            };
            if self.probe.is_alive(meta.pid) {
                continue;
            }

            for path in [
                self.layout.hook_log(&id),
                self.layout.metadata(&id),
                self.layout.telemetry_logs(&id),
                self.layout.telemetry_metrics(&id),
            ] {
                if let Err(err) = std::fs::remove_file(&path) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(path = %path.display(), error = %err, "Failed to remove session file");
                    }
                }
            }
            self.known.remove(&id);
            tracing::info!(session_id = %id, pid = meta.pid, "Removed dead session");
            removed += 1;
        }
        removed
    }

    /// Enumerate active sessions, newest first.
    ///
    /// Runs [`cleanup`](Self::cleanup) first when enabled, never touching
    /// the `attached` session. Every active session becomes known.
    pub fn discover(&mut self, attached: Option<&str>) -> Vec<Session> {
        if self.cleanup_enabled {
            self.cleanup(attached);
        }

        let mut sessions: Vec<Session> = self
            .log_ids()
            .iter()
            .map(|id| self.inspect(id))
            .filter(|session| session.alive)
            .collect();
        sessions.sort_by(|a, b| {
            b.start_time()
                .cmp(&a.start_time())
                .then_with(|| a.id.cmp(&b.id))
        });

        for session in &sessions {
            self.known.insert(session.id.clone(), session.clone());
        }
        tracing::debug!(count = sessions.len(), "Discovered active sessions");
        sessions
    }

    /// The active session with the greatest start time.
    pub fn latest(&mut self, attached: Option<&str>) -> Option<Session> {
        self.discover(attached).into_iter().next()
    }

    /// Look up a session by id.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if no hook log exists for `id`, or
    /// [`SessionError::Inactive`] if its producer has exited and
    /// `skip_check` is false.
    pub fn find(&mut self, id: &str, skip_check: bool) -> Result<Session, SessionError> {
        if !self.layout.hook_log(id).is_file() {
            return Err(SessionError::NotFound { id: id.to_string() });
        }
        let session = self.inspect(id);
        if !session.alive && !skip_check {
            let pid = session.pid().unwrap_or_default();
            return Err(SessionError::Inactive {
                id: id.to_string(),
                pid,
            });
        }
        self.known.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    /// Watch the hooks directory, forwarding log and metadata arrivals and
    /// removals as [`FsSignal::DirChanged`].
    ///
    /// The returned watcher stops when dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or watched.
    pub fn watch(&self, signals: SignalSender) -> Result<RecommendedWatcher, SessionError> {
        let dir = self.layout.hooks_dir();
        std::fs::create_dir_all(&dir)?;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "Session directory watch error");
                    return;
                }
            };
            if !is_session_change(&event.kind) {
                return;
            }
            for path in event.paths {
                // Receiver gone means the monitor is shutting down.
                let _ = signals.send(FsSignal::DirChanged(path));
            }
        })
        .map_err(WatcherError::from)?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(WatcherError::from)?;
        tracing::debug!(dir = %dir.display(), "Watching session directory");
        Ok(watcher)
    }

    /// React to a change in the hooks directory.
    ///
    /// Returns the session only when it is newly seen and active. Known
    /// sessions have their record refreshed but are not reported again.
    pub fn on_dir_change(&mut self, path: &Path) -> Option<Session> {
        let id = self.layout.session_id_from_path(path)?;
        if !self.layout.hook_log(&id).is_file() {
            if self.known.remove(&id).is_some() {
                tracing::debug!(session_id = %id, "Session log gone, forgetting session");
            }
            return None;
        }

        if self.known.contains_key(&id) {
            if !LogLayout::is_hook_log(path) {
                let refreshed = self.inspect(&id);
                self.known.insert(id, refreshed);
            }
            return None;
        }

        let session = self.inspect(&id);
        if !session.alive {
            tracing::debug!(session_id = %id, "Ignoring new session with dead producer");
            return None;
        }

        tracing::info!(session_id = %id, "New session detected");
        self.known.insert(id, session.clone());
        Some(session)
    }
}

/// Events that can mean a session file appeared or went away.
fn is_session_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Name(_) | ModifyKind::Data(_))
    )
}
