//! On-disk layout of the log directory.
//!
//! ```text
//! <base>/hooks/<session-id>.jsonl          hook records, one JSON object per line
//! <base>/hooks/<session-id>.meta           session metadata (JSON)
//! <base>/otel/<session-id>-logs.jsonl      OTLP log exports
//! <base>/otel/<session-id>-metrics.jsonl   OTLP metric exports
//! ```

use std::path::{Path, PathBuf};

use crate::events::SourceKind;

const HOOKS_DIR: &str = "hooks";
const OTEL_DIR: &str = "otel";
const LOG_EXT: &str = "jsonl";
const META_EXT: &str = "meta";

/// Resolves every path the monitor and the hook writer agree on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLayout {
    base: PathBuf,
}

impl LogLayout {
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    #[must_use]
    pub fn hooks_dir(&self) -> PathBuf {
        self.base.join(HOOKS_DIR)
    }

    #[must_use]
    pub fn otel_dir(&self) -> PathBuf {
        self.base.join(OTEL_DIR)
    }

    #[must_use]
    pub fn hook_log(&self, session_id: &str) -> PathBuf {
        self.hooks_dir().join(format!("{session_id}.{LOG_EXT}"))
    }

    #[must_use]
    pub fn metadata(&self, session_id: &str) -> PathBuf {
        self.hooks_dir().join(format!("{session_id}.{META_EXT}"))
    }

    #[must_use]
    pub fn telemetry_logs(&self, session_id: &str) -> PathBuf {
        self.otel_dir().join(format!("{session_id}-logs.{LOG_EXT}"))
    }

    #[must_use]
    pub fn telemetry_metrics(&self, session_id: &str) -> PathBuf {
        self.otel_dir().join(format!("{session_id}-metrics.{LOG_EXT}"))
    }

    /// Path of the file backing `source` for a session.
    #[must_use]
    pub fn source_path(&self, session_id: &str, source: SourceKind) -> PathBuf {
        match source {
            SourceKind::Hooks => self.hook_log(session_id),
            SourceKind::TelemetryLogs => self.telemetry_logs(session_id),
            SourceKind::TelemetryMetrics => self.telemetry_metrics(session_id),
        }
    }

    /// Create the hooks and otel directories if they are missing.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.hooks_dir())?;
        std::fs::create_dir_all(self.otel_dir())
    }

    /// Session id for a hook log or metadata file inside the hooks directory.
    ///
    /// Returns `None` for anything else: other extensions, hidden or
    /// temporary files, paths outside `hooks/`.
    #[must_use]
    pub fn session_id_from_path(&self, path: &Path) -> Option<String> {
        if path.parent()? != self.hooks_dir() {
            return None;
        }
        let ext = path.extension()?.to_str()?;
        if ext != LOG_EXT && ext != META_EXT {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        if stem.is_empty() || stem.starts_with('.') {
            return None;
        }
        Some(stem.to_string())
    }

    /// Whether `path` is a hook log (as opposed to a metadata file).
    #[must_use]
    pub fn is_hook_log(path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(LOG_EXT)
    }
}
