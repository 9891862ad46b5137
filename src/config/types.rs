//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::events::SourceKind;
use crate::session::LogLayout;

/// Environment variable that overrides [`MonitorConfig::base_dir`].
pub const BASE_DIR_ENV: &str = "CLAUDE_WATCH_DIR";

/// Monitor and hook writer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Root of the `hooks/` and `otel/` log directories.
    pub base_dir: PathBuf,
    /// Delete logs of sessions whose producer has exited before discovery.
    pub cleanup_dead_sessions: bool,
    /// Tail the OTLP log and metric exports alongside hook logs.
    pub telemetry: bool,
    /// Events retained for the attached session.
    pub max_buffered_events: usize,
    /// Remove a session's files when the hook writer records `SessionEnd`.
    pub delete_on_session_end: bool,
}

fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".claude-watch")
}

fn default_max_buffered_events() -> usize {
    10_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            cleanup_dead_sessions: true,
            telemetry: true,
            max_buffered_events: default_max_buffered_events(),
            delete_on_session_end: false,
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub fn layout(&self) -> LogLayout {
        LogLayout::new(&self.base_dir)
    }

    /// Sources the monitor tails for an attached session.
    #[must_use]
    pub fn sources(&self) -> Vec<SourceKind> {
        if self.telemetry {
            SourceKind::ALL.to_vec()
        } else {
            vec![SourceKind::Hooks]
        }
    }

    /// Apply `CLAUDE_WATCH_DIR` from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_base_dir_override(std::env::var_os(BASE_DIR_ENV).map(PathBuf::from))
    }

    /// Replace `base_dir` when an override is present and non-empty.
    #[must_use]
    pub fn with_base_dir_override(mut self, base_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = base_dir.filter(|d| !d.as_os_str().is_empty()) {
            tracing::debug!(base_dir = %dir.display(), "Base directory overridden");
            self.base_dir = dir;
        }
        self
    }
}
