//! Hook writer error types.

use std::path::PathBuf;

/// Errors raised while recording a hook invocation.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Invalid hook record: {0}")]
    InvalidRecord(#[from] serde_json::Error),

    #[error("Hook record is not a JSON object")]
    NotAnObject,

    #[error("Hook record has no session id")]
    MissingSessionId,

    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("No hook command given")]
    EmptyCommand,

    #[error("Failed to run hook command {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
