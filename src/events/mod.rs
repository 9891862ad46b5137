//! Event normalization.
//!
//! Two wire schemas feed one typed stream:
//! - hook records written by the hook command (`hooks/<id>.jsonl`)
//! - OTLP/JSON log and metric exports (`otel/<id>-{logs,metrics}.jsonl`)
//!
//! Normalization happens once, here; everything downstream dispatches on
//! [`EventKind`].

mod error;
mod hook;
mod otlp;
mod parser;
mod types;

pub use error::ParseError;
pub use hook::{normalize_hook_line, now_millis};
pub use otlp::{normalize_logs_line, normalize_metrics_line};
pub use parser::{LineParser, SourceKind};
pub use types::*;
