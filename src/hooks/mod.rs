//! Producer side: recording Claude Code hook invocations.
//!
//! # Components
//!
//! - [`HookRecorder`]: entry point of the `hook` subcommand
//! - [`SessionLogWriter`]: scoped writer for one session's log and metadata
//! - [`HookOutcome`]: exit code and stdout contract of a user hook command

mod error;
mod outcome;
mod recorder;
mod writer;

pub use error::HookError;
pub use outcome::{run_hook_command, HookOutcome, HookVerdict, BLOCKING_EXIT_CODE};
pub use recorder::{HookRecorder, HookReport};
pub use writer::{producer_metadata, SessionLogWriter};
