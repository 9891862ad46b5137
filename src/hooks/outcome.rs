//! Result of running a user hook command.
//!
//! Exit code 0 allows the action, 2 blocks it and hands stderr back to
//! the producer, and anything else (including death by signal) is a
//! non-blocking error shown to the operator. Stdout that parses as a
//! JSON object is the structured [`HookResponse`].

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::events::{HookExecution, HookResponse};

use super::error::HookError;

/// Exit code that blocks the producer's action.
pub const BLOCKING_EXIT_CODE: i32 = 2;

/// How the producer should treat a hook result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookVerdict {
    Allow,
    Block,
    NonBlockingError,
}

impl HookVerdict {
    #[must_use]
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Self::Allow,
            Some(BLOCKING_EXIT_CODE) => Self::Block,
            _ => Self::NonBlockingError,
        }
    }
}

/// Captured result of one hook command run.
#[derive(Debug, Clone, PartialEq)]
pub struct HookOutcome {
    pub exit_code: Option<i32>,
    pub verdict: HookVerdict,
    pub stdout: String,
    pub stderr: String,
    pub response: Option<HookResponse>,
}

impl HookOutcome {
    #[must_use]
    pub fn from_output(exit_code: Option<i32>, stdout: String, stderr: String) -> Self {
        let trimmed = stdout.trim();
        let response = if trimmed.starts_with('{') {
            serde_json::from_str(trimmed).ok()
        } else {
            None
        };
        Self {
            exit_code,
            verdict: HookVerdict::from_exit_code(exit_code),
            stdout,
            stderr,
            response,
        }
    }

    /// Feedback for the producer when the action is blocked.
    #[must_use]
    pub fn producer_feedback(&self) -> Option<&str> {
        (self.verdict == HookVerdict::Block).then_some(self.stderr.as_str())
    }

    /// Exit code this process should mirror. A signal death maps to 1.
    #[must_use]
    pub fn process_exit_code(&self) -> i32 {
        self.exit_code.unwrap_or(1)
    }

    /// Execution details recorded alongside the hook event.
    #[must_use]
    pub fn execution(&self, command: &str) -> HookExecution {
        HookExecution {
            command: command.to_string(),
            output: (!self.stdout.is_empty()).then(|| self.stdout.clone()),
            exit_code: self.exit_code,
            response: self.response.clone(),
        }
    }
}

/// Run `command` with `input` on stdin and capture its outcome.
///
/// # Errors
///
/// Returns an error if `command` is empty or the process cannot be spawned.
pub async fn run_hook_command(command: &[String], input: &str) -> Result<HookOutcome, HookError> {
    let (program, args) = command.split_first().ok_or(HookError::EmptyCommand)?;
    let command_line = command.join(" ");
    let spawn_error = |source| HookError::Spawn {
        command: command_line.clone(),
        source,
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;

    if let Some(mut stdin) = child.stdin.take() {
        // A hook that exits without reading its input is not an error.
        if let Err(err) = stdin.write_all(input.as_bytes()).await {
            tracing::debug!(error = %err, "Hook command closed stdin early");
        }
    }

    let output = child.wait_with_output().await.map_err(spawn_error)?;
    let outcome = HookOutcome::from_output(
        output.status.code(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    );
    tracing::debug!(
        command = %command_line,
        exit_code = ?outcome.exit_code,
        verdict = ?outcome.verdict,
        "Hook command finished"
    );
    Ok(outcome)
}
