//! The `hook` subcommand: record one hook invocation into its session log.

use serde_json::{Map, Value};

use crate::config::MonitorConfig;
use crate::events::now_millis;
use crate::session::LogLayout;

use super::error::HookError;
use super::outcome::{run_hook_command, HookOutcome};
use super::writer::{producer_metadata, SessionLogWriter};

const EVENT_NAME_KEYS: [&str; 3] = ["hook_event_name", "hookEventName", "eventType"];
const SESSION_ID_KEYS: [&str; 2] = ["session_id", "sessionId"];

/// What happened while recording a hook invocation.
#[derive(Debug)]
pub struct HookReport {
    pub session_id: String,
    pub event_name: Option<String>,
    /// Present when a user hook command was run.
    pub outcome: Option<HookOutcome>,
    /// Whether the record reached the session log.
    pub logged: bool,
}

impl HookReport {
    /// Exit code for this process: the user command's, or 0 without one.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.outcome.as_ref().map_or(0, HookOutcome::process_exit_code)
    }
}

/// Appends hook records to session logs, optionally running a user hook first.
#[derive(Debug, Clone)]
pub struct HookRecorder {
    layout: LogLayout,
    delete_on_session_end: bool,
}

impl HookRecorder {
    #[must_use]
    pub fn new(layout: LogLayout, delete_on_session_end: bool) -> Self {
        Self {
            layout,
            delete_on_session_end,
        }
    }

    #[must_use]
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.layout(), config.delete_on_session_end)
    }

    /// Record one hook invocation.
    ///
    /// `input` is the JSON record the producer passed on stdin. When
    /// `command` is non-empty it runs first with the same input, and its
    /// result is stored on the record. A failure to write the log is
    /// logged and reported through [`HookReport::logged`] rather than
    /// returned, so the user command's verdict still reaches the producer.
    ///
    /// # Errors
    ///
    /// Returns an error if `input` is not a JSON object with a session id,
    /// or if the user command cannot be started.
    pub async fn record(&self, input: &str, command: &[String]) -> Result<HookReport, HookError> {
        let mut record = parse_record(input)?;
        let session_id = string_field(&record, &SESSION_ID_KEYS)
            .ok_or(HookError::MissingSessionId)?
            .to_string();
        let event_name = string_field(&record, &EVENT_NAME_KEYS).map(ToOwned::to_owned);
        record
            .entry("timestamp")
            .or_insert_with(|| Value::from(now_millis()));

        let outcome = if command.is_empty() {
            None
        } else {
            let outcome = run_hook_command(command, input).await?;
            annotate(&mut record, &command.join(" "), &outcome);
            Some(outcome)
        };

        let session_end = event_name.as_deref() == Some("SessionEnd");
        let logged = match self.write(&session_id, record, session_end) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(session_id = %session_id, error = %err, "Failed to record hook event");
                false
            }
        };

        Ok(HookReport {
            session_id,
            event_name,
            outcome,
            logged,
        })
    }

    fn write(
        &self,
        session_id: &str,
        record: Map<String, Value>,
        session_end: bool,
    ) -> Result<(), HookError> {
        let cwd = string_field(&record, &["cwd"]).map(ToOwned::to_owned);
        let mut writer = SessionLogWriter::acquire(&self.layout, session_id, || {
            producer_metadata(session_id, cwd.as_deref())
        })?;
        writer.append(&Value::Object(record))?;
        writer.release(session_end && self.delete_on_session_end)
    }
}

fn parse_record(input: &str) -> Result<Map<String, Value>, HookError> {
    match serde_json::from_str(input.trim())? {
        Value::Object(map) => Ok(map),
        _ => Err(HookError::NotAnObject),
    }
}

fn string_field<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| record.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

fn annotate(record: &mut Map<String, Value>, command: &str, outcome: &HookOutcome) {
    let execution = outcome.execution(command);
    record.insert("hookCommand".into(), Value::from(execution.command));
    if let Some(output) = execution.output {
        record.insert("hookOutput".into(), Value::from(output));
    }
    if let Some(code) = execution.exit_code {
        record.insert("hookExitCode".into(), Value::from(code));
    }
    if let Some(response) = execution.response {
        match serde_json::to_value(response) {
            Ok(value) => {
                record.insert("hookResponse".into(), value);
            }
            Err(err) => tracing::debug!(error = %err, "Hook response not recorded"),
        }
    }
}
