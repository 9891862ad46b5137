//! Normalizer for hook-originated records.
//!
//! Producers write either the snake_case names Claude Code passes to hooks
//! (`hook_event_name`, `tool_input`, ...) or their camelCase equivalents;
//! both spellings are accepted.

use serde::Deserialize;

use super::types::{
    field_map_from_json, CompactTrigger, EventContext, EventKind, FieldValue, HookExecution,
    HookResponse, LogEvent, SessionEndReason, SessionSource, StopDetails, ToolUse,
};

/// Raw hook record as written to `hooks/<session-id>.jsonl`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct HookRecord {
    id: Option<String>,
    #[serde(alias = "session_id")]
    session_id: Option<String>,
    #[serde(alias = "hook_event_name", alias = "hookEventName")]
    event_type: Option<String>,
    timestamp: Option<serde_json::Value>,
    #[serde(alias = "transcript_path")]
    transcript_path: Option<String>,
    cwd: Option<String>,
    #[serde(alias = "permission_mode")]
    permission_mode: Option<String>,
    #[serde(alias = "tool_name")]
    tool_name: Option<String>,
    #[serde(alias = "tool_use_id")]
    tool_use_id: Option<String>,
    #[serde(alias = "tool_input")]
    tool_input: Option<serde_json::Value>,
    #[serde(alias = "tool_response")]
    tool_result: Option<serde_json::Value>,
    prompt: Option<String>,
    #[serde(alias = "duration_ms")]
    duration: Option<f64>,
    reason: Option<String>,
    #[serde(alias = "stop_hook_active")]
    stop_hook_active: Option<bool>,
    #[serde(alias = "notification_type")]
    notification_type: Option<String>,
    message: Option<String>,
    trigger: Option<String>,
    #[serde(alias = "custom_instructions")]
    custom_instructions: Option<String>,
    source: Option<String>,
    #[serde(alias = "hook_command")]
    hook_command: Option<String>,
    #[serde(alias = "hook_output")]
    hook_output: Option<String>,
    #[serde(alias = "hook_exit_code")]
    hook_exit_code: Option<i32>,
    #[serde(alias = "hook_response")]
    hook_response: Option<serde_json::Value>,
}

/// Spellings accepted for one field, highest precedence first.
const ALIAS_GROUPS: &[&[&str]] = &[
    &["sessionId", "session_id"],
    &["eventType", "hookEventName", "hook_event_name"],
    &["transcriptPath", "transcript_path"],
    &["permissionMode", "permission_mode"],
    &["toolName", "tool_name"],
    &["toolUseId", "tool_use_id"],
    &["toolInput", "tool_input"],
    &["toolResult", "tool_response"],
    &["duration", "duration_ms"],
    &["stopHookActive", "stop_hook_active"],
    &["notificationType", "notification_type"],
    &["customInstructions", "custom_instructions"],
    &["hookCommand", "hook_command"],
    &["hookOutput", "hook_output"],
    &["hookExitCode", "hook_exit_code"],
    &["hookResponse", "hook_response"],
];

/// Keep only the first present spelling of each aliased field.
fn dedupe_aliases(map: &mut serde_json::Map<String, serde_json::Value>) {
    for group in ALIAS_GROUPS {
        let mut present = group.iter().filter(|key| map.contains_key(**key));
        if present.next().is_none() {
            continue;
        }
        let shadowed: Vec<&str> = present.copied().collect();
        for key in shadowed {
            map.remove(key);
        }
    }
}

/// Current wall-clock time in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Reads a millisecond timestamp given as a number, numeric string or RFC 3339 string.
#[allow(clippy::cast_possible_truncation)]
fn timestamp_millis(value: Option<&serde_json::Value>) -> Option<i64> {
    match value? {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok().or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis())
        }),
        _ => None,
    }
}

/// Parses one hook-schema line.
///
/// Returns `Ok(None)` for records that are valid JSON but carry no
/// recognized event kind, including `PreToolUse`: its matching
/// `PostToolUse` record carries the input, result and duration, so only
/// the latter becomes a [`EventKind::ToolUse`].
///
/// # Errors
///
/// Returns the `serde_json` error when the line is not a JSON object.
pub fn normalize_hook_line(
    line: &str,
    fallback_session: &str,
) -> Result<Option<LogEvent>, serde_json::Error> {
    let mut map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(line)?;
    dedupe_aliases(&mut map);
    let record: HookRecord = serde_json::from_value(serde_json::Value::Object(map))?;
    Ok(normalize_record(record, fallback_session))
}

fn normalize_record(record: HookRecord, fallback_session: &str) -> Option<LogEvent> {
    let Some(event_type) = record.event_type.as_deref() else {
        tracing::debug!("Hook record without event type dropped");
        return None;
    };

    let kind = match event_type {
        "PreToolUse" => return None,
        "PostToolUse" => EventKind::ToolUse(tool_use(&record)),
        "UserPromptSubmit" => EventKind::UserPromptSubmit {
            prompt: record.prompt.clone().unwrap_or_default(),
        },
        "Stop" => EventKind::Stop(stop_details(&record)),
        "SubagentStop" => EventKind::SubagentStop(stop_details(&record)),
        "Notification" => EventKind::Notification {
            notification_type: record.notification_type.clone(),
            message: record.message.clone().unwrap_or_default(),
        },
        "PreCompact" => EventKind::PreCompact {
            trigger: compact_trigger(record.trigger.as_deref())?,
            custom_instructions: record.custom_instructions.clone(),
        },
        "SessionStart" => EventKind::SessionStart {
            source: session_source(record.source.as_deref())?,
        },
        "SessionEnd" => EventKind::SessionEnd {
            reason: record
                .reason
                .as_deref()
                .map_or(SessionEndReason::Other, SessionEndReason::from_wire),
        },
        other => {
            tracing::debug!(event_type = %other, "Unknown hook event dropped");
            return None;
        }
    };

    let timestamp = timestamp_millis(record.timestamp.as_ref()).unwrap_or_else(now_millis);
    let session_id = record
        .session_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback_session.to_string());

    Some(LogEvent {
        id: record
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        session_id,
        timestamp,
        context: EventContext {
            cwd: record.cwd,
            permission_mode: record.permission_mode,
            transcript_path: record.transcript_path,
        },
        kind,
    })
}

fn tool_use(record: &HookRecord) -> ToolUse {
    let hook = record.hook_command.as_ref().map(|command| HookExecution {
        command: command.clone(),
        output: record.hook_output.clone(),
        exit_code: record.hook_exit_code,
        response: record
            .hook_response
            .clone()
            .and_then(|v| serde_json::from_value::<HookResponse>(v).ok()),
    });

    ToolUse {
        tool_name: record
            .tool_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        tool_use_id: record.tool_use_id.clone(),
        tool_input: record
            .tool_input
            .clone()
            .map(field_map_from_json)
            .unwrap_or_default(),
        tool_result: record.tool_result.clone().map(FieldValue::from),
        duration_ms: record.duration,
        hook,
    }
}

fn stop_details(record: &HookRecord) -> StopDetails {
    StopDetails {
        reason: record.reason.clone(),
        stop_hook_active: record.stop_hook_active,
    }
}

fn compact_trigger(trigger: Option<&str>) -> Option<CompactTrigger> {
    match trigger {
        None | Some("auto") => Some(CompactTrigger::Auto),
        Some("manual") => Some(CompactTrigger::Manual),
        Some(other) => {
            tracing::debug!(trigger = %other, "Unknown compaction trigger dropped");
            None
        }
    }
}

fn session_source(source: Option<&str>) -> Option<SessionSource> {
    match source {
        None | Some("startup") => Some(SessionSource::Startup),
        Some("resume") => Some(SessionSource::Resume),
        Some("clear") => Some(SessionSource::Clear),
        Some("compact") => Some(SessionSource::Compact),
        Some(other) => {
            tracing::debug!(source = %other, "Unknown session source dropped");
            None
        }
    }
}
