//! Normalized event model shared by the hook and telemetry sources.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Open key/value map with primitive leaves (tool input, metric attributes).
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A JSON-like value restricted to explicit variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<FieldValue>),
    Map(FieldMap),
}

impl FieldValue {
    /// Returns true for string, number, boolean and null leaves.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::List(_) | Self::Map(_))
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view; numeric strings are accepted since OTLP encodes int64 as text.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::String(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::List(_) | Self::Map(_) => match serde_json::to_string(self) {
                Ok(json) => write!(f, "{json}"),
                Err(_) => write!(f, "<unprintable>"),
            },
        }
    }
}

/// Converts a JSON object into a [`FieldMap`]; any other shape yields an empty map.
#[must_use]
pub fn field_map_from_json(value: serde_json::Value) -> FieldMap {
    match FieldValue::from(value) {
        FieldValue::Map(map) => map,
        _ => FieldMap::new(),
    }
}

/// Metadata written once by the producer when a session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub session_id: String,
    pub pid: u32,
    /// Process start time in milliseconds since the epoch.
    pub start_time: i64,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub user: String,
}

/// Permission decision returned by a `PreToolUse` hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionDecision {
    Allow,
    Deny,
    Ask,
}

/// Hook-specific part of a structured hook response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HookSpecificOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_event_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_decision: Option<PermissionDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_decision_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_input: Option<FieldMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
}

/// Structured response printed by a hook on stdout.
///
/// Decision fields may appear at the top level or nested under
/// `hookSpecificOutput`; the accessors prefer the nested form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HookResponse {
    #[serde(rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppress_output: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_decision: Option<PermissionDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_input: Option<FieldMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
    /// `block`/`approve` for prompt and stop hooks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
}

impl HookResponse {
    #[must_use]
    pub fn permission_decision(&self) -> Option<PermissionDecision> {
        self.hook_specific_output
            .as_ref()
            .and_then(|o| o.permission_decision)
            .or(self.permission_decision)
    }

    #[must_use]
    pub fn updated_input(&self) -> Option<&FieldMap> {
        self.hook_specific_output
            .as_ref()
            .and_then(|o| o.updated_input.as_ref())
            .or(self.updated_input.as_ref())
    }

    #[must_use]
    pub fn additional_context(&self) -> Option<&str> {
        self.hook_specific_output
            .as_ref()
            .and_then(|o| o.additional_context.as_deref())
            .or(self.additional_context.as_deref())
    }

    /// `continue: false` asks the producer to stop.
    #[must_use]
    pub fn stops_producer(&self) -> bool {
        self.continue_ == Some(false)
    }
}

/// Record of a user hook command invoked for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookExecution {
    pub command: String,
    pub output: Option<String>,
    pub exit_code: Option<i32>,
    pub response: Option<HookResponse>,
}

/// Contextual fields carried by hook-originated events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    pub cwd: Option<String>,
    pub permission_mode: Option<String>,
    pub transcript_path: Option<String>,
}

/// A completed tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUse {
    pub tool_name: String,
    pub tool_use_id: Option<String>,
    pub tool_input: FieldMap,
    pub tool_result: Option<FieldValue>,
    pub duration_ms: Option<f64>,
    pub hook: Option<HookExecution>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopDetails {
    pub reason: Option<String>,
    pub stop_hook_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactTrigger {
    Manual,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionSource {
    Startup,
    Resume,
    Clear,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionEndReason {
    Clear,
    Logout,
    PromptInputExit,
    Other,
}

impl SessionEndReason {
    /// Maps a producer reason string; unrecognized reasons become `Other`.
    #[must_use]
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "clear" => Self::Clear,
            "logout" => Self::Logout,
            "prompt_input_exit" | "prompt-input-exit" | "prompt-exit" => Self::PromptInputExit,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    pub model: Option<String>,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<f64>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cache_read_tokens: Option<u64>,
    pub cache_creation_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub model: Option<String>,
    pub error: Option<String>,
    pub status_code: Option<String>,
    pub duration_ms: Option<f64>,
    pub attempt: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultTelemetry {
    pub tool_name: Option<String>,
    pub success: Option<bool>,
    pub duration_ms: Option<f64>,
    pub error: Option<String>,
    pub decision: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDecision {
    pub tool_name: Option<String>,
    pub decision: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPromptTelemetry {
    pub prompt_length: Option<u64>,
    pub prompt: Option<String>,
}

/// One metric data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricUpdate {
    pub name: String,
    pub value: f64,
    pub unit: Option<String>,
    /// Primitive attributes only; nested values are excluded.
    pub attributes: FieldMap,
}

/// The closed set of event kinds across both sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "eventType")]
pub enum EventKind {
    ToolUse(ToolUse),
    UserPromptSubmit {
        prompt: String,
    },
    Stop(StopDetails),
    SubagentStop(StopDetails),
    #[serde(rename_all = "camelCase")]
    Notification {
        notification_type: Option<String>,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    PreCompact {
        trigger: CompactTrigger,
        custom_instructions: Option<String>,
    },
    SessionStart {
        source: SessionSource,
    },
    SessionEnd {
        reason: SessionEndReason,
    },
    ApiRequest(ApiRequest),
    ApiError(ApiError),
    ToolResult(ToolResultTelemetry),
    ToolDecision(ToolDecision),
    UserPrompt(UserPromptTelemetry),
    Metric(MetricUpdate),
}

/// Fieldless mirror of [`EventKind`] for filtering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventTag {
    ToolUse,
    UserPromptSubmit,
    Stop,
    SubagentStop,
    Notification,
    PreCompact,
    SessionStart,
    SessionEnd,
    ApiRequest,
    ApiError,
    ToolResult,
    ToolDecision,
    UserPrompt,
    Metric,
}

impl EventTag {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToolUse => "ToolUse",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::Stop => "Stop",
            Self::SubagentStop => "SubagentStop",
            Self::Notification => "Notification",
            Self::PreCompact => "PreCompact",
            Self::SessionStart => "SessionStart",
            Self::SessionEnd => "SessionEnd",
            Self::ApiRequest => "ApiRequest",
            Self::ApiError => "ApiError",
            Self::ToolResult => "ToolResult",
            Self::ToolDecision => "ToolDecision",
            Self::UserPrompt => "UserPrompt",
            Self::Metric => "Metric",
        }
    }

    /// Returns true for kinds produced by the telemetry exporter.
    #[must_use]
    pub fn is_telemetry(self) -> bool {
        matches!(
            self,
            Self::ApiRequest
                | Self::ApiError
                | Self::ToolResult
                | Self::ToolDecision
                | Self::UserPrompt
                | Self::Metric
        )
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EventKind {
    #[must_use]
    pub fn tag(&self) -> EventTag {
        match self {
            Self::ToolUse(_) => EventTag::ToolUse,
            Self::UserPromptSubmit { .. } => EventTag::UserPromptSubmit,
            Self::Stop(_) => EventTag::Stop,
            Self::SubagentStop(_) => EventTag::SubagentStop,
            Self::Notification { .. } => EventTag::Notification,
            Self::PreCompact { .. } => EventTag::PreCompact,
            Self::SessionStart { .. } => EventTag::SessionStart,
            Self::SessionEnd { .. } => EventTag::SessionEnd,
            Self::ApiRequest(_) => EventTag::ApiRequest,
            Self::ApiError(_) => EventTag::ApiError,
            Self::ToolResult(_) => EventTag::ToolResult,
            Self::ToolDecision(_) => EventTag::ToolDecision,
            Self::UserPrompt(_) => EventTag::UserPrompt,
            Self::Metric(_) => EventTag::Metric,
        }
    }
}

/// A normalized event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub id: String,
    pub session_id: String,
    /// Producer-supplied milliseconds since the epoch.
    pub timestamp: i64,
    #[serde(flatten)]
    pub context: EventContext,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl LogEvent {
    #[must_use]
    pub fn tag(&self) -> EventTag {
        self.kind.tag()
    }

    /// Tool name for tool-related kinds.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        match &self.kind {
            EventKind::ToolUse(t) => Some(&t.tool_name),
            EventKind::ToolResult(t) => t.tool_name.as_deref(),
            EventKind::ToolDecision(t) => t.tool_name.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_from_json_nested() {
        let value = FieldValue::from(serde_json::json!({
            "command": "ls",
            "timeout": 5,
            "flags": ["-l", true],
        }));
        let FieldValue::Map(map) = value else {
            panic!("Expected map");
        };
        assert_eq!(map["command"], FieldValue::String("ls".to_string()));
        assert_eq!(map["timeout"], FieldValue::Number(5.0));
        assert_eq!(
            map["flags"],
            FieldValue::List(vec![
                FieldValue::String("-l".to_string()),
                FieldValue::Bool(true)
            ])
        );
    }

    #[test]
    fn test_field_value_numeric_string() {
        assert_eq!(FieldValue::String("42".to_string()).as_f64(), Some(42.0));
        assert_eq!(FieldValue::Bool(true).as_f64(), None);
    }

    #[test]
    fn test_field_map_from_non_object() {
        assert!(field_map_from_json(serde_json::json!("text")).is_empty());
    }

    #[test]
    fn test_hook_response_prefers_specific_output() {
        let json = r#"{
            "continue": false,
            "permissionDecision": "allow",
            "hookSpecificOutput": {"hookEventName": "PreToolUse", "permissionDecision": "deny"}
        }"#;
        let response: HookResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.permission_decision(), Some(PermissionDecision::Deny));
        assert!(response.stops_producer());
    }

    #[test]
    fn test_session_end_reason_from_wire() {
        assert_eq!(SessionEndReason::from_wire("logout"), SessionEndReason::Logout);
        assert_eq!(
            SessionEndReason::from_wire("prompt_input_exit"),
            SessionEndReason::PromptInputExit
        );
        assert_eq!(SessionEndReason::from_wire("crash"), SessionEndReason::Other);
    }

    #[test]
    fn test_log_event_serializes_flat_tag() {
        let event = LogEvent {
            id: "e1".to_string(),
            session_id: "abc".to_string(),
            timestamp: 1000,
            context: EventContext::default(),
            kind: EventKind::SessionStart {
                source: SessionSource::Startup,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "SessionStart");
        assert_eq!(json["source"], "startup");
        assert_eq!(json["sessionId"], "abc");
        assert_eq!(event.tag(), EventTag::SessionStart);
    }

    #[test]
    fn test_metadata_camel_case() {
        let json = r#"{"sessionId":"s1","pid":4242,"startTime":1700000000000,"cwd":"/tmp","user":"dev"}"#;
        let meta: SessionMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.pid, 4242);
        assert_eq!(meta.start_time, 1_700_000_000_000);
    }
}
