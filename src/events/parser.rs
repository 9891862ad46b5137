//! Source-aware line parser.

use std::fmt;

use super::error::ParseError;
use super::hook::normalize_hook_line;
use super::otlp::{normalize_logs_line, normalize_metrics_line};
use super::types::LogEvent;

/// The log files a session may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    /// `hooks/<id>.jsonl`
    Hooks,
    /// `otel/<id>-logs.jsonl`
    TelemetryLogs,
    /// `otel/<id>-metrics.jsonl`
    TelemetryMetrics,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [Self::Hooks, Self::TelemetryLogs, Self::TelemetryMetrics];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hooks => "hooks",
            Self::TelemetryLogs => "telemetry-logs",
            Self::TelemetryMetrics => "telemetry-metrics",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns lines from one log source into normalized events.
#[derive(Debug, Clone)]
pub struct LineParser {
    source: SourceKind,
    session_id: String,
}

impl LineParser {
    /// Create a parser for `source`; `session_id` tags events that carry none.
    #[must_use]
    pub fn new(source: SourceKind, session_id: impl Into<String>) -> Self {
        Self {
            source,
            session_id: session_id.into(),
        }
    }

    #[must_use]
    pub fn source(&self) -> SourceKind {
        self.source
    }

    /// Parse one line into zero or more events.
    ///
    /// Blank lines, unknown event kinds and `PreToolUse` records produce no
    /// events. Malformed telemetry lines also produce none.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when a hook line is not valid JSON.
    pub fn parse(&self, line: &str) -> Result<Vec<LogEvent>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Vec::new());
        }
        match self.source {
            SourceKind::Hooks => normalize_hook_line(line, &self.session_id)
                .map(|event| event.into_iter().collect())
                .map_err(|cause| ParseError {
                    origin: self.source,
                    line: line.to_string(),
                    cause,
                }),
            SourceKind::TelemetryLogs => Ok(normalize_logs_line(line, &self.session_id)),
            SourceKind::TelemetryMetrics => Ok(normalize_metrics_line(line, &self.session_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::EventTag;

    #[test]
    fn test_hook_parser_reports_malformed_line() {
        let parser = LineParser::new(SourceKind::Hooks, "s");
        let err = parser.parse("{\"hook_event_name\":").unwrap_err();
        assert_eq!(err.origin, SourceKind::Hooks);
        assert_eq!(err.line, "{\"hook_event_name\":");
    }

    #[test]
    fn test_telemetry_parser_swallows_malformed_line() {
        let parser = LineParser::new(SourceKind::TelemetryLogs, "s");
        assert!(parser.parse("garbage").unwrap().is_empty());
    }

    #[test]
    fn test_blank_line_yields_nothing() {
        let parser = LineParser::new(SourceKind::Hooks, "s");
        assert!(parser.parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_tool_pair_coalesces_to_one_event() {
        let parser = LineParser::new(SourceKind::Hooks, "s");
        let pre = r#"{"hook_event_name":"PreToolUse","session_id":"s","tool_name":"Edit","tool_use_id":"t9","tool_input":{"file_path":"a.rs"}}"#;
        let post = r#"{"hook_event_name":"PostToolUse","session_id":"s","tool_name":"Edit","tool_use_id":"t9","tool_input":{"file_path":"a.rs"},"tool_response":"ok","duration":4}"#;

        let events: Vec<LogEvent> = [pre, post]
            .iter()
            .flat_map(|line| parser.parse(line).unwrap())
            .collect();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tag(), EventTag::ToolUse);
        assert_eq!(events[0].tool_name(), Some("Edit"));
    }
}
