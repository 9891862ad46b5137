//! Colored terminal rendering of monitor output.
//!
//! Events go to stdout, one line each. Diagnostics from `tracing` go to
//! stderr, so the two never interleave mid-line.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;

use crate::events::{EventKind, EventTag, FieldMap, FieldValue, LogEvent, ParseError, ToolUse};
use crate::monitor::{ConnectionState, MonitorUpdate};
use crate::session::Session;

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 80;

/// Maximum length of a single field value inside a field list.
const FIELD_MAX_LEN: usize = 50;

/// How updates are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Print full values instead of truncating.
    pub raw: bool,
    /// Print events as JSON lines instead of text.
    pub json: bool,
}

/// Format a millisecond timestamp like `12:04:05.123`.
#[must_use]
pub fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map_or_else(|| millis.to_string(), |dt| dt.format("%H:%M:%S%.3f").to_string())
}

/// Truncate a string to at most `max_len` characters, adding an ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{kept}...")
}

/// Format a field map as `key=value` pairs, truncating long values.
#[must_use]
pub fn format_fields(fields: &FieldMap, raw_mode: bool) -> String {
    fields
        .iter()
        .map(|(k, v)| {
            let value = match v {
                FieldValue::String(s) => truncate(s, FIELD_MAX_LEN, raw_mode),
                other => truncate(&other.to_string(), FIELD_MAX_LEN, raw_mode),
            };
            format!("{k}={value}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn tool_summary(tool: &ToolUse, raw_mode: bool) -> String {
    let mut summary = format!("{}({})", tool.tool_name, format_fields(&tool.tool_input, raw_mode));
    if let Some(ms) = tool.duration_ms {
        summary.push_str(&format!(" {ms:.0}ms"));
    }
    if let Some(hook) = &tool.hook {
        if let Some(code) = hook.exit_code {
            summary.push_str(&format!(" hook={code}"));
        }
        if hook.response.as_ref().is_some_and(|r| r.stops_producer()) {
            summary.push_str(" (stopped)");
        }
    }
    summary
}

fn opt<T: ToString>(value: Option<&T>) -> String {
    value.map_or_else(|| "-".to_string(), ToString::to_string)
}

/// One-line plain description of an event's payload.
#[must_use]
pub fn summarize(event: &LogEvent, raw_mode: bool) -> String {
    match &event.kind {
        EventKind::ToolUse(tool) => tool_summary(tool, raw_mode),
        EventKind::UserPromptSubmit { prompt } => truncate(prompt, DEFAULT_MAX_LEN, raw_mode),
        EventKind::Stop(details) | EventKind::SubagentStop(details) => {
            details.reason.clone().unwrap_or_default()
        }
        EventKind::Notification {
            notification_type,
            message,
        } => match notification_type {
            Some(kind) => format!("[{kind}] {}", truncate(message, DEFAULT_MAX_LEN, raw_mode)),
            None => truncate(message, DEFAULT_MAX_LEN, raw_mode),
        },
        EventKind::PreCompact {
            trigger,
            custom_instructions,
        } => {
            let trigger = format!("{trigger:?}").to_lowercase();
            match custom_instructions {
                Some(text) => format!("{trigger}: {}", truncate(text, FIELD_MAX_LEN, raw_mode)),
                None => trigger,
            }
        }
        EventKind::SessionStart { source } => format!("{source:?}").to_lowercase(),
        EventKind::SessionEnd { reason } => format!("{reason:?}").to_lowercase(),
        EventKind::ApiRequest(req) => format!(
            "model={} in={} out={} cost=${:.4} {}ms",
            opt(req.model.as_ref()),
            opt(req.input_tokens.as_ref()),
            opt(req.output_tokens.as_ref()),
            req.cost_usd.unwrap_or_default(),
            req.duration_ms.unwrap_or_default().round(),
        ),
        EventKind::ApiError(err) => format!(
            "model={} status={} {}",
            opt(err.model.as_ref()),
            opt(err.status_code.as_ref()),
            truncate(err.error.as_deref().unwrap_or_default(), DEFAULT_MAX_LEN, raw_mode),
        ),
        EventKind::ToolResult(result) => format!(
            "{} success={} {}ms",
            opt(result.tool_name.as_ref()),
            opt(result.success.as_ref()),
            result.duration_ms.unwrap_or_default().round(),
        ),
        EventKind::ToolDecision(decision) => format!(
            "{} {} ({})",
            opt(decision.tool_name.as_ref()),
            opt(decision.decision.as_ref()),
            opt(decision.source.as_ref()),
        ),
        EventKind::UserPrompt(prompt) => match &prompt.prompt {
            Some(text) => truncate(text, DEFAULT_MAX_LEN, raw_mode),
            None => format!("{} chars", opt(prompt.prompt_length.as_ref())),
        },
        EventKind::Metric(metric) => {
            let unit = metric.unit.as_deref().unwrap_or_default();
            if metric.attributes.is_empty() {
                format!("{}={}{unit}", metric.name, metric.value)
            } else {
                format!(
                    "{}={}{unit} {{{}}}",
                    metric.name,
                    metric.value,
                    format_fields(&metric.attributes, raw_mode)
                )
            }
        }
    }
}

fn label(tag: EventTag) -> String {
    let text = format!("[{tag}]");
    match tag {
        EventTag::ToolUse | EventTag::ToolResult => text.yellow().bold().to_string(),
        EventTag::UserPromptSubmit | EventTag::UserPrompt => text.cyan().bold().to_string(),
        EventTag::Stop | EventTag::SubagentStop => text.magenta().bold().to_string(),
        EventTag::SessionStart | EventTag::SessionEnd | EventTag::PreCompact => {
            text.blue().bold().to_string()
        }
        EventTag::ApiError => text.red().bold().to_string(),
        EventTag::ToolDecision => text.green().bold().to_string(),
        EventTag::Notification | EventTag::ApiRequest | EventTag::Metric => {
            text.dimmed().to_string()
        }
    }
}

/// Print one normalized event.
pub fn print_event(event: &LogEvent, options: RenderOptions) {
    if options.json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::warn!(error = %err, "Failed to serialize event"),
        }
    } else {
        println!(
            "{} {} {}",
            format_timestamp(event.timestamp).dimmed(),
            label(event.tag()),
            summarize(event, options.raw)
        );
    }
    let _ = io::stdout().flush();
}

/// Print a connection state change.
pub fn print_state(state: &ConnectionState) {
    match state {
        ConnectionState::Connecting => {
            println!("{} {}", "[MONITOR]".blue().bold(), "connecting...".dimmed());
        }
        ConnectionState::Connected { session_id } => {
            println!("{} connected to {}", "[MONITOR]".blue().bold(), session_id.cyan());
        }
        ConnectionState::Error(message) => {
            println!(
                "{} {} {}",
                "[MONITOR]".red().bold(),
                message.red(),
                "(r to retry, q to quit)".dimmed()
            );
        }
        ConnectionState::Disconnected => {
            println!("{} disconnected", "[MONITOR]".blue().bold());
        }
    }
    let _ = io::stdout().flush();
}

/// Print a line that could not be parsed.
pub fn print_parse_error(err: &ParseError, raw_mode: bool) {
    println!(
        "{} {} {}",
        "[PARSE]".red().bold(),
        err.origin,
        truncate(&err.line, DEFAULT_MAX_LEN, raw_mode).dimmed()
    );
}

/// Ask whether to switch to a newly discovered session.
pub fn print_switch_prompt(candidate: &Session) {
    println!(
        "{} new session {} detected {}",
        "[SWITCH]".yellow().bold(),
        candidate.id.cyan(),
        "(s to switch, i to ignore)".dimmed()
    );
    let _ = io::stdout().flush();
}

/// Render any monitor update.
pub fn render(update: &MonitorUpdate, options: RenderOptions) {
    match update {
        MonitorUpdate::Event(event) => print_event(event, options),
        MonitorUpdate::State(state) if !options.json => print_state(state),
        MonitorUpdate::ParseError(err) if !options.json => print_parse_error(err, options.raw),
        MonitorUpdate::SwitchPrompt(candidate) => print_switch_prompt(candidate),
        MonitorUpdate::SwitchIgnored(candidate) if !options.json => {
            println!("{} staying on current session, ignored {}", "[SWITCH]".yellow().bold(), candidate.id);
        }
        MonitorUpdate::Cleared if !options.json => {
            println!("{}", "--- session switched ---".dimmed());
        }
        _ => {}
    }
}

/// Print the active sessions table for `sessions`.
pub fn print_sessions(sessions: &[Session]) {
    if sessions.is_empty() {
        println!("{}", "No active sessions".dimmed());
        return;
    }
    for session in sessions {
        let started = session
            .metadata
            .as_ref()
            .map_or_else(|| "-".to_string(), |m| format_timestamp(m.start_time));
        let pid = session.pid().map_or_else(|| "-".to_string(), |p| p.to_string());
        let cwd = session
            .metadata
            .as_ref()
            .map(|m| m.cwd.as_str())
            .unwrap_or_default();
        println!(
            "{}  {} pid={} {}",
            session.id.cyan(),
            started.dimmed(),
            pid,
            truncate(cwd, DEFAULT_MAX_LEN, false)
        );
    }
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}
