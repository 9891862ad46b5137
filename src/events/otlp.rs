//! Normalizer for OTLP/JSON telemetry exports.
//!
//! Each line of `otel/<id>-logs.jsonl` is one `ExportLogsServiceRequest`
//! and each line of `otel/<id>-metrics.jsonl` one
//! `ExportMetricsServiceRequest`, so a single line fans out into as many
//! events as it holds records or data points.

use serde::Deserialize;

use super::hook::now_millis;
use super::types::{
    ApiError, ApiRequest, EventContext, EventKind, FieldMap, FieldValue, LogEvent, MetricUpdate,
    ToolDecision, ToolResultTelemetry, UserPromptTelemetry,
};

const SESSION_ID_KEY: &str = "session.id";
const EVENT_NAME_KEY: &str = "event.name";
const EVENT_TIMESTAMP_KEY: &str = "event.timestamp";
const EVENT_PREFIX: &str = "claude_code.";

/// Integer that OTLP/JSON may encode as a number or a decimal string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WideInt {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
}

impl WideInt {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Unsigned(n) => Some(*n),
            Self::Signed(n) => u64::try_from(*n).ok(),
            Self::Float(f) if *f >= 0.0 => Some(*f as u64),
            Self::Float(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Unsigned(n) => Some(*n as f64),
            Self::Signed(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AnyValue {
    string_value: Option<String>,
    bool_value: Option<bool>,
    int_value: Option<WideInt>,
    double_value: Option<f64>,
    array_value: Option<ArrayValue>,
    kvlist_value: Option<KeyValueList>,
    bytes_value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ArrayValue {
    values: Vec<AnyValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KeyValueList {
    values: Vec<KeyValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KeyValue {
    key: String,
    value: Option<AnyValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Resource {
    attributes: Vec<KeyValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LogsExport {
    resource_logs: Vec<ResourceLogs>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ResourceLogs {
    resource: Resource,
    scope_logs: Vec<ScopeLogs>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ScopeLogs {
    log_records: Vec<LogRecord>,
}

/// Log body; some exporters write the bare string instead of an `AnyValue`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Body {
    Text(String),
    Value(AnyValue),
}

impl Body {
    fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Value(v) => v.string_value.as_deref(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LogRecord {
    time_unix_nano: Option<WideInt>,
    observed_time_unix_nano: Option<WideInt>,
    body: Option<Body>,
    attributes: Vec<KeyValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MetricsExport {
    resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ResourceMetrics {
    resource: Resource,
    scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScopeMetrics {
    metrics: Vec<Metric>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Metric {
    name: String,
    unit: Option<String>,
    sum: Option<DataSet>,
    gauge: Option<DataSet>,
    histogram: Option<DataSet>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DataSet {
    data_points: Vec<DataPoint>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DataPoint {
    attributes: Vec<KeyValue>,
    time_unix_nano: Option<WideInt>,
    as_double: Option<f64>,
    as_int: Option<WideInt>,
    sum: Option<f64>,
    count: Option<WideInt>,
}

/// Extracts an OTLP `AnyValue`; arrays become lists and kvlists nested maps.
fn extract_value(value: &AnyValue) -> Option<FieldValue> {
    if let Some(s) = &value.string_value {
        return Some(FieldValue::String(s.clone()));
    }
    if let Some(b) = value.bool_value {
        return Some(FieldValue::Bool(b));
    }
    if let Some(n) = value.int_value.as_ref().and_then(WideInt::as_f64) {
        return Some(FieldValue::Number(n));
    }
    if let Some(d) = value.double_value {
        return Some(FieldValue::Number(d));
    }
    if let Some(array) = &value.array_value {
        return Some(FieldValue::List(
            array.values.iter().filter_map(extract_value).collect(),
        ));
    }
    if let Some(list) = &value.kvlist_value {
        return Some(FieldValue::Map(nested_attributes(&list.values)));
    }
    value.bytes_value.clone().map(FieldValue::String)
}

fn nested_attributes(attributes: &[KeyValue]) -> FieldMap {
    attributes
        .iter()
        .filter_map(|kv| {
            let value = extract_value(kv.value.as_ref()?)?;
            Some((kv.key.clone(), value))
        })
        .collect()
}

/// Primitive-leaf attributes only; nested lists and maps are excluded.
fn flat_attributes(attributes: &[KeyValue]) -> FieldMap {
    nested_attributes(attributes)
        .into_iter()
        .filter(|(_, v)| v.is_primitive())
        .collect()
}

fn nanos_to_millis(nanos: &WideInt) -> Option<i64> {
    nanos
        .as_u64()
        .filter(|n| *n > 0)
        .and_then(|n| i64::try_from(n / 1_000_000).ok())
}

fn session_of(attributes: &FieldMap, resource: &FieldMap, fallback: &str) -> String {
    attributes
        .get(SESSION_ID_KEY)
        .or_else(|| resource.get(SESSION_ID_KEY))
        .and_then(FieldValue::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

fn str_attr(attributes: &FieldMap, key: &str) -> Option<String> {
    attributes.get(key).map(ToString::to_string)
}

fn f64_attr(attributes: &FieldMap, key: &str) -> Option<f64> {
    attributes.get(key).and_then(FieldValue::as_f64)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn u64_attr(attributes: &FieldMap, key: &str) -> Option<u64> {
    f64_attr(attributes, key)
        .filter(|n| *n >= 0.0)
        .map(|n| n as u64)
}

fn bool_attr(attributes: &FieldMap, key: &str) -> Option<bool> {
    attributes.get(key).and_then(FieldValue::as_bool)
}

fn event_kind(name: &str, attrs: &FieldMap) -> Option<EventKind> {
    let kind = match name.strip_prefix(EVENT_PREFIX).unwrap_or(name) {
        "api_request" => EventKind::ApiRequest(ApiRequest {
            model: str_attr(attrs, "model"),
            cost_usd: f64_attr(attrs, "cost_usd"),
            duration_ms: f64_attr(attrs, "duration_ms"),
            input_tokens: u64_attr(attrs, "input_tokens"),
            output_tokens: u64_attr(attrs, "output_tokens"),
            cache_read_tokens: u64_attr(attrs, "cache_read_tokens"),
            cache_creation_tokens: u64_attr(attrs, "cache_creation_tokens"),
        }),
        "api_error" => EventKind::ApiError(ApiError {
            model: str_attr(attrs, "model"),
            error: str_attr(attrs, "error"),
            status_code: str_attr(attrs, "status_code"),
            duration_ms: f64_attr(attrs, "duration_ms"),
            attempt: u64_attr(attrs, "attempt"),
        }),
        "tool_result" => EventKind::ToolResult(ToolResultTelemetry {
            tool_name: str_attr(attrs, "tool_name"),
            success: bool_attr(attrs, "success"),
            duration_ms: f64_attr(attrs, "duration_ms"),
            error: str_attr(attrs, "error"),
            decision: str_attr(attrs, "decision"),
            source: str_attr(attrs, "source"),
        }),
        "tool_decision" => EventKind::ToolDecision(ToolDecision {
            tool_name: str_attr(attrs, "tool_name"),
            decision: str_attr(attrs, "decision"),
            source: str_attr(attrs, "source"),
        }),
        "user_prompt" => EventKind::UserPrompt(UserPromptTelemetry {
            prompt_length: u64_attr(attrs, "prompt_length"),
            prompt: str_attr(attrs, "prompt"),
        }),
        _ => return None,
    };
    Some(kind)
}

fn record_timestamp(record: &LogRecord, attrs: &FieldMap) -> i64 {
    record
        .time_unix_nano
        .as_ref()
        .and_then(nanos_to_millis)
        .or_else(|| {
            record
                .observed_time_unix_nano
                .as_ref()
                .and_then(nanos_to_millis)
        })
        .or_else(|| {
            attrs
                .get(EVENT_TIMESTAMP_KEY)
                .and_then(FieldValue::as_str)
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.timestamp_millis())
        })
        .unwrap_or_else(now_millis)
}

/// Normalizes one OTLP logs line into zero or more events.
///
/// Malformed lines and records with an unrecognized event name yield no
/// events.
#[must_use]
pub fn normalize_logs_line(line: &str, fallback_session: &str) -> Vec<LogEvent> {
    let export: LogsExport = match serde_json::from_str(line) {
        Ok(export) => export,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping malformed OTLP logs line");
            return Vec::new();
        }
    };

    let mut events = Vec::new();
    for resource_logs in export.resource_logs {
        let resource = flat_attributes(&resource_logs.resource.attributes);
        for record in resource_logs.scope_logs.iter().flat_map(|s| &s.log_records) {
            let attrs = flat_attributes(&record.attributes);
            let name = record
                .body
                .as_ref()
                .and_then(Body::as_text)
                .map(str::to_string)
                .or_else(|| attrs.get(EVENT_NAME_KEY).map(ToString::to_string));
            let Some(name) = name else {
                continue;
            };
            let Some(kind) = event_kind(&name, &attrs) else {
                tracing::debug!(event = %name, "Unknown telemetry event dropped");
                continue;
            };
            events.push(LogEvent {
                id: uuid::Uuid::new_v4().to_string(),
                session_id: session_of(&attrs, &resource, fallback_session),
                timestamp: record_timestamp(record, &attrs),
                context: EventContext::default(),
                kind,
            });
        }
    }
    events
}

/// Normalizes one OTLP metrics line into one event per data point.
#[must_use]
pub fn normalize_metrics_line(line: &str, fallback_session: &str) -> Vec<LogEvent> {
    let export: MetricsExport = match serde_json::from_str(line) {
        Ok(export) => export,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping malformed OTLP metrics line");
            return Vec::new();
        }
    };

    let mut events = Vec::new();
    for resource_metrics in export.resource_metrics {
        let resource = flat_attributes(&resource_metrics.resource.attributes);
        for metric in resource_metrics.scope_metrics.iter().flat_map(|s| &s.metrics) {
            let points = [&metric.sum, &metric.gauge, &metric.histogram]
                .into_iter()
                .flatten()
                .flat_map(|set| &set.data_points);
            for point in points {
                let Some(value) = data_point_value(point) else {
                    continue;
                };
                let attributes = flat_attributes(&point.attributes);
                events.push(LogEvent {
                    id: uuid::Uuid::new_v4().to_string(),
                    session_id: session_of(&attributes, &resource, fallback_session),
                    timestamp: point
                        .time_unix_nano
                        .as_ref()
                        .and_then(nanos_to_millis)
                        .unwrap_or_else(now_millis),
                    context: EventContext::default(),
                    kind: EventKind::Metric(MetricUpdate {
                        name: metric.name.clone(),
                        value,
                        unit: metric.unit.clone().filter(|u| !u.is_empty()),
                        attributes,
                    }),
                });
            }
        }
    }
    events
}

/// Gauge/sum value, or for histograms the sum falling back to the count.
fn data_point_value(point: &DataPoint) -> Option<f64> {
    point
        .as_double
        .or_else(|| point.as_int.as_ref().and_then(WideInt::as_f64))
        .or(point.sum)
        .or_else(|| point.count.as_ref().and_then(WideInt::as_f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::EventTag;

    fn logs_line() -> String {
        serde_json::json!({
            "resourceLogs": [{
                "resource": {"attributes": [
                    {"key": "session.id", "value": {"stringValue": "res-session"}},
                    {"key": "service.name", "value": {"stringValue": "claude-code"}}
                ]},
                "scopeLogs": [{
                    "logRecords": [
                        {
                            "timeUnixNano": "1700000000123456789",
                            "body": {"stringValue": "claude_code.api_request"},
                            "attributes": [
                                {"key": "model", "value": {"stringValue": "claude-sonnet"}},
                                {"key": "cost_usd", "value": {"doubleValue": 0.25}},
                                {"key": "input_tokens", "value": {"intValue": "1200"}},
                                {"key": "output_tokens", "value": {"intValue": 80}}
                            ]
                        },
                        {
                            "timeUnixNano": "1700000001999999999",
                            "body": {"stringValue": "claude_code.tool_result"},
                            "attributes": [
                                {"key": "session.id", "value": {"stringValue": "rec-session"}},
                                {"key": "tool_name", "value": {"stringValue": "Read"}},
                                {"key": "success", "value": {"stringValue": "true"}}
                            ]
                        },
                        {
                            "timeUnixNano": "1700000002000000000",
                            "body": {"stringValue": "claude_code.user_prompt"},
                            "attributes": [
                                {"key": "prompt_length", "value": {"intValue": "42"}}
                            ]
                        }
                    ]
                }]
            }]
        })
        .to_string()
    }

    #[test]
    fn test_logs_batch_fans_out() {
        let events = normalize_logs_line(&logs_line(), "owner");
        assert_eq!(events.len(), 3);

        assert_eq!(events[0].timestamp, 1_700_000_000_123);
        assert_eq!(events[1].timestamp, 1_700_000_001_999);
        assert_eq!(events[2].timestamp, 1_700_000_002_000);

        assert_eq!(events[0].session_id, "res-session");
        assert_eq!(events[1].session_id, "rec-session");

        let EventKind::ApiRequest(request) = &events[0].kind else {
            panic!("Expected ApiRequest");
        };
        assert_eq!(request.model.as_deref(), Some("claude-sonnet"));
        assert_eq!(request.cost_usd, Some(0.25));
        assert_eq!(request.input_tokens, Some(1200));
        assert_eq!(request.output_tokens, Some(80));

        let EventKind::ToolResult(result) = &events[1].kind else {
            panic!("Expected ToolResult");
        };
        assert_eq!(result.success, Some(true));
        assert_eq!(events[2].tag(), EventTag::UserPrompt);
    }

    #[test]
    fn test_session_falls_back_without_attributes() {
        let line = serde_json::json!({
            "resourceLogs": [{
                "scopeLogs": [{"logRecords": [{
                    "timeUnixNano": 5_000_000,
                    "body": "tool_decision",
                    "attributes": [{"key": "decision", "value": {"stringValue": "accept"}}]
                }]}]
            }]
        })
        .to_string();

        let events = normalize_logs_line(&line, "owner");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session_id, "owner");
        assert_eq!(events[0].timestamp, 5);
    }

    #[test]
    fn test_unknown_body_and_malformed_line() {
        let line = serde_json::json!({
            "resourceLogs": [{"scopeLogs": [{"logRecords": [
                {"body": {"stringValue": "claude_code.something_new"}}
            ]}]}]
        })
        .to_string();
        assert!(normalize_logs_line(&line, "s").is_empty());
        assert!(normalize_logs_line("{truncated", "s").is_empty());
        assert!(normalize_metrics_line("not json", "s").is_empty());
    }

    #[test]
    fn test_metrics_data_points() {
        let line = serde_json::json!({
            "resourceMetrics": [{
                "resource": {"attributes": [
                    {"key": "session.id", "value": {"stringValue": "m-session"}}
                ]},
                "scopeMetrics": [{"metrics": [
                    {
                        "name": "claude_code.cost.usage",
                        "unit": "USD",
                        "sum": {"dataPoints": [
                            {
                                "timeUnixNano": "1700000000000000000",
                                "asDouble": 0.5,
                                "attributes": [
                                    {"key": "model", "value": {"stringValue": "opus"}},
                                    {"key": "tags", "value": {"arrayValue": {"values": [
                                        {"stringValue": "a"}
                                    ]}}}
                                ]
                            },
                            {"timeUnixNano": "1700000000500000000", "asInt": "3"}
                        ]}
                    },
                    {
                        "name": "claude_code.token.usage",
                        "histogram": {"dataPoints": [{"count": "4", "sum": 900.0}]}
                    }
                ]}]
            }]
        })
        .to_string();

        let events = normalize_metrics_line(&line, "owner");
        assert_eq!(events.len(), 3);

        let EventKind::Metric(first) = &events[0].kind else {
            panic!("Expected Metric");
        };
        assert_eq!(first.name, "claude_code.cost.usage");
        assert_eq!(first.value, 0.5);
        assert_eq!(first.unit.as_deref(), Some("USD"));
        assert_eq!(
            first.attributes.get("model"),
            Some(&FieldValue::String("opus".to_string()))
        );
        assert!(!first.attributes.contains_key("tags"));
        assert_eq!(events[0].session_id, "m-session");
        assert_eq!(events[0].timestamp, 1_700_000_000_000);

        let EventKind::Metric(second) = &events[1].kind else {
            panic!("Expected Metric");
        };
        assert_eq!(second.value, 3.0);

        let EventKind::Metric(histogram) = &events[2].kind else {
            panic!("Expected Metric");
        };
        assert_eq!(histogram.value, 900.0);
    }

    #[test]
    fn test_nested_attribute_extraction() {
        let kvs: Vec<KeyValue> = serde_json::from_value(serde_json::json!([
            {"key": "flat", "value": {"intValue": "7"}},
            {"key": "list", "value": {"arrayValue": {"values": [
                {"intValue": 1}, {"boolValue": false}
            ]}}},
            {"key": "map", "value": {"kvlistValue": {"values": [
                {"key": "inner", "value": {"stringValue": "x"}}
            ]}}}
        ]))
        .unwrap();

        let nested = nested_attributes(&kvs);
        assert_eq!(
            nested["list"],
            FieldValue::List(vec![FieldValue::Number(1.0), FieldValue::Bool(false)])
        );
        let FieldValue::Map(map) = &nested["map"] else {
            panic!("Expected map");
        };
        assert_eq!(map["inner"], FieldValue::String("x".to_string()));

        let flat = flat_attributes(&kvs);
        assert_eq!(flat.len(), 1);
        assert_eq!(flat["flat"], FieldValue::Number(7.0));
    }
}
