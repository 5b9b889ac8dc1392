/// Error logs, analytics events and the health report
use crate::schema::{Record, SCHEMA_VERSION, keys};
use crate::store::QuotaInfo;
use crate::time::MS_PER_DAY;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

const MAX_MESSAGE_LEN: usize = 1_000;
const MAX_STACK_LEN: usize = 4_000;
const MAX_PROPERTIES_BYTES: usize = 2_048;

/// A persisted error report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub timestamp: f64,
}

fn clipped(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

impl ErrorLogEntry {
    /// Normalize a reported error object; `None` if it has no usable message
    pub fn from_report(report: &Value, now: f64) -> Option<ErrorLogEntry> {
        let report = report.as_object()?;
        let text = |field: &str| {
            report
                .get(field)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let message = text("message")?;
        Some(ErrorLogEntry {
            id: Uuid::new_v4().to_string(),
            message: clipped(message, MAX_MESSAGE_LEN),
            stack: text("stack").map(|s| clipped(s, MAX_STACK_LEN)),
            context: text("context").map(str::to_string),
            source: text("source").map(str::to_string),
            timestamp: report
                .get("timestamp")
                .and_then(Value::as_f64)
                .filter(|ts| ts.is_finite())
                .unwrap_or(now),
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// Keep properties in order while their serialized size stays under the limit
fn bounded_properties(properties: &Map<String, Value>) -> Map<String, Value> {
    let mut kept = Map::new();
    let mut used: usize = 0;
    for (key, value) in properties {
        let size = serde_json::to_string(value).map_or(usize::MAX, |s| s.len()).saturating_add(key.len());
        if used.saturating_add(size) > MAX_PROPERTIES_BYTES {
            log::debug!("Dropping analytics property {} ({} bytes)", key, size);
            continue;
        }
        used += size;
        kept.insert(key.clone(), value.clone());
    }
    kept
}

/// An analytics event as persisted under `analyticsEvents`
pub fn analytics_event(name: &str, properties: Option<&Map<String, Value>>, now: f64) -> Value {
    json!({
        "name": name,
        "properties": properties.map(bounded_properties).unwrap_or_default(),
        "timestamp": now,
    })
}

/// Startup or popup-load timing sample
pub fn timing_sample(duration_ms: f64, now: f64) -> Value {
    json!({ "durationMs": duration_ms, "timestamp": now })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub schema_version: u64,
    pub current_schema_version: u32,
    pub storage: QuotaInfo,
    pub error_count: usize,
    pub errors_last_24h: usize,
    pub debug_mode: bool,
    pub avg_startup_ms: Option<f64>,
    pub avg_popup_load_ms: Option<f64>,
    pub generated_at: f64,
}

fn average_duration(record: &Record, key: &str) -> Option<f64> {
    let samples: Vec<f64> = record
        .get(key)
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|sample| match sample {
            Value::Number(n) => n.as_f64(),
            Value::Object(obj) => obj.get("durationMs").and_then(Value::as_f64),
            _ => None,
        })
        .collect();

    if samples.is_empty() {
        return None;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}

pub fn health_report(record: &Record, storage: QuotaInfo, now: f64) -> HealthReport {
    let logs = record
        .get(keys::ERROR_LOGS)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let errors_last_24h = logs
        .iter()
        .filter_map(|entry| entry.get("timestamp").and_then(Value::as_f64))
        .filter(|ts| now - ts <= MS_PER_DAY)
        .count();

    let status = if storage.percent_used >= 90.0 {
        HealthStatus::Critical
    } else if storage.percent_used >= 75.0 || errors_last_24h > 10 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    HealthReport {
        status,
        schema_version: record
            .get(keys::SCHEMA_VERSION)
            .and_then(Value::as_u64)
            .unwrap_or(0),
        current_schema_version: SCHEMA_VERSION,
        storage,
        error_count: logs.len(),
        errors_last_24h,
        debug_mode: record
            .get(keys::DEBUG_MODE)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        avg_startup_ms: average_duration(record, keys::STARTUP_HISTORY),
        avg_popup_load_ms: average_duration(record, keys::POPUP_LOAD_TIMES),
        generated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    #[test]
    fn test_error_entry_from_report() {
        let report = json!({
            "message": "  Failed to set cookie ",
            "stack": "at popup.js:10",
            "context": "popup",
            "extra": "ignored"
        });

        let entry = ErrorLogEntry::from_report(&report, 500.0).unwrap();

        assert_eq!(entry.message, "Failed to set cookie");
        assert_eq!(entry.stack.as_deref(), Some("at popup.js:10"));
        assert_eq!(entry.context.as_deref(), Some("popup"));
        assert_eq!(entry.source, None);
        assert_eq!(entry.timestamp, 500.0);
        assert!(Uuid::parse_str(&entry.id).is_ok());
    }

    #[test]
    fn test_error_entry_requires_message() {
        assert_eq!(ErrorLogEntry::from_report(&json!({"stack": "x"}), 0.0), None);
        assert_eq!(ErrorLogEntry::from_report(&json!({"message": "   "}), 0.0), None);
        assert_eq!(ErrorLogEntry::from_report(&json!("boom"), 0.0), None);
    }

    #[test]
    fn test_error_entry_clips_long_message() {
        let long = "x".repeat(5_000);

        let entry = ErrorLogEntry::from_report(&json!({"message": long}), 0.0).unwrap();

        assert_eq!(entry.message.len(), MAX_MESSAGE_LEN);
    }

    #[test]
    fn test_analytics_event_drops_oversized_properties() {
        let properties = json!({"a": "popup", "b": "x".repeat(5_000), "c": 3})
            .as_object()
            .cloned()
            .unwrap();

        let event = analytics_event("opened", Some(&properties), 7.0);

        assert_eq!(event["properties"], json!({"a": "popup", "c": 3}));
        assert_eq!(event["timestamp"], json!(7.0));
        assert!(event["properties"].to_string().len() <= MAX_PROPERTIES_BYTES);
    }

    #[test]
    fn test_health_report_healthy() {
        let mut record = schema::defaults();
        record.insert(
            keys::STARTUP_HISTORY.to_string(),
            json!([{"durationMs": 10.0, "timestamp": 0}, {"durationMs": 20.0, "timestamp": 1}]),
        );

        let report = health_report(&record, QuotaInfo::from_bytes(1_000), 0.0);

        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.avg_startup_ms, Some(15.0));
        assert_eq!(report.avg_popup_load_ms, None);
        assert_eq!(report.current_schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_health_report_degraded_by_recent_errors() {
        let now = 10.0 * MS_PER_DAY;
        let mut logs: Vec<Value> = (0..11).map(|_| json!({"message": "x", "timestamp": now - 1.0})).collect();
        logs.push(json!({"message": "old", "timestamp": 0.0}));
        let mut record = schema::defaults();
        record.insert(keys::ERROR_LOGS.to_string(), Value::Array(logs));

        let report = health_report(&record, QuotaInfo::from_bytes(0), now);

        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.error_count, 12);
        assert_eq!(report.errors_last_24h, 11);
    }

    #[test]
    fn test_health_report_critical_storage() {
        let record = schema::defaults();
        let storage = QuotaInfo::from_bytes(schema::QUOTA_BYTES);

        let report = health_report(&record, storage, 0.0);

        assert_eq!(report.status, HealthStatus::Critical);
    }
}
