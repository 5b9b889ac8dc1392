/// Message contract: action whitelist, payload schemas and sanitization
use serde::Serialize;
use serde_json::{Map, Value};

/// Primitive JSON type a schema field must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    /// A JSON object; arrays do not count
    Object,
    Array,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (FieldType::String, Value::String(_))
                | (FieldType::Number, Value::Number(_))
                | (FieldType::Boolean, Value::Bool(_))
                | (FieldType::Object, Value::Object(_))
                | (FieldType::Array, Value::Array(_))
        )
    }
}

/// Name of a JSON value's type as reported in error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldType,
    pub required: bool,
}

const fn req(name: &'static str, kind: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
    }
}

const fn opt(name: &'static str, kind: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
    }
}

/// Declared shape of one whitelisted action
#[derive(Debug, Clone, Copy)]
pub struct ActionSchema {
    pub action: &'static str,
    /// Fields nested under `payload`, or `None` when the action takes no payload
    pub payload: Option<&'static [FieldSpec]>,
    /// Fields carried directly on the envelope
    pub top_level: &'static [FieldSpec],
}

const fn bare(action: &'static str) -> ActionSchema {
    ActionSchema {
        action,
        payload: None,
        top_level: &[],
    }
}

const fn with_payload(action: &'static str, fields: &'static [FieldSpec]) -> ActionSchema {
    ActionSchema {
        action,
        payload: Some(fields),
        top_level: &[],
    }
}

const fn with_top_level(action: &'static str, fields: &'static [FieldSpec]) -> ActionSchema {
    ActionSchema {
        action,
        payload: None,
        top_level: fields,
    }
}

use FieldType::{Array, Boolean, Number, Object, String as Str};

const GET_COOKIES: &[FieldSpec] = &[req("url", Str)];
const SET_COOKIE: &[FieldSpec] = &[
    req("name", Str),
    req("value", Str),
    req("domain", Str),
    opt("path", Str),
    opt("secure", Boolean),
    opt("httpOnly", Boolean),
    opt("sameSite", Str),
    opt("expirationDate", Number),
    opt("url", Str),
];
const DELETE_COOKIE: &[FieldSpec] = &[req("url", Str), req("name", Str)];
const CLEAR_DOMAIN: &[FieldSpec] = &[req("domain", Str)];
const EXPORT_COOKIES: &[FieldSpec] = &[req("domain", Str), opt("format", Str)];
const UPDATE_SETTINGS: &[FieldSpec] = &[req("settings", Object)];
const REPORT_ERROR: &[FieldSpec] = &[req("error", Object)];
const REPORT_ERRORS_BATCH: &[FieldSpec] = &[req("errors", Array)];
const TOGGLE_DEBUG_MODE: &[FieldSpec] = &[opt("enabled", Boolean)];
const RECORD_USAGE: &[FieldSpec] = &[req("action", Str)];
const DISMISS_TRIGGER: &[FieldSpec] = &[req("triggerId", Str)];
const IMPORT_DATA: &[FieldSpec] = &[req("data", Object)];
const TRACK_EVENT: &[FieldSpec] = &[req("name", Str), opt("properties", Object)];
const RECORD_POPUP_LOAD: &[FieldSpec] = &[req("durationMs", Number)];

/// Every action the background dispatcher accepts
pub static ACTIONS: &[ActionSchema] = &[
    with_payload("GET_COOKIES", GET_COOKIES),
    with_payload("SET_COOKIE", SET_COOKIE),
    with_payload("DELETE_COOKIE", DELETE_COOKIE),
    with_payload("CLEAR_DOMAIN", CLEAR_DOMAIN),
    with_payload("EXPORT_COOKIES", EXPORT_COOKIES),
    bare("GET_SETTINGS"),
    with_payload("UPDATE_SETTINGS", UPDATE_SETTINGS),
    with_top_level("REPORT_ERROR", REPORT_ERROR),
    with_top_level("REPORT_ERRORS_BATCH", REPORT_ERRORS_BATCH),
    bare("GET_ERROR_LOGS"),
    bare("CLEAR_ERROR_LOGS"),
    bare("GET_DEBUG_LOGS"),
    bare("GET_HEALTH_REPORT"),
    with_payload("TOGGLE_DEBUG_MODE", TOGGLE_DEBUG_MODE),
    bare("GET_MILESTONES"),
    bare("GET_GROWTH_STATS"),
    bare("GET_CHURN_STATUS"),
    bare("GET_ENGAGEMENT_SCORE"),
    bare("GET_RETENTION_TRIGGER"),
    with_payload("RECORD_USAGE", RECORD_USAGE),
    with_payload("DISMISS_TRIGGER", DISMISS_TRIGGER),
    bare("GET_STORAGE_QUOTA"),
    bare("EXPORT_DATA"),
    with_payload("IMPORT_DATA", IMPORT_DATA),
    bare("RESET_DATA"),
    bare("COMPLETE_ONBOARDING"),
    with_payload("TRACK_EVENT", TRACK_EVENT),
    with_payload("RECORD_POPUP_LOAD", RECORD_POPUP_LOAD),
];

pub fn schema_for(action: &str) -> Option<&'static ActionSchema> {
    ACTIONS.iter().find(|schema| schema.action == action)
}

pub fn is_valid_action(action: &str) -> bool {
    schema_for(action).is_some()
}

/// Verdict of [`validate_message`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Validation {
    fn from_errors(errors: Vec<String>) -> Validation {
        Validation {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Check an envelope against the whitelist and its action's schema.
///
/// An invalid action short-circuits with one error; otherwise every field
/// violation is collected.
pub fn validate_message(envelope: &Value) -> Validation {
    let Value::Object(envelope) = envelope else {
        return Validation::from_errors(vec!["Message must be an object".to_string()]);
    };

    let Some(action) = envelope.get("action").and_then(Value::as_str) else {
        return Validation::from_errors(vec!["Missing or invalid action".to_string()]);
    };

    let Some(schema) = schema_for(action) else {
        return Validation::from_errors(vec![format!("Unknown action: {}", action)]);
    };

    let mut errors = Vec::new();

    if let Some(fields) = schema.payload {
        match envelope.get("payload") {
            None | Some(Value::Null) => check_fields(fields, &Map::new(), "payload field", &mut errors),
            Some(Value::Object(payload)) => check_fields(fields, payload, "payload field", &mut errors),
            Some(_) => errors.push("Payload must be an object".to_string()),
        }
    }

    check_fields(schema.top_level, envelope, "field", &mut errors);

    Validation::from_errors(errors)
}

fn check_fields(fields: &[FieldSpec], source: &Map<String, Value>, label: &str, errors: &mut Vec<String>) {
    for field in fields {
        match source.get(field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    errors.push(format!("Missing required {}: {}", label, field.name));
                }
            }
            Some(value) if !field.kind.matches(value) => {
                errors.push(format!(
                    "Invalid type for {}: {} (expected {}, got {})",
                    label,
                    field.name,
                    field.kind.name(),
                    type_name(value)
                ));
            }
            Some(_) => {}
        }
    }
}

/// Project a payload onto its action's declared fields, coercing types.
///
/// Returns `None` for unknown actions, actions without a payload schema,
/// or a payload that is not an object. Undeclared fields are dropped.
pub fn sanitize_payload(action: &str, payload: &Value) -> Option<Map<String, Value>> {
    let fields = schema_for(action)?.payload?;
    let Value::Object(payload) = payload else {
        return None;
    };

    let mut clean = Map::new();
    for field in fields {
        let Some(raw) = payload.get(field.name) else { continue };
        if raw.is_null() {
            continue;
        }
        if let Some(value) = coerce(field.kind, raw) {
            clean.insert(field.name.to_string(), value);
        }
    }
    Some(clean)
}

fn coerce(kind: FieldType, raw: &Value) -> Option<Value> {
    match kind {
        FieldType::String => match raw {
            Value::String(s) => Some(Value::String(s.trim().to_string())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        FieldType::Number => {
            let number = match raw {
                Value::Number(n) => return Some(Value::Number(n.clone())),
                Value::String(s) => parse_number(s),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                _ => None,
            }?;
            serde_json::Number::from_f64(number).map(Value::Number)
        }
        FieldType::Boolean => Some(Value::Bool(truthy(raw))),
        FieldType::Array => Some(match raw {
            Value::Array(_) => raw.clone(),
            _ => Value::Array(Vec::new()),
        }),
        FieldType::Object => Some(match raw {
            Value::Object(_) => raw.clone(),
            _ => Value::Object(Map::new()),
        }),
    }
}

// Empty or whitespace strings count as zero, like a numeric cast in the UI
fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Action name with its declared field names
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedAction {
    pub action: &'static str,
    pub payload_fields: Vec<&'static str>,
    pub top_level_fields: Vec<&'static str>,
}

/// The whitelist as a listing for callers and diagnostics
pub fn allowed_actions() -> Vec<AllowedAction> {
    ACTIONS
        .iter()
        .map(|schema| AllowedAction {
            action: schema.action,
            payload_fields: schema
                .payload
                .unwrap_or(&[])
                .iter()
                .map(|f| f.name)
                .collect(),
            top_level_fields: schema.top_level.iter().map(|f| f.name).collect(),
        })
        .collect()
}

/// True only when the sender carries this extension's own runtime id
pub fn is_internal_sender(sender: &Value, own_id: &str) -> bool {
    if own_id.is_empty() {
        return false;
    }
    sender
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| id == own_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_valid_action() {
        assert!(is_valid_action("GET_COOKIES"));
        assert!(is_valid_action("DISMISS_TRIGGER"));
        assert!(!is_valid_action("get_cookies"));
        assert!(!is_valid_action(""));
    }

    #[test]
    fn test_whitelist_has_no_duplicates() {
        let mut names: Vec<&str> = ACTIONS.iter().map(|a| a.action).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ACTIONS.len());
    }

    #[test]
    fn test_validate_get_cookies() {
        let ok = validate_message(&json!({"action": "GET_COOKIES", "payload": {"url": "https://a.com"}}));
        assert_eq!(ok, Validation { valid: true, errors: vec![] });

        let missing = validate_message(&json!({"action": "GET_COOKIES", "payload": {}}));
        assert_eq!(
            missing,
            Validation {
                valid: false,
                errors: vec!["Missing required payload field: url".to_string()]
            }
        );
    }

    #[test]
    fn test_validate_unknown_action() {
        let result = validate_message(&json!({"action": "NOT_A_REAL_ACTION"}));

        assert!(!result.valid);
        assert_eq!(result.errors, vec!["Unknown action: NOT_A_REAL_ACTION".to_string()]);
    }

    #[test]
    fn test_validate_non_string_action() {
        let result = validate_message(&json!({"action": 5, "payload": {}}));

        assert_eq!(result.errors, vec!["Missing or invalid action".to_string()]);
        assert_eq!(validate_message(&json!("GET_COOKIES")).errors.len(), 1);
    }

    #[test]
    fn test_validate_collects_every_violation() {
        let result = validate_message(&json!({
            "action": "SET_COOKIE",
            "payload": {"name": 1, "value": "v", "secure": "yes"}
        }));

        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec![
                "Invalid type for payload field: name (expected string, got number)".to_string(),
                "Missing required payload field: domain".to_string(),
                "Invalid type for payload field: secure (expected boolean, got string)".to_string(),
            ]
        );
    }

    #[test]
    fn test_validate_missing_payload_enumerates_required() {
        let result = validate_message(&json!({"action": "DELETE_COOKIE"}));

        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_validate_payload_must_be_object() {
        let result = validate_message(&json!({"action": "GET_COOKIES", "payload": "https://a.com"}));

        assert_eq!(result.errors, vec!["Payload must be an object".to_string()]);
    }

    #[test]
    fn test_validate_object_excludes_array() {
        let result = validate_message(&json!({"action": "REPORT_ERROR", "error": []}));

        assert_eq!(
            result.errors,
            vec!["Invalid type for field: error (expected object, got array)".to_string()]
        );
    }

    #[test]
    fn test_validate_top_level_fields() {
        let ok = validate_message(&json!({
            "action": "REPORT_ERRORS_BATCH",
            "errors": [{"message": "x"}],
            "unexpected": true
        }));
        assert!(ok.valid);

        let missing = validate_message(&json!({"action": "REPORT_ERROR"}));
        assert_eq!(missing.errors, vec!["Missing required field: error".to_string()]);
    }

    #[test]
    fn test_validate_optional_null_is_absent() {
        let result = validate_message(&json!({
            "action": "EXPORT_COOKIES",
            "payload": {"domain": "a.com", "format": null}
        }));

        assert!(result.valid);
    }

    #[test]
    fn test_validate_is_pure() {
        let envelope = json!({"action": "CLEAR_DOMAIN", "payload": {"domain": 3}});

        assert_eq!(validate_message(&envelope), validate_message(&envelope));
    }

    #[test]
    fn test_sanitize_set_cookie() {
        let clean = sanitize_payload(
            "SET_COOKIE",
            &json!({
                "name": " a ",
                "value": "b",
                "domain": "x",
                "path": "/",
                "secure": "yes",
                "httpOnly": 1,
                "sameSite": "lax",
                "extra": "drop-me"
            }),
        )
        .unwrap();

        assert_eq!(clean["name"], json!("a"));
        assert_eq!(clean["secure"], json!(true));
        assert_eq!(clean["httpOnly"], json!(true));
        assert_eq!(clean["sameSite"], json!("lax"));
        assert!(!clean.contains_key("extra"));
    }

    #[test]
    fn test_sanitize_numbers() {
        let clean = sanitize_payload("RECORD_POPUP_LOAD", &json!({"durationMs": " 125.5 "})).unwrap();
        assert_eq!(clean["durationMs"], json!(125.5));

        let dropped = sanitize_payload("RECORD_POPUP_LOAD", &json!({"durationMs": "fast"})).unwrap();
        assert!(!dropped.contains_key("durationMs"));

        let infinite = sanitize_payload("RECORD_POPUP_LOAD", &json!({"durationMs": "inf"})).unwrap();
        assert!(!infinite.contains_key("durationMs"));
    }

    #[test]
    fn test_sanitize_replaces_wrong_containers() {
        let clean = sanitize_payload("TRACK_EVENT", &json!({"name": "open", "properties": [1, 2]})).unwrap();

        assert_eq!(clean["properties"], json!({}));
    }

    #[test]
    fn test_sanitize_boolean_truthiness() {
        let falsy = sanitize_payload("TOGGLE_DEBUG_MODE", &json!({"enabled": 0})).unwrap();
        assert_eq!(falsy["enabled"], json!(false));

        let empty = sanitize_payload("TOGGLE_DEBUG_MODE", &json!({"enabled": ""})).unwrap();
        assert_eq!(empty["enabled"], json!(false));
    }

    #[test]
    fn test_sanitize_returns_none() {
        assert_eq!(sanitize_payload("NOT_A_REAL_ACTION", &json!({})), None);
        assert_eq!(sanitize_payload("GET_SETTINGS", &json!({})), None);
        assert_eq!(sanitize_payload("REPORT_ERROR", &json!({"error": {}})), None);
        assert_eq!(sanitize_payload("GET_COOKIES", &json!("https://a.com")), None);
    }

    #[test]
    fn test_allowed_actions_lists_fields() {
        let actions = allowed_actions();
        let report = actions.iter().find(|a| a.action == "REPORT_ERROR").unwrap();
        let export = actions.iter().find(|a| a.action == "EXPORT_COOKIES").unwrap();

        assert_eq!(report.top_level_fields, vec!["error"]);
        assert!(report.payload_fields.is_empty());
        assert_eq!(export.payload_fields, vec!["domain", "format"]);
    }

    #[test]
    fn test_is_internal_sender() {
        assert!(is_internal_sender(&json!({"id": "own-id"}), "own-id"));
        assert!(!is_internal_sender(&json!({"id": "other"}), "own-id"));
        assert!(!is_internal_sender(&json!({}), "own-id"));
        assert!(!is_internal_sender(&json!({"id": 7}), "own-id"));
        assert!(!is_internal_sender(&Value::Null, "own-id"));
        assert!(!is_internal_sender(&json!({"id": ""}), ""));
    }
}
