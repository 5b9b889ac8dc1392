/// Canonical persisted keys, their defaults and list caps
use serde_json::{Map, Value, json};

/// Flat key → JSON mapping held in durable storage
pub type Record = Map<String, Value>;

/// Version stamped by the last migration step in the built-in chain
pub const SCHEMA_VERSION: u32 = 4;

/// Reported storage quota (chrome.storage.local); not enforced
pub const QUOTA_BYTES: u64 = 5_242_880;

pub mod keys {
    pub const SCHEMA_VERSION: &str = "schemaVersion";
    pub const INSTALLED_AT: &str = "installedAt";
    pub const INSTALL_SOURCE: &str = "installSource";
    pub const ONBOARDING_COMPLETE: &str = "onboardingComplete";

    pub const READ_ONLY_MODE: &str = "readOnlyMode";
    pub const PROTECTED_DOMAINS: &str = "protectedDomains";
    pub const SHOW_HTTP_ONLY: &str = "showHttpOnly";
    pub const SHOW_SECURE: &str = "showSecure";
    pub const SHOW_SESSION: &str = "showSession";
    pub const DEFAULT_EXPORT_FORMAT: &str = "defaultExportFormat";
    pub const THEME: &str = "theme";
    pub const SORT_FIELD: &str = "sortField";
    pub const SORT_DIRECTION: &str = "sortDirection";

    pub const ERROR_LOGS: &str = "errorLogs";
    pub const ANALYTICS_EVENTS: &str = "analyticsEvents";
    pub const DEBUG_MODE: &str = "debugMode";
    pub const STARTUP_HISTORY: &str = "startupHistory";
    pub const POPUP_LOAD_TIMES: &str = "popupLoadTimes";

    pub const TOTAL_OPERATIONS: &str = "totalOperations";
    pub const ACTION_COUNTS: &str = "actionCounts";
    pub const MILESTONES: &str = "milestones";
    pub const DISMISSED_TRIGGERS: &str = "dismissedTriggers";
    pub const LAST_ACTIVE_AT: &str = "lastActiveAt";
    pub const ACTIVE_DAYS: &str = "activeDays";
}

/// Keys kept across a full reset
pub const PRESERVED_ON_RESET: [&str; 3] = [
    keys::SCHEMA_VERSION,
    keys::INSTALLED_AT,
    keys::INSTALL_SOURCE,
];

/// Keys editable through UPDATE_SETTINGS
pub const SETTINGS_KEYS: [&str; 9] = [
    keys::READ_ONLY_MODE,
    keys::PROTECTED_DOMAINS,
    keys::SHOW_HTTP_ONLY,
    keys::SHOW_SECURE,
    keys::SHOW_SESSION,
    keys::DEFAULT_EXPORT_FORMAT,
    keys::THEME,
    keys::SORT_FIELD,
    keys::SORT_DIRECTION,
];

/// Pre-v1 keys that migrations fold into canonical ones and then drop
pub const LEGACY_KEYS: [&str; 3] = ["exportFormat", "darkMode", "usageCount"];

/// Per-action usage counters tracked under `actionCounts`
pub const USAGE_KINDS: [&str; 5] = ["edit", "export", "jwtDecode", "clear", "session"];

/// Every canonical key in declaration order
pub const CANONICAL_KEYS: [&str; 24] = [
    keys::SCHEMA_VERSION,
    keys::INSTALLED_AT,
    keys::INSTALL_SOURCE,
    keys::ONBOARDING_COMPLETE,
    keys::READ_ONLY_MODE,
    keys::PROTECTED_DOMAINS,
    keys::SHOW_HTTP_ONLY,
    keys::SHOW_SECURE,
    keys::SHOW_SESSION,
    keys::DEFAULT_EXPORT_FORMAT,
    keys::THEME,
    keys::SORT_FIELD,
    keys::SORT_DIRECTION,
    keys::ERROR_LOGS,
    keys::ANALYTICS_EVENTS,
    keys::DEBUG_MODE,
    keys::STARTUP_HISTORY,
    keys::POPUP_LOAD_TIMES,
    keys::TOTAL_OPERATIONS,
    keys::ACTION_COUNTS,
    keys::MILESTONES,
    keys::DISMISSED_TRIGGERS,
    keys::LAST_ACTIVE_AT,
    keys::ACTIVE_DAYS,
];

pub fn is_canonical(key: &str) -> bool {
    CANONICAL_KEYS.contains(&key)
}

/// Documented default for a canonical key, `None` for anything else
pub fn default_for(key: &str) -> Option<Value> {
    let value = match key {
        keys::SCHEMA_VERSION => json!(0),
        keys::INSTALLED_AT => Value::Null,
        keys::INSTALL_SOURCE => json!("unknown"),
        keys::ONBOARDING_COMPLETE => json!(false),

        keys::READ_ONLY_MODE => json!(false),
        keys::PROTECTED_DOMAINS => json!([]),
        keys::SHOW_HTTP_ONLY | keys::SHOW_SECURE | keys::SHOW_SESSION => json!(true),
        keys::DEFAULT_EXPORT_FORMAT => json!("json"),
        keys::THEME => json!("system"),
        keys::SORT_FIELD => json!("name"),
        keys::SORT_DIRECTION => json!("asc"),

        keys::ERROR_LOGS
        | keys::ANALYTICS_EVENTS
        | keys::STARTUP_HISTORY
        | keys::POPUP_LOAD_TIMES => json!([]),
        keys::DEBUG_MODE => json!(false),

        keys::TOTAL_OPERATIONS => json!(0),
        keys::ACTION_COUNTS => {
            let counts: Map<String, Value> = USAGE_KINDS
                .iter()
                .map(|kind| (kind.to_string(), json!(0)))
                .collect();
            Value::Object(counts)
        }
        keys::MILESTONES => json!({}),
        keys::DISMISSED_TRIGGERS => json!([]),
        keys::LAST_ACTIVE_AT => Value::Null,
        keys::ACTIVE_DAYS => json!([]),
        _ => return None,
    };
    Some(value)
}

/// Maximum length of a bounded list key
pub fn list_cap(key: &str) -> Option<usize> {
    match key {
        keys::ERROR_LOGS => Some(100),
        keys::ANALYTICS_EVENTS => Some(500),
        keys::STARTUP_HISTORY => Some(20),
        keys::POPUP_LOAD_TIMES => Some(50),
        keys::ACTIVE_DAYS => Some(60),
        _ => None,
    }
}

pub const BOUNDED_KEYS: [&str; 5] = [
    keys::ERROR_LOGS,
    keys::ANALYTICS_EVENTS,
    keys::STARTUP_HISTORY,
    keys::POPUP_LOAD_TIMES,
    keys::ACTIVE_DAYS,
];

/// Complete record of defaults
pub fn defaults() -> Record {
    apply_defaults(Record::new())
}

/// Fill every missing canonical key with its default.
///
/// This is the single defaulting path shared by `get_all`, `get` and
/// `migrate`; stored values always win over defaults.
pub fn apply_defaults(mut record: Record) -> Record {
    for key in CANONICAL_KEYS {
        if !record.contains_key(key) {
            if let Some(default) = default_for(key) {
                record.insert(key.to_string(), default);
            }
        }
    }
    record
}

/// Push onto a capped list, evicting the oldest entries first
pub fn push_bounded(list: &mut Vec<Value>, entry: Value, cap: usize) {
    list.push(entry);
    truncate_oldest(list, cap);
}

/// Keep only the newest `cap` entries
pub fn truncate_oldest(list: &mut Vec<Value>, cap: usize) {
    if list.len() > cap {
        let overflow = list.len() - cap;
        list.drain(..overflow);
    }
}

/// True when `value` has the JSON shape of `key`'s default.
///
/// Keys defaulting to null (timestamps) accept a number or null. Unknown keys
/// never conform.
pub fn conforms(key: &str, value: &Value) -> bool {
    let Some(default) = default_for(key) else {
        return false;
    };
    match (&default, value) {
        (Value::Null, Value::Null | Value::Number(_)) => true,
        (Value::Bool(_), Value::Bool(_)) => true,
        (Value::Number(_), Value::Number(_)) => true,
        (Value::String(_), Value::String(_)) => true,
        (Value::Array(_), Value::Array(_)) => true,
        (Value::Object(_), Value::Object(_)) => true,
        _ => false,
    }
}

/// Stored schema version, treating absent or malformed values as 0
pub fn schema_version_of(record: &Record) -> u32 {
    record
        .get(keys::SCHEMA_VERSION)
        .and_then(Value::as_u64)
        .map(|v| v.min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}
