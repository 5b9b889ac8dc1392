/// Typed view over the settings keys of the persisted record
use crate::domain;
use crate::operations::{ExportFormat, SortDirection, SortField, Visibility};
use crate::schema::{self, Record, keys};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub read_only_mode: bool,
    pub protected_domains: Vec<String>,
    pub show_http_only: bool,
    pub show_secure: bool,
    pub show_session: bool,
    pub default_export_format: ExportFormat,
    pub theme: Theme,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            read_only_mode: false,
            protected_domains: Vec::new(),
            show_http_only: true,
            show_secure: true,
            show_session: true,
            default_export_format: ExportFormat::Json,
            theme: Theme::System,
            sort_field: SortField::Name,
            sort_direction: SortDirection::Asc,
        }
    }
}

impl Settings {
    /// Read settings from a (defaulted) record.
    ///
    /// A key holding a value of the wrong shape falls back to its default
    /// without affecting the other keys.
    pub fn from_record(record: &Record) -> Settings {
        let mut settings = Record::new();
        for key in schema::SETTINGS_KEYS {
            let Some(value) = record.get(key) else { continue };
            let candidate = json!({ key: value });
            if serde_json::from_value::<Settings>(candidate).is_ok() {
                settings.insert(key.to_string(), value.clone());
            } else {
                log::warn!("Ignoring malformed setting {}: {}", key, value);
            }
        }

        serde_json::from_value(Value::Object(settings)).unwrap_or_default()
    }

    pub fn visibility(&self) -> Visibility {
        Visibility {
            http_only: self.show_http_only,
            secure: self.show_secure,
            session: self.show_session,
        }
    }

    /// Protected entry covering `cookie_domain`, if any
    pub fn protection_for(&self, cookie_domain: &str) -> Option<&str> {
        domain::find_protected(cookie_domain, &self.protected_domains)
    }
}

/// Check an UPDATE_SETTINGS object and turn it into a partial record.
///
/// Only settings keys are accepted; protected domains are normalized and
/// deduplicated. Every problem is reported, not just the first.
pub fn validate_update(update: &Record) -> Result<Record, Vec<String>> {
    let mut partial = Record::new();
    let mut errors = Vec::new();

    for (key, value) in update {
        if !schema::SETTINGS_KEYS.contains(&key.as_str()) {
            errors.push(format!("Unknown setting: {}", key));
            continue;
        }

        if key == keys::PROTECTED_DOMAINS {
            match normalize_domain_list(value) {
                Ok(domains) => {
                    partial.insert(key.clone(), json!(domains));
                }
                Err(e) => errors.push(e),
            }
            continue;
        }

        let candidate = json!({ key.as_str(): value });
        match serde_json::from_value::<Settings>(candidate) {
            Ok(_) => {
                partial.insert(key.clone(), value.clone());
            }
            Err(_) => errors.push(format!("Invalid value for setting {}: {}", key, value)),
        }
    }

    if errors.is_empty() {
        Ok(partial)
    } else {
        Err(errors)
    }
}

fn normalize_domain_list(value: &Value) -> Result<Vec<String>, String> {
    let Value::Array(items) = value else {
        return Err("protectedDomains must be a list".to_string());
    };

    let mut domains: Vec<String> = Vec::new();
    for item in items {
        let Some(raw) = item.as_str() else {
            return Err(format!("Invalid protected domain: {}", item));
        };
        let normalized = domain::normalize_domain(raw);
        if normalized.is_empty() {
            continue;
        }
        if !domain::is_valid_domain(&normalized) {
            return Err(format!("Invalid protected domain: {}", raw));
        }
        if !domains.contains(&normalized) {
            domains.push(normalized);
        }
    }
    Ok(domains)
}
