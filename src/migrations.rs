/// Versioned upgrade chain for the persisted record
use crate::error::MigrationError;
use crate::schema::{self, Record, keys};
use serde_json::{Map, Value, json};

/// Pure transform from one schema version to the next
pub type Transform = fn(Record) -> Result<Record, MigrationError>;

/// A single versioned migration step
#[derive(Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub transform: Transform,
}

impl Migration {
    pub const fn new(version: u32, name: &'static str, transform: Transform) -> Self {
        Migration {
            version,
            name,
            transform,
        }
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish()
    }
}

/// Result of folding the pending steps over a record
#[derive(Debug)]
pub struct ChainOutcome {
    /// Record as of the last successfully applied step
    pub record: Record,
    /// Version stamped by the last successful step (or the starting version)
    pub version: u32,
    pub error: Option<MigrationError>,
}

/// The built-in chain, in ascending version order
pub fn builtin() -> Vec<Migration> {
    vec![
        Migration::new(1, "rename-legacy-settings", rename_legacy_settings),
        Migration::new(2, "normalize-protected-domains", normalize_protected_domains),
        Migration::new(3, "fold-legacy-usage", fold_legacy_usage),
        Migration::new(4, "cap-bounded-lists", cap_bounded_lists),
    ]
}

/// Apply every step newer than `from`, in list order.
///
/// Each step sees the previous step's output. A failing step stops the fold;
/// the returned record and version are those of the last step that succeeded.
pub fn run_chain(record: Record, from: u32, migrations: &[Migration]) -> ChainOutcome {
    let pending = migrations.iter().filter(|m| m.version > from);

    let mut current = record;
    let mut version = from;
    for step in pending {
        log::debug!("Applying migration v{} ({})", step.version, step.name);
        match (step.transform)(current.clone()) {
            Ok(mut next) => {
                next.insert(keys::SCHEMA_VERSION.to_string(), json!(step.version));
                current = next;
                version = step.version;
            }
            Err(error) => {
                return ChainOutcome {
                    record: current,
                    version,
                    error: Some(error),
                };
            }
        }
    }

    ChainOutcome {
        record: current,
        version,
        error: None,
    }
}

/// v1: `exportFormat` → `defaultExportFormat`, `darkMode` → `theme`
fn rename_legacy_settings(mut record: Record) -> Result<Record, MigrationError> {
    if let Some(format) = record.remove("exportFormat") {
        if !record.contains_key(keys::DEFAULT_EXPORT_FORMAT) {
            record.insert(keys::DEFAULT_EXPORT_FORMAT.to_string(), format);
        }
    }

    if let Some(dark) = record.remove("darkMode") {
        if !record.contains_key(keys::THEME) {
            let theme = match dark {
                Value::Bool(true) => "dark",
                Value::Bool(false) => "light",
                _ => "system",
            };
            record.insert(keys::THEME.to_string(), json!(theme));
        }
    }

    Ok(record)
}

/// v2: trim, lowercase, strip leading dots and dedupe protected domains
fn normalize_protected_domains(mut record: Record) -> Result<Record, MigrationError> {
    let domains = match record.get(keys::PROTECTED_DOMAINS) {
        None | Some(Value::Null) => return Ok(record),
        Some(Value::Array(items)) => items.clone(),
        Some(_) => {
            return Err(MigrationError::step(2, "protectedDomains is not a list"));
        }
    };

    let mut normalized: Vec<String> = Vec::new();
    for item in domains {
        let Some(raw) = item.as_str() else { continue };
        let domain = crate::domain::normalize_domain(raw);
        if !domain.is_empty() && !normalized.contains(&domain) {
            normalized.push(domain);
        }
    }

    record.insert(keys::PROTECTED_DOMAINS.to_string(), json!(normalized));
    Ok(record)
}

/// v3: fold `usageCount` into `totalOperations`, convert list milestones to a map
fn fold_legacy_usage(mut record: Record) -> Result<Record, MigrationError> {
    if let Some(legacy) = record.remove("usageCount") {
        let legacy = legacy.as_u64().unwrap_or(0);
        let current = record
            .get(keys::TOTAL_OPERATIONS)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        record.insert(keys::TOTAL_OPERATIONS.to_string(), json!(legacy.max(current)));
    }

    if let Some(Value::Array(ids)) = record.get(keys::MILESTONES) {
        let map: Map<String, Value> = ids
            .iter()
            .filter_map(Value::as_str)
            .map(|id| (id.to_string(), json!(0)))
            .collect();
        record.insert(keys::MILESTONES.to_string(), Value::Object(map));
    }

    Ok(record)
}

/// v4: enforce list caps, keeping the newest entries
fn cap_bounded_lists(mut record: Record) -> Result<Record, MigrationError> {
    for key in schema::BOUNDED_KEYS {
        let Some(cap) = schema::list_cap(key) else { continue };
        if let Some(Value::Array(list)) = record.get_mut(key) {
            schema::truncate_oldest(list, cap);
        }
    }
    Ok(record)
}
