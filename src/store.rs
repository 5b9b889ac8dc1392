/// Schema-aware access to the persisted record
use crate::error::MigrationError;
use crate::migrations::{self, Migration};
use crate::schema::{self, QUOTA_BYTES, Record, keys};
use crate::storage::StorageArea;
use serde::Serialize;
use serde_json::{Value, json};

/// Outcome of a migration run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationReport {
    pub migrated: bool,
    pub from: u32,
    pub to: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Storage usage against the reported quota
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaInfo {
    pub bytes_in_use: u64,
    pub quota: u64,
    pub percent_used: f64,
    pub bytes_remaining: u64,
}

impl QuotaInfo {
    pub fn from_bytes(bytes_in_use: u64) -> QuotaInfo {
        let percent = bytes_in_use as f64 / QUOTA_BYTES as f64 * 100.0;
        QuotaInfo {
            bytes_in_use,
            quota: QUOTA_BYTES,
            percent_used: (percent * 100.0).round() / 100.0,
            bytes_remaining: QUOTA_BYTES.saturating_sub(bytes_in_use),
        }
    }
}

/// Single source of truth for defaults, schema version and upgrades.
///
/// Storage failures never reach the caller: reads fall back to defaults,
/// writes report `false`, and both log a warning.
pub struct SchemaStore<S> {
    storage: S,
    migrations: Vec<Migration>,
}

impl<S: StorageArea> SchemaStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_migrations(storage, migrations::builtin())
    }

    /// Use a custom chain; steps must already be in ascending version order
    pub fn with_migrations(storage: S, migrations: Vec<Migration>) -> Self {
        SchemaStore {
            storage,
            migrations,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Every canonical key, stored values overlaid on defaults
    pub async fn get_all(&self) -> Record {
        match self.storage.get(None).await {
            Ok(stored) => schema::apply_defaults(stored),
            Err(e) => {
                log::warn!("Failed to read storage, using defaults: {}", e);
                schema::defaults()
            }
        }
    }

    /// Stored value for `key`, else its default, else null
    pub async fn get(&self, key: &str) -> Value {
        let fallback = || schema::default_for(key).unwrap_or(Value::Null);
        match self.storage.get(Some(&[key][..])).await {
            Ok(mut stored) => stored.remove(key).unwrap_or_else(fallback),
            Err(e) => {
                log::warn!("Failed to read {}: {}", key, e);
                fallback()
            }
        }
    }

    /// Shallow merge of `partial` into storage
    pub async fn set(&self, partial: Record) -> bool {
        match self.storage.set(partial).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to write storage: {}", e);
                false
            }
        }
    }

    pub async fn set_value(&self, key: &str, value: Value) -> bool {
        let mut partial = Record::new();
        partial.insert(key.to_string(), value);
        self.set(partial).await
    }

    /// Run every pending migration step.
    ///
    /// On success the fully defaulted record is written back in one `set`.
    /// When a step fails, the record as of the last good step is committed
    /// (if any step succeeded) but the report still says `to: from`; the
    /// next startup resumes from the committed version.
    pub async fn migrate(&self) -> MigrationReport {
        let stored = match self.storage.get(None).await {
            Ok(stored) => stored,
            Err(e) => {
                log::error!("Migration aborted, storage unreadable: {}", e);
                return MigrationReport {
                    migrated: false,
                    from: 0,
                    to: 0,
                    error: Some(e.to_string()),
                };
            }
        };

        let from = schema::schema_version_of(&stored);
        let original_keys: Vec<String> = stored.keys().cloned().collect();
        let outcome = migrations::run_chain(stored, from, &self.migrations);

        if let Some(error) = outcome.error {
            log::error!("Migration from v{} stopped at v{}: {}", from, outcome.version, error);
            if outcome.version > from {
                if let Err(e) = self.write_back(outcome.record, &original_keys).await {
                    log::error!("Failed to commit partial migration: {}", e);
                }
            }
            return MigrationReport {
                migrated: false,
                from,
                to: from,
                error: Some(error.to_string()),
            };
        }

        if outcome.version == from {
            log::debug!("Schema already at v{}", from);
            self.sweep_legacy_keys(&original_keys).await;
            return MigrationReport {
                migrated: false,
                from,
                to: from,
                error: None,
            };
        }

        let record = schema::apply_defaults(outcome.record);
        match self.write_back(record, &original_keys).await {
            Ok(()) => {
                log::info!("Migrated schema v{} -> v{}", from, outcome.version);
                MigrationReport {
                    migrated: true,
                    from,
                    to: outcome.version,
                    error: None,
                }
            }
            Err(e) => {
                log::error!("Failed to write migrated record: {}", e);
                MigrationReport {
                    migrated: false,
                    from,
                    to: from,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    // The set commits the version; dropping keys a step removed is best-effort
    async fn write_back(&self, record: Record, original_keys: &[String]) -> Result<(), MigrationError> {
        let dropped: Vec<&str> = original_keys
            .iter()
            .map(String::as_str)
            .filter(|key| !record.contains_key(*key))
            .collect();

        self.storage.set(record).await?;
        if !dropped.is_empty() {
            if let Err(e) = self.storage.remove(&dropped).await {
                log::warn!("Failed to drop migrated keys {:?}: {}", dropped, e);
            }
        }
        Ok(())
    }

    // Retry removal of legacy keys a previous run could not drop
    async fn sweep_legacy_keys(&self, stored_keys: &[String]) {
        let stranded: Vec<&str> = schema::LEGACY_KEYS
            .into_iter()
            .filter(|key| stored_keys.iter().any(|stored| stored == key))
            .collect();
        if stranded.is_empty() {
            return;
        }
        match self.storage.remove(&stranded).await {
            Ok(()) => log::info!("Removed stranded legacy keys {:?}", stranded),
            Err(e) => log::warn!("Failed to remove legacy keys {:?}: {}", stranded, e),
        }
    }

    pub async fn quota_info(&self) -> QuotaInfo {
        let bytes = match self.storage.get_bytes_in_use(None).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Failed to read bytes in use: {}", e);
                0
            }
        };
        QuotaInfo::from_bytes(bytes)
    }

    /// Clear everything except install metadata, then reseed defaults
    pub async fn reset(&self) -> bool {
        let preserved = match self.storage.get(Some(&schema::PRESERVED_ON_RESET[..])).await {
            Ok(preserved) => preserved,
            Err(e) => {
                log::warn!("Failed to read install metadata before reset: {}", e);
                Record::new()
            }
        };

        if let Err(e) = self.storage.clear().await {
            log::warn!("Failed to clear storage: {}", e);
            return false;
        }

        log::info!("Storage reset");
        self.set(schema::apply_defaults(preserved)).await
    }

    /// Append to a capped list key, evicting the oldest entries
    pub async fn append_bounded(&self, key: &str, entry: Value) -> bool {
        self.append_many(key, vec![entry]).await
    }

    pub async fn append_many(&self, key: &str, entries: Vec<Value>) -> bool {
        let mut list = match self.get(key).await {
            Value::Array(list) => list,
            _ => Vec::new(),
        };

        let cap = schema::list_cap(key).unwrap_or(usize::MAX);
        for entry in entries {
            schema::push_bounded(&mut list, entry, cap);
        }

        self.set_value(key, Value::Array(list)).await
    }

    /// Stamp install metadata; `installedAt` is only set once
    pub async fn record_install(&self, source: &str, now: f64) -> bool {
        let mut partial = Record::new();
        if self.get(keys::INSTALLED_AT).await.is_null() {
            partial.insert(keys::INSTALLED_AT.to_string(), json!(now));
        }
        partial.insert(keys::INSTALL_SOURCE.to_string(), json!(source));
        self.set(partial).await
    }

    /// The full defaulted record as one flat JSON object
    pub async fn export_record(&self) -> Value {
        Value::Object(self.get_all().await)
    }

    /// Import canonical keys from a flat object; returns how many were written.
    ///
    /// `schemaVersion`, non-canonical keys and values whose JSON shape differs
    /// from the key's default are skipped. Bounded lists keep their newest
    /// entries. `None` means the write failed.
    pub async fn import_record(&self, data: &Record) -> Option<usize> {
        let mut partial = Record::new();
        for (key, value) in data {
            if key == keys::SCHEMA_VERSION || !schema::is_canonical(key) {
                continue;
            }
            if !schema::conforms(key, value) {
                log::warn!("Skipping imported {}: unexpected value {}", key, value);
                continue;
            }

            let mut value = value.clone();
            if let (Some(cap), Value::Array(list)) = (schema::list_cap(key), &mut value) {
                schema::truncate_oldest(list, cap);
            }
            partial.insert(key.clone(), value);
        }

        let count = partial.len();
        if count == 0 {
            return Some(0);
        }
        self.set(partial).await.then_some(count)
    }
}
