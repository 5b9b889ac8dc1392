/// Background message dispatcher: trust check, validation, throttling, routing
use crate::cookie_data::CookieDetails;
use crate::cookie_store::CookieStore;
use crate::diagnostics::{self, ErrorLogEntry};
use crate::domain;
use crate::error::DispatchError;
use crate::growth::{self, UsageSnapshot};
use crate::operations::{self, ExportFormat};
use crate::rate_limit::{DEFAULT_MAX_COUNT, DEFAULT_WINDOW_MS, RateLimiter};
use crate::schema::{self, Record, keys};
use crate::settings::{self, Settings};
use crate::storage::StorageArea;
use crate::store::{MigrationReport, SchemaStore};
use crate::time::now_ms;
use crate::validator;
use serde_json::{Map, Value, json};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

const DEBUG_LOG_CAP: usize = 200;
const REJECTED_ACTION: &str = "<rejected>";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Runtime id of this extension; senders must match it
    pub extension_id: String,
    pub rate_window_ms: f64,
    pub rate_max_count: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            extension_id: String::new(),
            rate_window_ms: DEFAULT_WINDOW_MS,
            rate_max_count: DEFAULT_MAX_COUNT,
        }
    }
}

impl DispatcherConfig {
    pub fn for_extension(extension_id: impl Into<String>) -> Self {
        DispatcherConfig {
            extension_id: extension_id.into(),
            ..Self::default()
        }
    }
}

type Payload = Map<String, Value>;

/// Owns the schema store, the cookie jar and the per-process limiter.
///
/// Interior state lives in `Cell`/`RefCell` and is never borrowed across
/// an `.await`.
pub struct Dispatcher<S, C> {
    config: DispatcherConfig,
    store: SchemaStore<S>,
    cookies: C,
    limiter: RefCell<RateLimiter>,
    debug_log: RefCell<VecDeque<Value>>,
    debug_mode: Cell<bool>,
}

impl<S: StorageArea, C: CookieStore> Dispatcher<S, C> {
    pub fn new(config: DispatcherConfig, store: SchemaStore<S>, cookies: C) -> Self {
        Dispatcher {
            config,
            store,
            cookies,
            limiter: RefCell::new(RateLimiter::new()),
            debug_log: RefCell::new(VecDeque::new()),
            debug_mode: Cell::new(false),
        }
    }

    pub fn store(&self) -> &SchemaStore<S> {
        &self.store
    }

    pub fn cookies(&self) -> &C {
        &self.cookies
    }

    /// Run pending migrations and record how long startup took
    pub async fn startup(&self) -> MigrationReport {
        let started = now_ms();
        let report = self.store.migrate().await;

        self.debug_mode
            .set(self.store.get(keys::DEBUG_MODE).await.as_bool().unwrap_or(false));

        let finished = now_ms();
        let sample = diagnostics::timing_sample((finished - started).max(0.0), finished);
        if !self.store.append_bounded(keys::STARTUP_HISTORY, sample).await {
            log::warn!("Failed to record startup timing");
        }

        log::info!(
            "Background ready (schema v{} -> v{}, migrated: {})",
            report.from,
            report.to,
            report.migrated
        );
        report
    }

    /// runtime.onInstalled hook.
    ///
    /// Only "install" and "update" describe how this extension arrived;
    /// browser or shared-module updates leave the install metadata alone.
    /// Returns whether metadata was written.
    pub async fn on_installed(&self, reason: &str) -> bool {
        if !matches!(reason, "install" | "update") {
            log::debug!("Ignoring onInstalled reason {}", reason);
            return false;
        }
        self.store.record_install(reason, now_ms()).await
    }

    pub async fn handle(&self, envelope: &Value, sender: &Value) -> Value {
        self.handle_at(envelope, sender, now_ms()).await
    }

    /// Handle one message at a given clock reading.
    ///
    /// Always returns `{success, data}` or `{success: false, error}`.
    pub async fn handle_at(&self, envelope: &Value, sender: &Value, now: f64) -> Value {
        let result = self.dispatch(envelope, sender, now).await;

        // Untrusted senders leave no trace; unlisted actions are not echoed
        let trusted = !matches!(result, Err(DispatchError::Unauthorized));
        if self.debug_mode.get() && trusted {
            let action = envelope
                .get("action")
                .and_then(Value::as_str)
                .filter(|action| validator::is_valid_action(action))
                .unwrap_or(REJECTED_ACTION);
            self.push_debug(json!({
                "action": action,
                "timestamp": now,
                "success": result.is_ok(),
            }));
        }

        match result {
            Ok(data) => json!({ "success": true, "data": data }),
            Err(e) => error_response(&e),
        }
    }

    fn push_debug(&self, entry: Value) {
        let mut log = self.debug_log.borrow_mut();
        log.push_back(entry);
        while log.len() > DEBUG_LOG_CAP {
            log.pop_front();
        }
    }

    async fn dispatch(&self, envelope: &Value, sender: &Value, now: f64) -> Result<Value, DispatchError> {
        if !validator::is_internal_sender(sender, &self.config.extension_id) {
            log::warn!("Rejected message from untrusted sender");
            return Err(DispatchError::Unauthorized);
        }

        let verdict = validator::validate_message(envelope);
        if !verdict.valid {
            log::debug!("Invalid message: {}", verdict.errors.join("; "));
            return Err(DispatchError::Invalid(verdict.errors));
        }

        let action = envelope
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| DispatchError::Invalid(vec!["Missing or invalid action".to_string()]))?;

        let decision = self.limiter.borrow_mut().check_at(
            action,
            now,
            self.config.rate_window_ms,
            self.config.rate_max_count,
        );
        if !decision.allowed {
            log::warn!("Rate limit exceeded for {}", action);
            return Err(DispatchError::RateLimited);
        }

        let payload = validator::sanitize_payload(action, envelope.get("payload").unwrap_or(&Value::Null))
            .unwrap_or_default();

        log::debug!("Dispatching {}", action);
        self.route(action, &payload, envelope, now).await
    }

    async fn route(
        &self,
        action: &str,
        payload: &Payload,
        envelope: &Value,
        now: f64,
    ) -> Result<Value, DispatchError> {
        match action {
            "GET_COOKIES" => self.get_cookies(payload).await,
            "SET_COOKIE" => self.set_cookie(payload).await,
            "DELETE_COOKIE" => self.delete_cookie(payload).await,
            "CLEAR_DOMAIN" => self.clear_domain(payload).await,
            "EXPORT_COOKIES" => self.export_cookies(payload).await,
            "GET_SETTINGS" => Ok(json!(self.settings().await)),
            "UPDATE_SETTINGS" => self.update_settings(payload).await,

            "REPORT_ERROR" => self.report_error(envelope, now).await,
            "REPORT_ERRORS_BATCH" => self.report_errors_batch(envelope, now).await,
            "GET_ERROR_LOGS" => Ok(self.store.get(keys::ERROR_LOGS).await),
            "CLEAR_ERROR_LOGS" => {
                self.write(keys::ERROR_LOGS, json!([])).await?;
                Ok(json!({ "cleared": true }))
            }
            "GET_DEBUG_LOGS" => {
                let entries: Vec<Value> = self.debug_log.borrow().iter().cloned().collect();
                Ok(json!({ "debugMode": self.debug_mode.get(), "entries": entries }))
            }
            "GET_HEALTH_REPORT" => {
                let record = self.store.get_all().await;
                let quota = self.store.quota_info().await;
                Ok(json!(diagnostics::health_report(&record, quota, now)))
            }
            "TOGGLE_DEBUG_MODE" => self.toggle_debug_mode(payload).await,

            "GET_MILESTONES" => Ok(json!(growth::milestones(&self.usage().await))),
            "GET_GROWTH_STATS" => Ok(json!(growth::growth_stats(&self.usage().await, now))),
            "GET_CHURN_STATUS" => Ok(json!(growth::churn_status(&self.usage().await, now))),
            "GET_ENGAGEMENT_SCORE" => {
                Ok(json!({ "score": growth::engagement_score(&self.usage().await, now) }))
            }
            "GET_RETENTION_TRIGGER" => {
                Ok(json!({ "trigger": growth::retention_trigger(&self.usage().await, now) }))
            }
            "RECORD_USAGE" => self.record_usage(payload, now).await,
            "DISMISS_TRIGGER" => self.dismiss_trigger(payload).await,

            "GET_STORAGE_QUOTA" => Ok(json!(self.store.quota_info().await)),
            "EXPORT_DATA" => Ok(self.store.export_record().await),
            "IMPORT_DATA" => self.import_data(payload).await,
            "RESET_DATA" => {
                if !self.store.reset().await {
                    return Err(DispatchError::Storage);
                }
                self.debug_mode.set(false);
                Ok(json!({ "reset": true }))
            }
            "COMPLETE_ONBOARDING" => {
                self.write(keys::ONBOARDING_COMPLETE, json!(true)).await?;
                Ok(json!({ "onboardingComplete": true }))
            }
            "TRACK_EVENT" => {
                let name = text(payload, "name");
                if name.is_empty() {
                    return Err(invalid("name", "must not be empty"));
                }
                let properties = payload.get("properties").and_then(Value::as_object);
                let event = diagnostics::analytics_event(&name, properties, now);
                self.append(keys::ANALYTICS_EVENTS, vec![event]).await?;
                Ok(json!({ "tracked": name }))
            }
            "RECORD_POPUP_LOAD" => {
                let duration = payload
                    .get("durationMs")
                    .and_then(Value::as_f64)
                    .filter(|d| *d >= 0.0)
                    .ok_or_else(|| invalid("durationMs", "must be a non-negative number"))?;
                let sample = diagnostics::timing_sample(duration, now);
                self.append(keys::POPUP_LOAD_TIMES, vec![sample]).await?;
                Ok(json!({ "recorded": duration }))
            }
            other => Err(DispatchError::Invalid(vec![format!("Unknown action: {}", other)])),
        }
    }

    async fn settings(&self) -> Settings {
        Settings::from_record(&self.store.get_all().await)
    }

    async fn usage(&self) -> UsageSnapshot {
        UsageSnapshot::from_record(&self.store.get_all().await)
    }

    async fn write(&self, key: &str, value: Value) -> Result<(), DispatchError> {
        if self.store.set_value(key, value).await {
            Ok(())
        } else {
            Err(DispatchError::Storage)
        }
    }

    async fn append(&self, key: &str, entries: Vec<Value>) -> Result<(), DispatchError> {
        if self.store.append_many(key, entries).await {
            Ok(())
        } else {
            Err(DispatchError::Storage)
        }
    }

    // Read-only mode and protected domains gate every cookie mutation
    fn guard_mutation(settings: &Settings, cookie_domain: &str) -> Result<(), DispatchError> {
        if settings.read_only_mode {
            return Err(DispatchError::ReadOnly);
        }
        if let Some(protected) = settings.protection_for(cookie_domain) {
            return Err(DispatchError::ProtectedDomain(protected.to_string()));
        }
        Ok(())
    }

    async fn get_cookies(&self, payload: &Payload) -> Result<Value, DispatchError> {
        let url = text(payload, "url");
        let host = domain::host_from_url(&url).ok_or_else(|| DispatchError::InvalidUrl(url.clone()))?;

        let settings = self.settings().await;
        let cookies = self
            .cookies
            .get_all_for_url(&url)
            .await
            .map_err(DispatchError::Cookie)?;

        let mut visible = operations::filter_visible(cookies, settings.visibility());
        operations::sort_cookies(&mut visible, settings.sort_field, settings.sort_direction);

        Ok(json!({ "domain": host, "cookies": visible }))
    }

    async fn set_cookie(&self, payload: &Payload) -> Result<Value, DispatchError> {
        let details = CookieDetails::from_payload(payload)?;
        let settings = self.settings().await;
        Self::guard_mutation(&settings, &details.target_domain())?;

        let cookie = self
            .cookies
            .set(&details)
            .await
            .map_err(DispatchError::Cookie)?;
        Ok(json!(cookie))
    }

    async fn delete_cookie(&self, payload: &Payload) -> Result<Value, DispatchError> {
        let url = text(payload, "url");
        let name = text(payload, "name");
        let host = domain::host_from_url(&url).ok_or_else(|| DispatchError::InvalidUrl(url.clone()))?;

        let settings = self.settings().await;
        Self::guard_mutation(&settings, &host)?;

        let removed = self
            .cookies
            .remove(&url, &name)
            .await
            .map_err(DispatchError::Cookie)?;
        Ok(json!({ "removed": removed }))
    }

    async fn clear_domain(&self, payload: &Payload) -> Result<Value, DispatchError> {
        let target = domain::normalize_domain(&text(payload, "domain"));
        if target.is_empty() {
            return Err(invalid("domain", "must not be empty"));
        }

        let settings = self.settings().await;
        Self::guard_mutation(&settings, &target)?;

        let cookies = self
            .cookies
            .get_all(&target)
            .await
            .map_err(DispatchError::Cookie)?;

        let mut removed = 0;
        let mut failed = 0;
        for cookie in &cookies {
            match self.cookies.remove(&cookie.url(), &cookie.name).await {
                Ok(true) => removed += 1,
                Ok(false) => failed += 1,
                Err(e) => {
                    log::warn!("Failed to remove {} on {}: {}", cookie.name, cookie.domain, e);
                    failed += 1;
                }
            }
        }

        Ok(json!({ "domain": target, "removed": removed, "failed": failed }))
    }

    async fn export_cookies(&self, payload: &Payload) -> Result<Value, DispatchError> {
        let target = domain::normalize_domain(&text(payload, "domain"));
        if target.is_empty() {
            return Err(invalid("domain", "must not be empty"));
        }

        let settings = self.settings().await;
        let format = match payload.get("format").and_then(Value::as_str) {
            Some(raw) if !raw.is_empty() => raw
                .parse::<ExportFormat>()
                .map_err(|reason| invalid("format", &reason))?,
            _ => settings.default_export_format,
        };

        let mut cookies = self
            .cookies
            .get_all(&target)
            .await
            .map_err(DispatchError::Cookie)?;
        operations::sort_cookies(&mut cookies, settings.sort_field, settings.sort_direction);

        let content = operations::export_cookies(&cookies, format)
            .map_err(|e| invalid("cookies", &e.to_string()))?;

        Ok(json!({
            "format": format,
            "count": cookies.len(),
            "filename": format!("cookies-{}.{}", target, format.extension()),
            "mimeType": format.mime_type(),
            "content": content,
        }))
    }

    async fn update_settings(&self, payload: &Payload) -> Result<Value, DispatchError> {
        let update = payload
            .get("settings")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let partial = settings::validate_update(&update).map_err(DispatchError::Invalid)?;

        if !partial.is_empty() && !self.store.set(partial).await {
            return Err(DispatchError::Storage);
        }
        Ok(json!(self.settings().await))
    }

    async fn report_error(&self, envelope: &Value, now: f64) -> Result<Value, DispatchError> {
        let entry = envelope
            .get("error")
            .and_then(|report| ErrorLogEntry::from_report(report, now))
            .ok_or_else(|| invalid("error", "missing message"))?;

        self.append(keys::ERROR_LOGS, vec![entry.to_value()]).await?;
        Ok(json!({ "id": entry.id }))
    }

    async fn report_errors_batch(&self, envelope: &Value, now: f64) -> Result<Value, DispatchError> {
        let reports = envelope
            .get("errors")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let entries: Vec<Value> = reports
            .iter()
            .filter_map(|report| ErrorLogEntry::from_report(report, now))
            .map(|entry| entry.to_value())
            .collect();
        let accepted = entries.len();

        if accepted > 0 {
            self.append(keys::ERROR_LOGS, entries).await?;
        }
        Ok(json!({ "accepted": accepted, "rejected": reports.len() - accepted }))
    }

    async fn toggle_debug_mode(&self, payload: &Payload) -> Result<Value, DispatchError> {
        let enabled = match payload.get("enabled").and_then(Value::as_bool) {
            Some(enabled) => enabled,
            None => !self.store.get(keys::DEBUG_MODE).await.as_bool().unwrap_or(false),
        };

        self.write(keys::DEBUG_MODE, json!(enabled)).await?;
        self.debug_mode.set(enabled);
        log::info!("Debug mode {}", if enabled { "enabled" } else { "disabled" });
        Ok(json!({ "debugMode": enabled }))
    }

    async fn record_usage(&self, payload: &Payload, now: f64) -> Result<Value, DispatchError> {
        let kind = text(payload, "action");
        if kind.is_empty() {
            return Err(invalid("action", "must not be empty"));
        }

        let record = self.store.get_all().await;
        let update = growth::record_usage(&record, &kind, now);
        let total = update.partial.get(keys::TOTAL_OPERATIONS).cloned();

        if !self.store.set(update.partial).await {
            return Err(DispatchError::Storage);
        }
        Ok(json!({
            "totalOperations": total,
            "newMilestones": update.new_milestones,
        }))
    }

    async fn dismiss_trigger(&self, payload: &Payload) -> Result<Value, DispatchError> {
        let id = text(payload, "triggerId");
        if id.is_empty() {
            return Err(invalid("triggerId", "must not be empty"));
        }

        if let Some(dismissed) = growth::dismiss_trigger(&self.usage().await, &id) {
            self.write(keys::DISMISSED_TRIGGERS, json!(dismissed)).await?;
        }
        Ok(json!({ "dismissed": id }))
    }

    async fn import_data(&self, payload: &Payload) -> Result<Value, DispatchError> {
        let data = payload
            .get("data")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        // Settings go through the same checks as UPDATE_SETTINGS
        let (settings_part, rest): (Record, Record) = data
            .into_iter()
            .partition(|(key, _)| schema::SETTINGS_KEYS.contains(&key.as_str()));
        let mut merged = settings::validate_update(&settings_part).map_err(DispatchError::Invalid)?;
        merged.extend(rest);

        let imported = self
            .store
            .import_record(&merged)
            .await
            .ok_or(DispatchError::Storage)?;
        self.debug_mode
            .set(self.store.get(keys::DEBUG_MODE).await.as_bool().unwrap_or(false));
        Ok(json!({ "imported": imported }))
    }
}

fn text(payload: &Payload, field: &str) -> String {
    payload
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn invalid(field: &str, reason: &str) -> DispatchError {
    DispatchError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn error_response(error: &DispatchError) -> Value {
    match error {
        DispatchError::Invalid(errors) => json!({
            "success": false,
            "error": error.to_string(),
            "errors": errors,
        }),
        _ => json!({ "success": false, "error": error.to_string() }),
    }
}
