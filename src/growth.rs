/// Usage counters, milestones, churn heuristics and retention prompts
use crate::schema::{self, Record, USAGE_KINDS, keys};
use crate::time::{MS_PER_DAY, day_number};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Usage-related keys decoded from the persisted record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageSnapshot {
    pub total_operations: u64,
    pub action_counts: BTreeMap<String, u64>,
    pub milestones: BTreeMap<String, f64>,
    pub dismissed: Vec<String>,
    pub last_active_at: Option<f64>,
    pub active_days: Vec<i64>,
    pub installed_at: Option<f64>,
}

impl UsageSnapshot {
    /// Decode leniently: malformed entries are skipped, not fatal
    pub fn from_record(record: &Record) -> UsageSnapshot {
        let number_map = |key: &str| -> Map<String, Value> {
            match record.get(key) {
                Some(Value::Object(map)) => map.clone(),
                _ => Map::new(),
            }
        };

        UsageSnapshot {
            total_operations: record
                .get(keys::TOTAL_OPERATIONS)
                .and_then(Value::as_u64)
                .unwrap_or(0),
            action_counts: number_map(keys::ACTION_COUNTS)
                .into_iter()
                .filter_map(|(k, v)| v.as_u64().map(|n| (k, n)))
                .collect(),
            milestones: number_map(keys::MILESTONES)
                .into_iter()
                .filter_map(|(k, v)| v.as_f64().map(|ts| (k, ts)))
                .collect(),
            dismissed: record
                .get(keys::DISMISSED_TRIGGERS)
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
            last_active_at: record.get(keys::LAST_ACTIVE_AT).and_then(Value::as_f64),
            active_days: record
                .get(keys::ACTIVE_DAYS)
                .and_then(Value::as_array)
                .map(|days| days.iter().filter_map(Value::as_i64).collect())
                .unwrap_or_default(),
            installed_at: record.get(keys::INSTALLED_AT).and_then(Value::as_f64),
        }
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.action_counts.get(kind).copied().unwrap_or(0)
    }

    fn days_since(&self, since: Option<f64>, now: f64) -> Option<f64> {
        since.map(|ts| ((now - ts) / MS_PER_DAY).max(0.0))
    }
}

struct MilestoneRule {
    id: &'static str,
    reached: fn(&UsageSnapshot) -> bool,
}

const MILESTONE_RULES: [MilestoneRule; 8] = [
    MilestoneRule { id: "first_action", reached: |u| u.total_operations >= 1 },
    MilestoneRule { id: "ops_10", reached: |u| u.total_operations >= 10 },
    MilestoneRule { id: "ops_50", reached: |u| u.total_operations >= 50 },
    MilestoneRule { id: "ops_100", reached: |u| u.total_operations >= 100 },
    MilestoneRule { id: "ops_500", reached: |u| u.total_operations >= 500 },
    MilestoneRule { id: "first_export", reached: |u| u.count("export") >= 1 },
    MilestoneRule { id: "first_jwt_decode", reached: |u| u.count("jwtDecode") >= 1 },
    MilestoneRule { id: "power_editor", reached: |u| u.count("edit") >= 25 },
];

/// Partial record to persist plus milestones first reached by this call
#[derive(Debug, Clone, PartialEq)]
pub struct UsageUpdate {
    pub partial: Record,
    pub new_milestones: Vec<String>,
}

/// Count one operation of `kind` at `now`.
///
/// Unknown kinds still count toward the total.
pub fn record_usage(record: &Record, kind: &str, now: f64) -> UsageUpdate {
    let mut usage = UsageSnapshot::from_record(record);

    usage.total_operations += 1;
    if USAGE_KINDS.contains(&kind) {
        *usage.action_counts.entry(kind.to_string()).or_insert(0) += 1;
    }
    usage.last_active_at = Some(now);

    let today = day_number(now);
    if usage.active_days.last() != Some(&today) {
        usage.active_days.push(today);
    }

    let mut new_milestones = Vec::new();
    for rule in &MILESTONE_RULES {
        if !usage.milestones.contains_key(rule.id) && (rule.reached)(&usage) {
            usage.milestones.insert(rule.id.to_string(), now);
            new_milestones.push(rule.id.to_string());
        }
    }

    let mut active_days: Vec<Value> = usage.active_days.iter().map(|d| json!(d)).collect();
    if let Some(cap) = schema::list_cap(keys::ACTIVE_DAYS) {
        schema::truncate_oldest(&mut active_days, cap);
    }

    let mut partial = Record::new();
    partial.insert(keys::TOTAL_OPERATIONS.to_string(), json!(usage.total_operations));
    partial.insert(keys::ACTION_COUNTS.to_string(), json!(usage.action_counts));
    partial.insert(keys::MILESTONES.to_string(), json!(usage.milestones));
    partial.insert(keys::LAST_ACTIVE_AT.to_string(), json!(now));
    partial.insert(keys::ACTIVE_DAYS.to_string(), Value::Array(active_days));

    if !new_milestones.is_empty() {
        log::info!("Milestones reached: {}", new_milestones.join(", "));
    }

    UsageUpdate {
        partial,
        new_milestones,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneEntry {
    pub id: &'static str,
    pub reached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reached_at: Option<f64>,
}

pub fn milestones(usage: &UsageSnapshot) -> Vec<MilestoneEntry> {
    MILESTONE_RULES
        .iter()
        .map(|rule| {
            let reached_at = usage.milestones.get(rule.id).copied();
            MilestoneEntry {
                id: rule.id,
                reached: reached_at.is_some(),
                reached_at,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChurnStatus {
    New,
    Active,
    Cooling,
    AtRisk,
    Churned,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChurnReport {
    pub status: ChurnStatus,
    pub days_inactive: Option<f64>,
}

pub fn churn_status(usage: &UsageSnapshot, now: f64) -> ChurnReport {
    let days_inactive = usage.days_since(usage.last_active_at, now);
    let status = match days_inactive {
        None => ChurnStatus::New,
        Some(days) if days < 3.0 => ChurnStatus::Active,
        Some(days) if days < 7.0 => ChurnStatus::Cooling,
        Some(days) if days < 14.0 => ChurnStatus::AtRisk,
        Some(_) => ChurnStatus::Churned,
    };
    ChurnReport {
        status,
        days_inactive: days_inactive.map(|d| d.floor()),
    }
}

/// 0–100 blend of volume, recency, breadth and milestones
pub fn engagement_score(usage: &UsageSnapshot, now: f64) -> u32 {
    let volume = usage.total_operations.min(100) as f64 / 100.0;

    let today = day_number(now);
    let recent_days = usage
        .active_days
        .iter()
        .filter(|&&day| day <= today && today - day < 30)
        .count()
        .min(30) as f64
        / 30.0;

    let breadth = USAGE_KINDS.iter().filter(|kind| usage.count(kind) > 0).count() as f64
        / USAGE_KINDS.len() as f64;

    let reached = MILESTONE_RULES
        .iter()
        .filter(|rule| usage.milestones.contains_key(rule.id))
        .count() as f64
        / MILESTONE_RULES.len() as f64;

    let score = 40.0 * volume + 30.0 * recent_days + 20.0 * breadth + 10.0 * reached;
    score.round().clamp(0.0, 100.0) as u32
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthStats {
    pub total_operations: u64,
    pub action_counts: BTreeMap<String, u64>,
    pub days_since_install: Option<f64>,
    pub active_day_count: usize,
    pub milestones_reached: usize,
    pub milestones_total: usize,
}

pub fn growth_stats(usage: &UsageSnapshot, now: f64) -> GrowthStats {
    GrowthStats {
        total_operations: usage.total_operations,
        action_counts: usage.action_counts.clone(),
        days_since_install: usage.days_since(usage.installed_at, now).map(|d| d.floor()),
        active_day_count: usage.active_days.len(),
        milestones_reached: MILESTONE_RULES
            .iter()
            .filter(|rule| usage.milestones.contains_key(rule.id))
            .count(),
        milestones_total: MILESTONE_RULES.len(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionTrigger {
    pub id: &'static str,
    pub reason: &'static str,
}

/// First prompt whose condition holds and that the user has not dismissed
pub fn retention_trigger(usage: &UsageSnapshot, now: f64) -> Option<RetentionTrigger> {
    let churn = churn_status(usage, now).status;
    let installed_days = usage.days_since(usage.installed_at, now).unwrap_or(0.0);

    let candidates = [
        RetentionTrigger {
            id: "welcome_back",
            reason: "returning after a long break",
        },
        RetentionTrigger {
            id: "rate_prompt",
            reason: "steady usage since install",
        },
        RetentionTrigger {
            id: "try_export",
            reason: "export has not been used",
        },
        RetentionTrigger {
            id: "try_jwt_decode",
            reason: "JWT decoding has not been used",
        },
    ];

    candidates.into_iter().find(|trigger| {
        if usage.dismissed.iter().any(|d| d == trigger.id) {
            return false;
        }
        match trigger.id {
            "welcome_back" => matches!(churn, ChurnStatus::AtRisk | ChurnStatus::Churned),
            "rate_prompt" => usage.total_operations >= 25 && installed_days >= 3.0,
            "try_export" => usage.total_operations >= 10 && usage.count("export") == 0,
            "try_jwt_decode" => usage.total_operations >= 20 && usage.count("jwtDecode") == 0,
            _ => false,
        }
    })
}

/// Dismissed list with `id` added, or `None` if it is already there
pub fn dismiss_trigger(usage: &UsageSnapshot, id: &str) -> Option<Vec<String>> {
    if usage.dismissed.iter().any(|d| d == id) {
        return None;
    }
    let mut dismissed = usage.dismissed.clone();
    dismissed.push(id.to_string());
    Some(dismissed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: f64 = MS_PER_DAY;

    fn apply(record: &mut Record, update: &UsageUpdate) {
        for (k, v) in &update.partial {
            record.insert(k.clone(), v.clone());
        }
    }

    #[test]
    fn test_record_usage_counts_and_milestones() {
        let mut record = schema::defaults();

        let update = record_usage(&record, "export", 10.0 * DAY);
        apply(&mut record, &update);

        assert_eq!(record[keys::TOTAL_OPERATIONS], json!(1));
        assert_eq!(record[keys::ACTION_COUNTS]["export"], json!(1));
        assert_eq!(record[keys::ACTION_COUNTS]["edit"], json!(0));
        assert_eq!(update.new_milestones, vec!["first_action", "first_export"]);
        assert_eq!(record[keys::LAST_ACTIVE_AT], json!(10.0 * DAY));
        assert_eq!(record[keys::ACTIVE_DAYS], json!([10]));
    }

    #[test]
    fn test_record_usage_milestones_only_once() {
        let mut record = schema::defaults();
        let first = record_usage(&record, "edit", DAY);
        apply(&mut record, &first);

        let second = record_usage(&record, "edit", DAY + 1.0);

        assert!(second.new_milestones.is_empty());
    }

    #[test]
    fn test_record_usage_unknown_kind_counts_total_only() {
        let record = schema::defaults();

        let update = record_usage(&record, "teleport", DAY);

        assert_eq!(update.partial[keys::TOTAL_OPERATIONS], json!(1));
        assert!(update.partial[keys::ACTION_COUNTS].get("teleport").is_none());
    }

    #[test]
    fn test_active_days_recorded_once_per_day() {
        let mut record = schema::defaults();
        for ts in [DAY, DAY + 100.0, 2.0 * DAY] {
            let update = record_usage(&record, "edit", ts);
            apply(&mut record, &update);
        }

        assert_eq!(record[keys::ACTIVE_DAYS], json!([1, 2]));
    }

    #[test]
    fn test_churn_status_thresholds() {
        let mut usage = UsageSnapshot::default();
        assert_eq!(churn_status(&usage, 0.0).status, ChurnStatus::New);

        usage.last_active_at = Some(0.0);
        assert_eq!(churn_status(&usage, 2.0 * DAY).status, ChurnStatus::Active);
        assert_eq!(churn_status(&usage, 3.0 * DAY).status, ChurnStatus::Cooling);
        assert_eq!(churn_status(&usage, 7.0 * DAY).status, ChurnStatus::AtRisk);
        assert_eq!(churn_status(&usage, 14.0 * DAY).status, ChurnStatus::Churned);
        assert_eq!(churn_status(&usage, 14.5 * DAY).days_inactive, Some(14.0));
    }

    #[test]
    fn test_engagement_score_bounds() {
        let empty = UsageSnapshot::default();
        assert_eq!(engagement_score(&empty, 0.0), 0);

        let mut full = UsageSnapshot {
            total_operations: 1000,
            active_days: (0..30).collect(),
            ..UsageSnapshot::default()
        };
        for kind in USAGE_KINDS {
            full.action_counts.insert(kind.to_string(), 100);
        }
        for id in MILESTONE_RULES.iter().map(|rule| rule.id) {
            full.milestones.insert(id.to_string(), 0.0);
        }

        assert_eq!(engagement_score(&full, 29.0 * DAY), 100);
    }

    #[test]
    fn test_engagement_score_partial() {
        let mut usage = UsageSnapshot {
            total_operations: 50,
            active_days: vec![0],
            ..UsageSnapshot::default()
        };
        usage.action_counts.insert("edit".to_string(), 50);

        // 40*0.5 + 30*(1/30) + 20*(1/5) + 0
        assert_eq!(engagement_score(&usage, 0.0), 25);
    }

    #[test]
    fn test_retention_trigger_order_and_dismissal() {
        let mut usage = UsageSnapshot {
            total_operations: 30,
            installed_at: Some(0.0),
            last_active_at: Some(10.0 * DAY),
            ..UsageSnapshot::default()
        };

        let first = retention_trigger(&usage, 10.0 * DAY).unwrap();
        assert_eq!(first.id, "rate_prompt");

        usage.dismissed.push("rate_prompt".to_string());
        let next = retention_trigger(&usage, 10.0 * DAY).unwrap();
        assert_eq!(next.id, "try_export");
    }

    #[test]
    fn test_retention_trigger_welcome_back() {
        let usage = UsageSnapshot {
            last_active_at: Some(0.0),
            ..UsageSnapshot::default()
        };

        assert_eq!(retention_trigger(&usage, 20.0 * DAY).map(|t| t.id), Some("welcome_back"));
        assert_eq!(retention_trigger(&usage, DAY), None);
    }

    #[test]
    fn test_dismiss_trigger_dedupes() {
        let mut usage = UsageSnapshot::default();

        let dismissed = dismiss_trigger(&usage, "rate_prompt").unwrap();
        usage.dismissed = dismissed;

        assert_eq!(dismiss_trigger(&usage, "rate_prompt"), None);
    }

    #[test]
    fn test_snapshot_tolerates_malformed_record() {
        let mut record = schema::defaults();
        record.insert(keys::ACTION_COUNTS.to_string(), json!("nope"));
        record.insert(keys::ACTIVE_DAYS.to_string(), json!([1, "x", 3]));

        let usage = UsageSnapshot::from_record(&record);

        assert!(usage.action_counts.is_empty());
        assert_eq!(usage.active_days, vec![1, 3]);
    }
}
