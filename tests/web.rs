//! Browser-side checks, run with `wasm-pack test --headless --chrome`
#![cfg(target_arch = "wasm32")]

use cookie_steward::schema::{self, keys};
use cookie_steward::storage::MemoryStorage;
use cookie_steward::store::SchemaStore;
use cookie_steward::{time, validator};
use serde_json::json;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn test_clock_reads_browser_time() {
    assert!(time::now_ms() > 1_600_000_000_000.0);
}

#[wasm_bindgen_test]
fn test_whitelist_is_exposed() {
    assert!(cookie_steward::is_valid_action("GET_COOKIES"));
    assert!(!cookie_steward::is_valid_action("EVAL"));
    assert_eq!(validator::allowed_actions().len(), validator::ACTIONS.len());
}

#[wasm_bindgen_test]
async fn test_store_migrates_under_wasm() {
    let store = SchemaStore::new(MemoryStorage::new());

    let report = store.migrate().await;

    assert!(report.migrated);
    assert_eq!(report.to, schema::SCHEMA_VERSION);
    assert_eq!(store.get(keys::THEME).await, json!("system"));
}
