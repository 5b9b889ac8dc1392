/// Cookie Steward - background core of a cookie manager extension
/// Built with Rust + WASM

pub mod cookie_data;
pub mod cookie_store;
pub mod diagnostics;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod growth;
pub mod migrations;
pub mod operations;
pub mod rate_limit;
pub mod schema;
pub mod settings;
pub mod storage;
pub mod store;
pub mod time;
pub mod validator;

use cookie_store::ChromeCookies;
use dispatcher::{Dispatcher, DispatcherConfig};
use std::cell::RefCell;
use std::rc::Rc;
use storage::ChromeStorage;
use store::SchemaStore;
use wasm_bindgen::prelude::*;

type Background = Dispatcher<ChromeStorage, ChromeCookies>;

thread_local! {
    static BACKGROUND: RefCell<Option<Rc<Background>>> = const { RefCell::new(None) };
}

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

fn background() -> Result<Rc<Background>, JsValue> {
    BACKGROUND
        .with(|slot| slot.borrow().clone())
        .ok_or_else(|| JsValue::from_str("Background not initialized"))
}

/// Create the dispatcher for this extension id; must run before any message
#[wasm_bindgen]
pub fn init_background(extension_id: &str) {
    let dispatcher = Dispatcher::new(
        DispatcherConfig::for_extension(extension_id),
        SchemaStore::new(ChromeStorage::new()),
        ChromeCookies::new(),
    );
    BACKGROUND.with(|slot| *slot.borrow_mut() = Some(Rc::new(dispatcher)));
    log::info!("Background initialized for {}", extension_id);
}

/// Run schema migrations; resolves to the migration report
#[wasm_bindgen]
pub async fn startup() -> Result<JsValue, JsValue> {
    let report = background()?.startup().await;
    storage::to_js(&report).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// runtime.onInstalled hook
#[wasm_bindgen]
pub async fn on_installed(reason: String) -> Result<bool, JsValue> {
    Ok(background()?.on_installed(&reason).await)
}

/// runtime.onMessage entry point; always resolves to a response object
#[wasm_bindgen]
pub async fn handle_message(envelope: JsValue, sender: JsValue) -> Result<JsValue, JsValue> {
    let dispatcher = background()?;
    let envelope: serde_json::Value = serde_wasm_bindgen::from_value(envelope).unwrap_or_default();
    let sender: serde_json::Value = serde_wasm_bindgen::from_value(sender).unwrap_or_default();

    let response = dispatcher.handle(&envelope, &sender).await;
    storage::to_js(&response).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen]
pub fn is_valid_action(action: &str) -> bool {
    validator::is_valid_action(action)
}

/// The action whitelist with declared field names
#[wasm_bindgen]
pub fn allowed_actions() -> Result<JsValue, JsValue> {
    storage::to_js(&validator::allowed_actions()).map_err(|e| JsValue::from_str(&e.to_string()))
}
