// Browser cookie store contract and its chrome.cookies binding

use crate::cookie_data::{Cookie, CookieDetails};
use crate::storage::to_js;
use serde_json::json;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["chrome", "cookies"], js_name = getAll)]
    fn cookies_get_all(details: JsValue) -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "cookies"], js_name = set)]
    fn cookies_set(details: JsValue) -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "cookies"], js_name = remove)]
    fn cookies_remove(details: JsValue) -> js_sys::Promise;
}

/// Contract of the browser's cookie jar
#[allow(async_fn_in_trait)]
pub trait CookieStore {
    /// Cookies on `domain` or any of its subdomains
    async fn get_all(&self, domain: &str) -> Result<Vec<Cookie>, String>;

    /// Cookies a request to `url` would carry, parent-domain cookies included
    async fn get_all_for_url(&self, url: &str) -> Result<Vec<Cookie>, String>;

    async fn set(&self, details: &CookieDetails) -> Result<Cookie, String>;

    /// Returns whether a cookie was removed
    async fn remove(&self, url: &str, name: &str) -> Result<bool, String>;
}

/// `chrome.cookies` as a [`CookieStore`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeCookies;

impl ChromeCookies {
    pub fn new() -> Self {
        ChromeCookies
    }
}

fn js_error(e: JsValue) -> String {
    e.as_string()
        .or_else(|| {
            js_sys::Reflect::get(&e, &"message".into())
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{:?}", e))
}

async fn call(promise: js_sys::Promise) -> Result<JsValue, String> {
    JsFuture::from(promise).await.map_err(js_error)
}

fn args(value: serde_json::Value) -> Result<JsValue, String> {
    to_js(&value).map_err(|e| e.to_string())
}

fn decode<T: serde::de::DeserializeOwned>(value: JsValue) -> Result<T, String> {
    serde_wasm_bindgen::from_value(value).map_err(|e| format!("Failed to parse cookie: {}", e))
}

impl CookieStore for ChromeCookies {
    async fn get_all(&self, domain: &str) -> Result<Vec<Cookie>, String> {
        let result = call(cookies_get_all(args(json!({ "domain": domain }))?)).await?;
        decode(result)
    }

    async fn get_all_for_url(&self, url: &str) -> Result<Vec<Cookie>, String> {
        let result = call(cookies_get_all(args(json!({ "url": url }))?)).await?;
        decode(result)
    }

    async fn set(&self, details: &CookieDetails) -> Result<Cookie, String> {
        let js_details = to_js(details).map_err(|e| e.to_string())?;
        let result = call(cookies_set(js_details)).await?;
        if result.is_null() || result.is_undefined() {
            return Err(format!("Browser rejected cookie {}", details.name));
        }
        decode(result)
    }

    async fn remove(&self, url: &str, name: &str) -> Result<bool, String> {
        let result = call(cookies_remove(args(json!({ "url": url, "name": name }))?)).await?;
        Ok(!(result.is_null() || result.is_undefined()))
    }
}
