// chrome.storage.local bindings

use super::StorageArea;
use crate::error::StoreError;
use crate::schema::Record;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = get)]
    fn storage_get(keys: JsValue) -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = set)]
    fn storage_set(items: JsValue) -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = remove)]
    fn storage_remove(keys: JsValue) -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = clear)]
    fn storage_clear() -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = getBytesInUse)]
    fn storage_get_bytes_in_use(keys: JsValue) -> js_sys::Promise;
}

/// `chrome.storage.local` as a [`StorageArea`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeStorage;

impl ChromeStorage {
    pub fn new() -> Self {
        ChromeStorage
    }
}

fn keys_to_js(keys: Option<&[&str]>) -> JsValue {
    match keys {
        None => JsValue::NULL,
        Some(keys) => {
            let array = js_sys::Array::new();
            for key in keys {
                array.push(&JsValue::from_str(key));
            }
            array.into()
        }
    }
}

fn backend_error(e: JsValue) -> StoreError {
    let message = e
        .as_string()
        .or_else(|| {
            js_sys::Reflect::get(&e, &"message".into())
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{:?}", e));

    if message.contains("QUOTA_BYTES") {
        StoreError::QuotaExceeded
    } else {
        StoreError::Backend(message)
    }
}

pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
}

impl StorageArea for ChromeStorage {
    async fn get(&self, keys: Option<&[&str]>) -> Result<Record, StoreError> {
        let result = JsFuture::from(storage_get(keys_to_js(keys)))
            .await
            .map_err(backend_error)?;

        let value: Value = serde_wasm_bindgen::from_value(result)
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        match value {
            Value::Object(record) => Ok(record),
            Value::Null => Ok(Record::new()),
            other => Err(StoreError::Decode(format!("expected object, got {}", other))),
        }
    }

    async fn set(&self, items: Record) -> Result<(), StoreError> {
        let js_items = to_js(&items).map_err(|e| StoreError::Decode(e.to_string()))?;
        JsFuture::from(storage_set(js_items))
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        JsFuture::from(storage_remove(keys_to_js(Some(keys))))
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        JsFuture::from(storage_clear()).await.map_err(backend_error)?;
        Ok(())
    }

    async fn get_bytes_in_use(&self, keys: Option<&[&str]>) -> Result<u64, StoreError> {
        let result = JsFuture::from(storage_get_bytes_in_use(keys_to_js(keys)))
            .await
            .map_err(backend_error)?;

        result
            .as_f64()
            .map(|bytes| bytes.max(0.0) as u64)
            .ok_or_else(|| StoreError::Decode("getBytesInUse did not return a number".to_string()))
    }
}
