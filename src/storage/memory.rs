// In-process storage area for native hosts and tests

use super::StorageArea;
use crate::error::StoreError;
use crate::schema::Record;
use std::cell::{Cell, RefCell};

/// Map-backed [`StorageArea`] with switchable failures
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: RefCell<Record>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
    fail_removes: Cell<bool>,
    writes: Cell<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: Record) -> Self {
        let storage = Self::new();
        *storage.data.borrow_mut() = record;
        storage
    }

    /// Make every subsequent read fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    /// Make every subsequent write (set/remove/clear) fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Make only `remove` fail, leaving set/clear working
    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.set(fail);
    }

    /// Number of successful set/remove/clear calls
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    /// Copy of the raw stored record, without defaults
    pub fn snapshot(&self) -> Record {
        self.data.borrow().clone()
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.get() {
            return Err(StoreError::Backend("read failure injected".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.get() {
            return Err(StoreError::Backend("write failure injected".to_string()));
        }
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

impl StorageArea for MemoryStorage {
    async fn get(&self, keys: Option<&[&str]>) -> Result<Record, StoreError> {
        self.check_read()?;
        let data = self.data.borrow();
        let record = match keys {
            None => data.clone(),
            Some(keys) => keys
                .iter()
                .filter_map(|key| data.get(*key).map(|v| (key.to_string(), v.clone())))
                .collect(),
        };
        Ok(record)
    }

    async fn set(&self, items: Record) -> Result<(), StoreError> {
        self.check_write()?;
        let mut data = self.data.borrow_mut();
        for (key, value) in items {
            data.insert(key, value);
        }
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        if self.fail_removes.get() {
            return Err(StoreError::Backend("remove failure injected".to_string()));
        }
        self.check_write()?;
        let mut data = self.data.borrow_mut();
        for key in keys {
            data.remove(*key);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.check_write()?;
        self.data.borrow_mut().clear();
        Ok(())
    }

    async fn get_bytes_in_use(&self, keys: Option<&[&str]>) -> Result<u64, StoreError> {
        self.check_read()?;
        let data = self.data.borrow();
        let bytes = data
            .iter()
            .filter(|(key, _)| keys.map_or(true, |keys| keys.contains(&key.as_str())))
            .map(|(key, value)| key.len() + value.to_string().len())
            .sum::<usize>();
        Ok(bytes as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_set_merges_shallowly() {
        let storage = MemoryStorage::new();
        block_on(storage.set(record(&[("a", json!({"x": 1, "y": 2})), ("b", json!(1))]))).unwrap();
        block_on(storage.set(record(&[("a", json!({"x": 9}))]))).unwrap();

        let stored = storage.snapshot();
        assert_eq!(stored["a"], json!({"x": 9}));
        assert_eq!(stored["b"], json!(1));
    }

    #[test]
    fn test_get_selected_keys() {
        let storage = MemoryStorage::with_record(record(&[("a", json!(1)), ("b", json!(2))]));

        let got = block_on(storage.get(Some(&["a", "missing"][..]))).unwrap();

        assert_eq!(got.len(), 1);
        assert_eq!(got["a"], json!(1));
    }

    #[test]
    fn test_injected_failures() {
        let storage = MemoryStorage::new();
        storage.fail_reads(true);
        storage.fail_writes(true);

        assert!(block_on(storage.get(None)).is_err());
        assert!(block_on(storage.set(Record::new())).is_err());
        assert!(block_on(storage.clear()).is_err());
        assert_eq!(storage.write_count(), 0);
    }

    #[test]
    fn test_bytes_in_use() {
        let storage = MemoryStorage::with_record(record(&[("ab", json!("xyz"))]));

        // "ab" + "\"xyz\""
        assert_eq!(block_on(storage.get_bytes_in_use(None)).unwrap(), 7);
        assert_eq!(block_on(storage.get_bytes_in_use(Some(&["other"][..]))).unwrap(), 0);
    }
}
