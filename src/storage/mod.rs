/// Durable key-value storage backends (chrome.storage.local and in-memory)
mod chrome;
mod memory;

pub use chrome::ChromeStorage;
pub(crate) use chrome::to_js;
pub use memory::MemoryStorage;

use crate::error::StoreError;
use crate::schema::Record;

/// Contract of the host's durable key-value store.
///
/// `keys: None` means "every key". Writes merge shallowly: each top-level
/// key in `items` replaces the stored value wholesale.
#[allow(async_fn_in_trait)]
pub trait StorageArea {
    async fn get(&self, keys: Option<&[&str]>) -> Result<Record, StoreError>;

    async fn set(&self, items: Record) -> Result<(), StoreError>;

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    async fn get_bytes_in_use(&self, keys: Option<&[&str]>) -> Result<u64, StoreError>;
}
