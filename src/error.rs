/// Error types for the background core
use thiserror::Error;

/// Failure reported by the durable key-value storage
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("stored value could not be decoded: {0}")]
    Decode(String),
}

/// Failure while upgrading the persisted record
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MigrationError {
    #[error("migration to v{version} failed: {reason}")]
    Step { version: u32, reason: String },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl MigrationError {
    pub fn step(version: u32, reason: impl Into<String>) -> Self {
        MigrationError::Step {
            version,
            reason: reason.into(),
        }
    }
}

/// Failure while rendering a cookie export
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV export failed: {0}")]
    Flush(String),
}

/// Failure surfaced to a message sender as `{success: false, error}`
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid message")]
    Invalid(Vec<String>),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Read-only mode is enabled")]
    ReadOnly,

    #[error("Domain is protected: {0}")]
    ProtectedDomain(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Cookie operation failed: {0}")]
    Cookie(String),

    #[error("Storage operation failed")]
    Storage,
}
