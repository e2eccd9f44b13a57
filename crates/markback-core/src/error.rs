use crate::storage::StoreArea;

/// Errors surfaced by the bookmark engine.
///
/// Read failures never reach callers of `BookmarkStore::list`; they are
/// logged and treated as an empty list. Truncation of oversized content is
/// silent and has no variant.
#[derive(Debug, thiserror::Error)]
pub enum BookmarkError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} storage is unavailable")]
    StorageUnavailable(StoreArea),

    #[error("Failed to read {area} storage: {message}")]
    StorageReadFailed { area: StoreArea, message: String },

    #[error("Failed to write {area} storage: {message}")]
    StorageWriteFailed { area: StoreArea, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BookmarkError {
    pub fn write_failed(area: StoreArea, message: impl Into<String>) -> Self {
        BookmarkError::StorageWriteFailed {
            area,
            message: message.into(),
        }
    }

    pub fn read_failed(area: StoreArea, message: impl Into<String>) -> Self {
        BookmarkError::StorageReadFailed {
            area,
            message: message.into(),
        }
    }
}

pub type Result<T, E = BookmarkError> = std::result::Result<T, E>;

/// Failure to deliver a cross-surface request.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Receiving surface is gone")]
    Disconnected,

    #[error("Receiving surface dropped the request without answering")]
    NoResponse,
}
