use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by a storage substrate.
#[derive(Error, Debug)]
pub enum SubstrateError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record file {path} is not valid UTF-8: {source}")]
    NotUtf8 {
        path: PathBuf,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("storage quota exceeded: write needs {needed} bytes, quota is {quota}")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl SubstrateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SubstrateError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure reported by [`ExpiringStore`](crate::ExpiringStore).
///
/// A missing or expired key is not an error; it is `Ok(None)`.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("key must not be empty")]
    EmptyKey,

    #[error("failed to serialize record: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("expiry must be a finite number of seconds, got {0}")]
    InvalidExpiry(f64),

    #[error("record under key {key:?} is corrupt: {source}")]
    CorruptRecord {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Substrate(#[from] SubstrateError),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
