//! Storage substrates: the raw string-keyed stores the expiring layer sits on.
//!
//! A substrate knows nothing about expiry.  It stores opaque serialized
//! records and must make a single-key write atomic: a reader sees either the
//! old record or the new one, never a mix.

pub mod file;
pub mod memory;

pub use file::FileSubstrate;
pub use memory::MemorySubstrate;

use std::sync::Arc;

use crate::error::SubstrateError;

/// A synchronous, string-keyed key-value store.
///
/// Implementations must be `Send + Sync + 'static` so they can be shared
/// between stores as `Arc<dyn Substrate>`.
pub trait Substrate: Send + Sync + 'static {
    /// Returns the record stored under `key`, or `None` if there is none.
    fn raw_get(&self, key: &str) -> Result<Option<String>, SubstrateError>;

    /// Stores `record` under `key`, replacing whatever was there.
    fn raw_set(&self, key: &str, record: &str) -> Result<(), SubstrateError>;

    /// Removes the record under `key`.  Removing a missing key is not an error.
    fn raw_delete(&self, key: &str) -> Result<(), SubstrateError>;
}

impl<S: Substrate + ?Sized> Substrate for Arc<S> {
    fn raw_get(&self, key: &str) -> Result<Option<String>, SubstrateError> {
        (**self).raw_get(key)
    }

    fn raw_set(&self, key: &str, record: &str) -> Result<(), SubstrateError> {
        (**self).raw_set(key, record)
    }

    fn raw_delete(&self, key: &str) -> Result<(), SubstrateError> {
        (**self).raw_delete(key)
    }
}
