//! Eviction listener: a callback invoked whenever a record leaves the store.
//!
//! # Example
//! ```
//! use credcache::listener::EvictionCause;
//! use credcache::{ExpiringStore, MemorySubstrate};
//! use std::sync::{Arc, Mutex};
//!
//! let log: Arc<Mutex<Vec<(String, EvictionCause)>>> = Arc::new(Mutex::new(Vec::new()));
//! let log2 = Arc::clone(&log);
//!
//! let store: ExpiringStore<String> = ExpiringStore::builder(MemorySubstrate::new())
//!     .eviction_listener(move |key: &str, cause| {
//!         log2.lock().unwrap().push((key.to_string(), cause));
//!     })
//!     .build();
//!
//! store.set_with_ttl("TOKEN", &"abc123".to_string(), std::time::Duration::from_secs(60)).unwrap();
//! store.remove("TOKEN").unwrap();
//! assert_eq!(log.lock().unwrap()[0], ("TOKEN".to_string(), EvictionCause::Explicit));
//! ```

// ---------------------------------------------------------------------------
// EvictionCause
// ---------------------------------------------------------------------------

/// The reason a record was removed from the substrate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictionCause {
    /// Found past its deadline on read and deleted.
    Expired,
    /// Removed explicitly via [`ExpiringStore::remove`].
    ///
    /// [`ExpiringStore::remove`]: crate::ExpiringStore::remove
    Explicit,
}

// ---------------------------------------------------------------------------
// EvictionListener trait
// ---------------------------------------------------------------------------

/// A callback invoked each time a record is evicted or removed.
///
/// Runs synchronously on the thread that triggered the removal, after the
/// substrate delete has succeeded.  Overwrites do not fire it.
pub trait EvictionListener: Send + Sync + 'static {
    fn on_evict(&self, key: &str, cause: EvictionCause);
}

/// An [`EvictionListener`] backed by a closure.
///
/// Created via [`StoreBuilder::eviction_listener`](crate::StoreBuilder::eviction_listener).
pub struct FnListener<F>(pub F);

impl<F> EvictionListener for FnListener<F>
where
    F: Fn(&str, EvictionCause) + Send + Sync + 'static,
{
    fn on_evict(&self, key: &str, cause: EvictionCause) {
        (self.0)(key, cause)
    }
}
