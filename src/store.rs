use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::builder::StoreBuilder;
use crate::error::{Result, StoreError, SubstrateError};
use crate::expiry::{Clock, Timestamp};
use crate::listener::{EvictionCause, EvictionListener};
use crate::metrics::stats::{Metrics, StatsCounter};
use crate::record::{Envelope, Record};
use crate::substrate::Substrate;

// ---------------------------------------------------------------------------
// Store interior
// ---------------------------------------------------------------------------

/// Shared interior of an [`ExpiringStore`].
pub(crate) struct Inner {
    pub(crate) substrate: Box<dyn Substrate>,
    pub(crate) clock: Box<dyn Clock>,
    /// Optional eviction listener.  `None` if the user didn't register one.
    pub(crate) listener: Option<Box<dyn EvictionListener>>,
    pub(crate) metrics: StatsCounter,
}

// ---------------------------------------------------------------------------
// Store handle
// ---------------------------------------------------------------------------

/// TTL-bounded storage of serializable values on top of a [`Substrate`].
///
/// Each record carries an absolute deadline.  Nothing runs in the background:
/// a record found past its deadline on read is deleted from the substrate and
/// reported as absent.
///
/// # Example
/// ```
/// use credcache::{ExpiringStore, MemorySubstrate};
/// use std::time::Duration;
///
/// let store: ExpiringStore<String> = ExpiringStore::builder(MemorySubstrate::new()).build();
/// store.set_with_ttl("TOKEN", &"abc123".to_string(), Duration::from_secs(3600)).unwrap();
/// assert_eq!(store.get("TOKEN").unwrap().as_deref(), Some("abc123"));
/// ```
pub struct ExpiringStore<V> {
    inner: Arc<Inner>,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for ExpiringStore<V> {
    fn clone(&self) -> Self {
        ExpiringStore {
            inner: Arc::clone(&self.inner),
            _value: PhantomData,
        }
    }
}

impl<V> ExpiringStore<V> {
    pub(crate) fn new(inner: Inner) -> Self {
        ExpiringStore {
            inner: Arc::new(inner),
            _value: PhantomData,
        }
    }

    /// Returns a [`StoreBuilder`] over `substrate`.
    pub fn builder<S: Substrate>(substrate: S) -> StoreBuilder<V> {
        StoreBuilder::new(substrate)
    }

    /// The current time according to this store's clock.
    pub fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    pub fn stats(&self) -> Metrics {
        self.inner.metrics.snapshot()
    }

    /// Removes the record for `key`, if present.
    ///
    /// Returns `true` if a record (live or expired) existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        match self.inner.substrate.raw_get(key) {
            Ok(None) => return Ok(false),
            // Undecodable records can still be removed.
            Ok(Some(_)) | Err(SubstrateError::NotUtf8 { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        self.inner.substrate.raw_delete(key)?;
        debug!(key, "removed record");
        self.notify(key, EvictionCause::Explicit);
        Ok(true)
    }

    /// Returns `true` if `key` holds a live record.
    ///
    /// Same semantics as [`get`](Self::get), including deleting an expired
    /// record, but the payload is never decoded into `V`.
    pub fn contains(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        let Some(raw) = self.read_raw(key)? else {
            return Ok(false);
        };
        let envelope = Envelope::decode(&raw).map_err(|source| corrupt(key, source))?;
        let now = self.inner.clock.now();
        if envelope.expiry.has_passed(now) {
            self.evict_expired(key, envelope.expiry, now)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Reads the raw record, treating undecodable text as corruption.
    fn read_raw(&self, key: &str) -> Result<Option<String>> {
        match self.inner.substrate.raw_get(key) {
            Ok(raw) => Ok(raw),
            Err(SubstrateError::NotUtf8 { source, .. }) => Err(corrupt(key, source)),
            Err(e) => Err(e.into()),
        }
    }

    fn evict_expired(&self, key: &str, expiry: Timestamp, now: Timestamp) -> Result<()> {
        self.inner.substrate.raw_delete(key)?;
        self.inner.metrics.record_expiration();
        debug!(key, %expiry, %now, "evicted expired record");
        self.notify(key, EvictionCause::Expired);
        Ok(())
    }

    fn notify(&self, key: &str, cause: EvictionCause) {
        if let Some(listener) = &self.inner.listener {
            listener.on_evict(key, cause);
        }
    }
}

impl<V> ExpiringStore<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Stores `value` under `key` until the absolute deadline `expiry`.
    ///
    /// Unconditionally replaces any record already under `key`, live or
    /// expired.  Substrate failures (quota, I/O) are returned as-is.  A NaN
    /// or infinite deadline is rejected with [`StoreError::InvalidExpiry`]
    /// since it could not be read back.
    pub fn set(&self, key: &str, value: &V, expiry: Timestamp) -> Result<()> {
        check_key(key)?;
        if !expiry.as_secs_f64().is_finite() {
            return Err(StoreError::InvalidExpiry(expiry.as_secs_f64()));
        }
        let raw = Record { value, expiry }
            .encode()
            .map_err(StoreError::Serialize)?;
        self.inner.substrate.raw_set(key, &raw)?;
        self.inner.metrics.record_write();
        debug!(key, %expiry, "stored record");
        Ok(())
    }

    /// Stores `value` under `key` for `ttl` from now.
    pub fn set_with_ttl(&self, key: &str, value: &V, ttl: Duration) -> Result<()> {
        let deadline = self.inner.clock.now().after(ttl);
        self.set(key, value, deadline)
    }

    /// Returns the value for `key` if it exists and has not expired.
    ///
    /// A record whose deadline is strictly before now is deleted from the
    /// substrate and `Ok(None)` is returned.  A record that cannot be decoded
    /// is left in place and reported as [`StoreError::CorruptRecord`].
    ///
    /// The read, the expiry check and the delete are separate substrate
    /// calls.  Handles in other processes sharing the same substrate may
    /// interleave with them; the worst outcomes are a redundant delete or a
    /// value returned just before another handle evicts it.
    pub fn get(&self, key: &str) -> Result<Option<V>> {
        check_key(key)?;
        let Some(raw) = self.read_raw(key)? else {
            self.inner.metrics.record_miss();
            trace!(key, "miss");
            return Ok(None);
        };

        let record: Record<V> = Record::decode(&raw).map_err(|source| corrupt(key, source))?;

        let now = self.inner.clock.now();
        if record.expiry.has_passed(now) {
            self.evict_expired(key, record.expiry, now)?;
            self.inner.metrics.record_miss();
            return Ok(None);
        }

        self.inner.metrics.record_hit();
        trace!(key, "hit");
        Ok(Some(record.value))
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StoreError::EmptyKey);
    }
    Ok(())
}

fn corrupt<E>(key: &str, source: E) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    warn!(key, error = %source, "corrupt record");
    StoreError::CorruptRecord {
        key: key.to_owned(),
        source: Box::new(source),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expiry::ManualClock;
    use crate::substrate::MemorySubstrate;

    const T0: u64 = 1_700_000_000;

    fn fixture() -> (ExpiringStore<String>, Arc<MemorySubstrate>, ManualClock) {
        let substrate = Arc::new(MemorySubstrate::new());
        let clock = ManualClock::new(Timestamp::from_unix_secs(T0));
        let store = ExpiringStore::builder(Arc::clone(&substrate))
            .clock(clock.clone())
            .build();
        (store, substrate, clock)
    }

    #[test]
    fn live_at_exact_deadline_expired_just_after() {
        let (store, substrate, clock) = fixture();
        store
            .set("k", &"v".to_string(), Timestamp::from_unix_secs(T0 + 10))
            .unwrap();

        clock.set(Timestamp::from_unix_secs(T0 + 10));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        clock.set(Timestamp::from_secs_f64((T0 + 10) as f64 + 0.001));
        assert_eq!(store.get("k").unwrap(), None);
        assert!(!substrate.raw_contains("k"));
    }

    #[test]
    fn set_with_ttl_computes_absolute_deadline() {
        let (store, substrate, _clock) = fixture();
        store
            .set_with_ttl("k", &"v".to_string(), Duration::from_secs(60))
            .unwrap();
        let raw = substrate.raw_get("k").unwrap().unwrap();
        let rec: Record<String> = Record::decode(&raw).unwrap();
        assert_eq!(rec.expiry, Timestamp::from_unix_secs(T0 + 60));
    }

    #[test]
    fn empty_key_is_rejected() {
        let (store, substrate, _clock) = fixture();
        assert!(matches!(
            store.set("", &"v".to_string(), Timestamp::from_unix_secs(T0)),
            Err(StoreError::EmptyKey)
        ));
        assert!(matches!(store.get(""), Err(StoreError::EmptyKey)));
        assert!(substrate.is_empty());
    }

    #[test]
    fn corrupt_record_fails_loudly_and_is_kept() {
        let (store, substrate, _clock) = fixture();
        substrate.raw_set("k", "not json").unwrap();
        match store.get("k") {
            Err(StoreError::CorruptRecord { key, .. }) => assert_eq!(key, "k"),
            other => panic!("expected CorruptRecord, got {:?}", other),
        }
        assert!(substrate.raw_contains("k"));
    }

    #[test]
    fn foreign_payload_type_is_corrupt() {
        let (store, substrate, _clock) = fixture();
        substrate
            .raw_set("k", &format!(r#"{{"value":42,"expiry":{}}}"#, T0 + 5))
            .unwrap();
        assert!(matches!(store.get("k"), Err(StoreError::CorruptRecord { .. })));
        // The deadline is still readable without the payload type.
        assert!(store.contains("k").unwrap());
    }

    #[test]
    fn contains_evicts_expired_record() {
        let (store, substrate, clock) = fixture();
        store
            .set_with_ttl("k", &"v".to_string(), Duration::from_secs(1))
            .unwrap();
        assert!(store.contains("k").unwrap());
        clock.advance(Duration::from_secs(2));
        assert!(!store.contains("k").unwrap());
        assert!(!substrate.raw_contains("k"));
        assert_eq!(store.stats().expirations, 1);
    }

    #[test]
    fn remove_reports_presence() {
        let (store, substrate, _clock) = fixture();
        assert!(!store.remove("k").unwrap());
        store
            .set_with_ttl("k", &"v".to_string(), Duration::from_secs(1))
            .unwrap();
        assert!(store.remove("k").unwrap());
        assert!(substrate.is_empty());
    }

    #[test]
    fn quota_failure_propagates_from_set() {
        let substrate = MemorySubstrate::with_quota(16);
        let store: ExpiringStore<String> = ExpiringStore::builder(substrate).build();
        let err = store
            .set_with_ttl("TOKEN", &"x".repeat(64), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Substrate(crate::error::SubstrateError::QuotaExceeded { .. })
        ));
        assert_eq!(store.stats().writes, 0);
    }

    #[test]
    fn stats_count_hits_misses_and_expirations() {
        let (store, _substrate, clock) = fixture();
        store
            .set_with_ttl("k", &"v".to_string(), Duration::from_secs(5))
            .unwrap();
        store.get("k").unwrap(); // hit
        store.get("nope").unwrap(); // miss
        clock.advance(Duration::from_secs(6));
        store.get("k").unwrap(); // expired -> miss
        let s = store.stats();
        assert_eq!((s.hits, s.misses, s.expirations, s.writes), (1, 2, 1, 1));
    }

    #[test]
    fn non_finite_deadline_is_rejected_before_writing() {
        let (store, substrate, _clock) = fixture();
        for bad in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let err = store
                .set("TOKEN", &"abc123".to_string(), Timestamp::from_secs_f64(bad))
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidExpiry(_)), "{:?}", err);
        }
        assert!(substrate.is_empty());
        assert_eq!(store.stats().writes, 0);
    }

    #[test]
    fn huge_ttl_still_reads_back() {
        let (store, _substrate, _clock) = fixture();
        store
            .set_with_ttl("k", &"v".to_string(), Duration::MAX)
            .unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    // -----------------------------------------------------------------------
    // Substrate failures
    // -----------------------------------------------------------------------

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// A memory substrate whose reads or deletes can be switched to fail.
    #[derive(Default)]
    struct FlakySubstrate {
        inner: MemorySubstrate,
        fail_get: AtomicBool,
        fail_delete: AtomicBool,
    }

    impl Substrate for FlakySubstrate {
        fn raw_get(&self, key: &str) -> std::result::Result<Option<String>, SubstrateError> {
            if self.fail_get.load(Ordering::SeqCst) {
                return Err(SubstrateError::Unavailable("read failed".into()));
            }
            self.inner.raw_get(key)
        }

        fn raw_set(&self, key: &str, record: &str) -> std::result::Result<(), SubstrateError> {
            self.inner.raw_set(key, record)
        }

        fn raw_delete(&self, key: &str) -> std::result::Result<(), SubstrateError> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(SubstrateError::Unavailable("delete failed".into()));
            }
            self.inner.raw_delete(key)
        }
    }

    fn flaky_fixture() -> (
        ExpiringStore<String>,
        Arc<FlakySubstrate>,
        ManualClock,
        Arc<AtomicUsize>,
    ) {
        let substrate = Arc::new(FlakySubstrate::default());
        let clock = ManualClock::new(Timestamp::from_unix_secs(T0));
        let evictions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evictions);
        let store = ExpiringStore::builder(Arc::clone(&substrate))
            .clock(clock.clone())
            .eviction_listener(move |_key: &str, _cause| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        (store, substrate, clock, evictions)
    }

    #[test]
    fn read_failure_surfaces_from_get_contains_and_remove() {
        let (store, substrate, _clock, _evictions) = flaky_fixture();
        store
            .set_with_ttl("k", &"v".to_string(), Duration::from_secs(60))
            .unwrap();
        substrate.fail_get.store(true, Ordering::SeqCst);

        assert!(matches!(
            store.get("k"),
            Err(StoreError::Substrate(SubstrateError::Unavailable(_)))
        ));
        assert!(matches!(store.contains("k"), Err(StoreError::Substrate(_))));
        assert!(matches!(store.remove("k"), Err(StoreError::Substrate(_))));

        let s = store.stats();
        assert_eq!((s.hits, s.misses), (0, 0));
        assert!(substrate.inner.raw_contains("k"));
    }

    #[test]
    fn failed_eviction_delete_is_returned_and_not_counted() {
        let (store, substrate, clock, evictions) = flaky_fixture();
        store
            .set_with_ttl("k", &"v".to_string(), Duration::from_secs(1))
            .unwrap();
        clock.advance(Duration::from_secs(2));
        substrate.fail_delete.store(true, Ordering::SeqCst);

        assert!(matches!(
            store.get("k"),
            Err(StoreError::Substrate(SubstrateError::Unavailable(_)))
        ));
        assert!(matches!(store.contains("k"), Err(StoreError::Substrate(_))));
        assert_eq!(store.stats().expirations, 0);
        assert_eq!(evictions.load(Ordering::SeqCst), 0);
        assert!(substrate.inner.raw_contains("k"), "record must stay in place");

        // Once the substrate recovers, the next read evicts as usual.
        substrate.fail_delete.store(false, Ordering::SeqCst);
        assert_eq!(store.get("k").unwrap(), None);
        assert_eq!(store.stats().expirations, 1);
        assert_eq!(evictions.load(Ordering::SeqCst), 1);
        assert!(!substrate.inner.raw_contains("k"));
    }
}
