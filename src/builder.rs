use std::marker::PhantomData;

use crate::expiry::{Clock, SystemClock};
use crate::listener::{EvictionCause, EvictionListener, FnListener};
use crate::metrics::stats::StatsCounter;
use crate::store::{ExpiringStore, Inner};
use crate::substrate::Substrate;

/// Builder for configuring and constructing an [`ExpiringStore`].
///
/// # Example
/// ```
/// use credcache::expiry::{ManualClock, Timestamp};
/// use credcache::{ExpiringStore, MemorySubstrate};
///
/// let clock = ManualClock::new(Timestamp::from_unix_secs(1_700_000_000));
/// let store: ExpiringStore<String> = ExpiringStore::builder(MemorySubstrate::new())
///     .clock(clock)
///     .build();
/// ```
pub struct StoreBuilder<V> {
    substrate: Box<dyn Substrate>,
    clock: Box<dyn Clock>,
    listener: Option<Box<dyn EvictionListener>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> StoreBuilder<V> {
    pub fn new<S: Substrate>(substrate: S) -> Self {
        StoreBuilder {
            substrate: Box::new(substrate),
            clock: Box::new(SystemClock),
            listener: None,
            _value: PhantomData,
        }
    }

    /// Replace the wall clock used for expiry checks and TTL deadlines.
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Register an eviction listener closure.
    ///
    /// The closure is called synchronously each time a record is deleted
    /// because it expired or was removed explicitly.  Do **not** call store
    /// methods for the same key from within the closure.
    pub fn eviction_listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, EvictionCause) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(FnListener(f)));
        self
    }

    /// Register an eviction listener via the [`EvictionListener`] trait.
    pub fn eviction_listener_impl<L: EvictionListener>(mut self, l: L) -> Self {
        self.listener = Some(Box::new(l));
        self
    }

    pub fn build(self) -> ExpiringStore<V> {
        ExpiringStore::new(Inner {
            substrate: self.substrate,
            clock: self.clock,
            listener: self.listener,
            metrics: StatsCounter::new(),
        })
    }
}
