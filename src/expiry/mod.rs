//! Deadlines and the clock they are compared against.
//!
//! Every record carries an absolute deadline in seconds since the Unix epoch.
//! The store never schedules anything: it asks its [`Clock`] for "now" at read
//! time and compares.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// A point in time, in (possibly fractional) seconds since the Unix epoch.
///
/// This is the unit persisted in the `expiry` field of every record.  Records
/// written by other producers with either integer or fractional seconds decode
/// into the same type.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    pub const UNIX_EPOCH: Timestamp = Timestamp(0.0);

    pub const fn from_secs_f64(secs: f64) -> Self {
        Timestamp(secs)
    }

    pub fn from_unix_secs(secs: u64) -> Self {
        Timestamp(secs as f64)
    }

    /// Converts a wall-clock time at millisecond resolution.
    ///
    /// Times before the epoch clamp to [`Timestamp::UNIX_EPOCH`].
    pub fn from_system_time(time: SystemTime) -> Self {
        let millis = time
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis();
        Timestamp(millis as f64 / 1000.0)
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0
    }

    /// Returns the deadline `ttl` after `self`.
    pub fn after(self, ttl: Duration) -> Self {
        Timestamp(self.0 + ttl.as_secs_f64())
    }

    /// Returns the point `d` before `self`.
    pub fn before(self, d: Duration) -> Self {
        Timestamp(self.0 - d.as_secs_f64())
    }

    /// `true` once `now` is strictly past this deadline.
    ///
    /// A deadline equal to `now` is still live.
    #[inline]
    pub fn has_passed(self, now: Timestamp) -> bool {
        now.0 > self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.  This is the default clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_system_time(SystemTime::now())
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can hand one clone to a
/// store and keep another to advance it.
///
/// # Example
/// ```
/// use credcache::expiry::{Clock, ManualClock, Timestamp};
/// use std::time::Duration;
///
/// let clock = ManualClock::new(Timestamp::from_unix_secs(1_000));
/// let handle = clock.clone();
/// handle.advance(Duration::from_secs(5));
/// assert_eq!(clock.now(), Timestamp::from_unix_secs(1_005));
/// ```
#[derive(Clone, Debug)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        ManualClock {
            bits: Arc::new(AtomicU64::new(start.0.to_bits())),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.bits.store(now.0.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, d: Duration) {
        let next = self.now().after(d);
        self.set(next);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(f64::from_bits(self.bits.load(Ordering::SeqCst)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
