// Clock module - pluggable time source for presentation and response timestamps
//
// Every timestamp the crate records comes from a `SharedClock`. The active
// clock can be swapped at runtime; the swap only affects timestamps captured
// afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A point in time, in seconds, as reported by a [`Clock`].
///
/// The epoch depends on the clock that produced it: [`SystemClock`] counts from
/// the UNIX epoch, [`MonotonicClock`] from its own creation, [`ManualClock`]
/// from whatever the test sets.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Timestamp(f64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0.0);

    pub fn from_secs_f64(secs: f64) -> Self {
        Self(secs)
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0
    }

    /// Seconds elapsed from `earlier` to `self` (negative if `earlier` is later).
    pub fn seconds_since(self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }
}

impl From<f64> for Timestamp {
    fn from(secs: f64) -> Self {
        Self(secs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.0)
    }
}

/// Source of the current instant.
///
/// Any `Fn() -> f64 + Send + Sync` closure is a clock, which keeps ad-hoc
/// clocks (e.g. a hardware timer read) to a one-liner.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

impl<F> Clock for F
where
    F: Fn() -> f64 + Send + Sync,
{
    fn now(&self) -> Timestamp {
        Timestamp(self())
    }
}

/// Wall clock: seconds since the UNIX epoch. The default clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // A system clock set before 1970 reads as zero rather than failing.
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Timestamp(secs)
    }
}

/// Monotonic clock: seconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.origin.elapsed().as_secs_f64())
    }
}

/// Hand-driven clock for tests and replays.
///
/// Clones share the same reading, so a test can keep one handle while the
/// session owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(secs: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(secs.to_bits())),
        }
    }

    pub fn set(&self, secs: f64) {
        self.bits.store(secs.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: f64) {
        // fetch_update never fails when the closure always returns Some.
        let _ = self
            .bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                Some((f64::from_bits(bits) + secs).to_bits())
            });
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.get())
    }
}

/// The session-wide, swappable clock.
///
/// Reads take a read lock and clone the inner `Arc` before calling it, so a
/// concurrent [`replace`](Self::replace) never exposes a half-updated clock
/// and never blocks behind a slow clock read.
#[derive(Clone)]
pub struct SharedClock {
    inner: Arc<RwLock<Arc<dyn Clock>>>,
}

impl SharedClock {
    pub fn new<C: Clock + 'static>(clock: C) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(clock))),
        }
    }

    pub fn now(&self) -> Timestamp {
        let clock = match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        };
        clock.now()
    }

    /// Install a new clock and return the previous one.
    pub fn replace<C: Clock + 'static>(&self, clock: C) -> Arc<dyn Clock> {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, Arc::new(clock))
    }
}

impl Default for SharedClock {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl fmt::Debug for SharedClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedClock").field("now", &self.now()).finish()
    }
}
