//! Monotonic timestamp sources.

use crate::sync::{AtomicI64, Ordering};

/// Supplies monotonically non-decreasing readings in nanoseconds.
///
/// Called from the capture path, so implementations must not block or allocate.
pub trait TimestampSource {
    fn now(&self) -> i64;
}

impl<F: Fn() -> i64> TimestampSource for F {
    #[inline]
    fn now(&self) -> i64 {
        self()
    }
}

/// Nanoseconds elapsed since the clock was created, read from [`std::time::Instant`].
#[cfg(feature = "std")]
#[derive(Copy, Clone, Debug)]
pub struct MonotonicClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl TimestampSource for MonotonicClock {
    #[inline]
    fn now(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }
}

/// Clock that only moves when told to. Used for replay and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub const fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::Release);
    }

    pub fn advance(&self, by: i64) -> i64 {
        self.now.fetch_add(by, Ordering::AcqRel) + by
    }
}

impl TimestampSource for ManualClock {
    #[inline]
    fn now(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}
