//! Wall-clock sources.
//!
//! The shipper reads "now" twice per request: once for the default record
//! timestamp and once for the `x-ms-date` header. Both reads go through
//! [`Clock`] so tests can pin the instant and check signatures exactly.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};

/// Source of the current UTC instant.
pub trait Clock: Send + Sync {
    /// Return the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared clock trait object used by the shipper and its retry worker.
#[derive(Clone)]
pub struct SharedClock {
    inner: Arc<dyn Clock>,
}

impl SharedClock {
    /// Wrap an owned clock implementation.
    pub fn new<C>(clock: C) -> Self
    where
        C: Clock + 'static,
    {
        Self {
            inner: Arc::new(clock),
        }
    }

    /// Return the current instant from the wrapped clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.now()
    }
}

impl Default for SharedClock {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl fmt::Debug for SharedClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedClock").finish_non_exhaustive()
    }
}

#[cfg(any(test, feature = "test-util"))]
mod manual {
    use std::sync::Arc;

    use chrono::{DateTime, TimeDelta, Utc};
    use parking_lot::Mutex;

    use super::Clock;

    /// Clock whose value only changes when a test says so.
    ///
    /// Clones share the same instant, so a clone handed to the shipper can be
    /// advanced from the test body.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        current: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock frozen at `start`.
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                current: Arc::new(Mutex::new(start)),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, delta: TimeDelta) {
            *self.current.lock() += delta;
        }

        /// Set the clock to a specific instant.
        pub fn set(&self, instant: DateTime<Utc>) {
            *self.current.lock() = instant;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.current.lock()
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use manual::ManualClock;
