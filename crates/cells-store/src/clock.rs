use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Monotonic time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut off = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *off += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let off = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.base + off
    }
}
