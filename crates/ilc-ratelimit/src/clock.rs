//! Mockable clock abstraction (Open Question #2: adopted for testability).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Production clock: delegates to `Instant::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock a test can advance deterministically instead of sleeping.
#[derive(Clone)]
pub struct TestClock {
    inner: Arc<Mutex<Instant>>,
}

impl TestClock {
    pub fn new() -> Self {
        TestClock {
            inner: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut guard = self.inner.lock();
        *guard += duration;
    }
}

impl Default for TestClock {
    fn default() -> Self {
        TestClock::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.inner.lock()
    }
}
