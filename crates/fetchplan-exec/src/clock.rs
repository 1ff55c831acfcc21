//! Injected time source

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Source of retrieval timestamps
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to, optionally stepping on every read
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    step: chrono::Duration,
}

impl ManualClock {
    /// Clock fixed at `start`
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            step: chrono::Duration::zero(),
        }
    }

    /// Advance by `step` after every read
    #[must_use]
    pub fn with_step(mut self, step: chrono::Duration) -> Self {
        self.step = step;
        self
    }

    /// Move forward by `by`
    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.now.lock();
        let current = *now;
        *now += self.step;
        current
    }
}
