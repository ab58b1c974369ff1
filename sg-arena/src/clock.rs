//! `ManualClock`: the fake clock window-expiry tests advance explicitly,
//! per spec.md §9's "tests inject a manual clock" design note. Production
//! callers use `sg_types::SystemClock` instead.

use parking_lot::RwLock;
use sg_types::{Clock, Timestamp};

pub struct ManualClock {
    now: RwLock<i64>,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self { now: RwLock::new(start_millis) }
    }

    pub fn advance(&self, millis: i64) {
        *self.now.write() += millis;
    }

    pub fn set(&self, millis: i64) {
        *self.now.write() = millis;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(*self.now.read())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0)
    }
}
