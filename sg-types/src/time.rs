//! Timestamps and the clock seam used by temporal fitness windows.
//!
//! spec §9: "the core does not own timers... tests inject a manual clock."
//! [`Clock`] is the seam; [`SystemClock`] is the production implementation
//! and `ManualClock` (in `sg-arena`, the only crate that needs to advance
//! time under test) implements it for deterministic window tests.

use chrono::{DateTime, Utc};

/// Millisecond-precision timestamp, following `housaky-core::types::Timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`; zero if `earlier` is later.
    pub fn duration_since_millis(&self, earlier: Timestamp) -> i64 {
        (self.0 - earlier.0).max(0)
    }

    pub fn to_chrono(self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_else(Utc::now)
    }
}

/// A source of the current time. Exists so that window-expiry logic in
/// `sg-arena` can be driven by a fake clock in tests instead of wall time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(Utc::now().timestamp_millis())
    }
}
