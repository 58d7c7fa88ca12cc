// src/clock/mod.rs

use std::fmt::Debug;

use chrono::{DateTime, Utc};

pub mod mock;

/// Abstract source of "now".
///
/// Everything that compares against wall-clock time (queue eligibility, lock
/// expiry, recovery cutoffs) reads it through this trait so tests can pin it.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Implementation that uses the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Convert a config/std duration to a chrono offset, millisecond precision.
pub fn to_chrono(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// `ts + d`, pinned to the latest representable instant on overflow.
pub fn saturating_add(ts: DateTime<Utc>, d: std::time::Duration) -> DateTime<Utc> {
    ts.checked_add_signed(to_chrono(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `ts - d`, pinned to the earliest representable instant on overflow.
pub fn saturating_sub(ts: DateTime<Utc>, d: std::time::Duration) -> DateTime<Utc> {
    ts.checked_sub_signed(to_chrono(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
