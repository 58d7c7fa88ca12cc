// src/scheduler/backoff.rs

use std::time::Duration;

use crate::config::SchedulerSection;

/// Exponential backoff with a cap, used while storage is unavailable.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    multiplier: f64,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            initial,
            multiplier,
            max,
            current: None,
        }
    }

    pub fn from_config(section: &SchedulerSection) -> Self {
        Self::new(
            section.backoff_initial,
            section.backoff_multiplier,
            section.backoff_max,
        )
    }

    /// The wait before the next attempt; grows on every call until `reset`.
    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.initial,
            Some(prev) => Duration::try_from_secs_f64(prev.as_secs_f64() * self.multiplier)
                .unwrap_or(self.max),
        }
        .min(self.max);

        self.current = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}
