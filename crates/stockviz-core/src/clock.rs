//! Time source injected into caches so expiry is testable.

use std::fmt::Debug;
use std::sync::Mutex;

use time::Duration;

use crate::UtcDateTime;

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> UtcDateTime;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcDateTime {
        UtcDateTime::now()
    }
}

/// Manually advanced clock for deterministic tests and tooling.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<UtcDateTime>,
}

impl ManualClock {
    pub fn new(start: UtcDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, instant: UtcDateTime) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = now.saturating_add(by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UtcDateTime {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = UtcDateTime::from_unix_timestamp(1_000).expect("timestamp");
        let clock = ManualClock::new(start);

        clock.advance(Duration::seconds(86_399));
        assert_eq!(clock.now().unix_timestamp(), 87_399);

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
