use std::sync::atomic::{AtomicI64, Ordering};

use time::OffsetDateTime;

use crate::types::epoch_millis;

/// Source of "now" for admission and expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to, with millisecond resolution.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            millis: AtomicI64::new(epoch_millis::to_millis(start)),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        self.millis
            .store(epoch_millis::to_millis(now), Ordering::SeqCst);
    }

    pub fn advance(&self, by: time::Duration) {
        self.millis
            .fetch_add(by.whole_milliseconds() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        // Stored values always come from a valid OffsetDateTime.
        epoch_millis::from_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(datetime!(2024-03-01 09:00:00 UTC));
        clock.advance(time::Duration::minutes(5));
        assert_eq!(clock.now(), datetime!(2024-03-01 09:05:00 UTC));

        clock.set(datetime!(2024-03-02 00:00:00 UTC));
        assert_eq!(clock.now(), datetime!(2024-03-02 00:00:00 UTC));
    }
}
