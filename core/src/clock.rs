//! Timestamp source for save writes.
//!
//! The facade stamps every persisted save with `now_ms()`. Production code
//! uses `SystemClock`; tests drive a `ManualClock` so timestamps are
//! predictable.

use crate::types::TimestampMs;
use std::cell::Cell;

pub trait Clock {
    fn now_ms(&self) -> TimestampMs;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> TimestampMs {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<TimestampMs>,
}

impl ManualClock {
    pub fn new(start: TimestampMs) -> Self {
        Self { now: Cell::new(start) }
    }

    /// Advance by `ms`. Returns the new time.
    pub fn advance(&self, ms: TimestampMs) -> TimestampMs {
        let next = self.now.get() + ms;
        self.now.set(next);
        next
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> TimestampMs {
        self.now.get()
    }
}
