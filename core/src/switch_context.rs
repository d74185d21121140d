//! Single-flight bookkeeping for role switches.
//!
//! Holds the "switching" flag and a monotonic sequence counter used to
//! correlate log lines. It does not reject anything itself: callers check
//! `is_switching()` before `begin()`.

use crate::types::SwitchSeq;
use std::cell::Cell;

#[derive(Debug, Default)]
pub struct SwitchContext {
    switching: Cell<bool>,
    seq:       Cell<SwitchSeq>,
}

impl SwitchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a transaction. Returns its sequence number.
    pub fn begin(&self) -> SwitchSeq {
        let seq = self.seq.get() + 1;
        self.seq.set(seq);
        self.switching.set(true);
        seq
    }

    /// Close the current transaction. Safe to call more than once.
    pub fn end(&self) {
        self.switching.set(false);
    }

    pub fn is_switching(&self) -> bool {
        self.switching.get()
    }

    /// Sequence number of the most recent `begin()`; 0 before the first.
    pub fn seq(&self) -> SwitchSeq {
        self.seq.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_advances_sequence_and_end_is_idempotent() {
        let ctx = SwitchContext::new();
        assert_eq!(ctx.seq(), 0);
        assert!(!ctx.is_switching());

        assert_eq!(ctx.begin(), 1);
        assert!(ctx.is_switching());
        ctx.end();
        ctx.end();
        assert!(!ctx.is_switching());

        assert_eq!(ctx.begin(), 2);
        assert_eq!(ctx.seq(), 2);
    }
}
