//! Debounced and periodic autosave.
//!
//! `request_save()` arms a debounced save that fires once the quiet period
//! has passed; `tick()` also saves on the periodic interval. While paused,
//! nothing fires on its own, but `force_save()` always writes. The save
//! itself is an injected callback so the scheduler stays independent of
//! what gets captured.

use crate::{
    clock::Clock,
    config::AutosaveConfig,
    subsystem::AutosaveSystem,
    types::{RoleId, TimestampMs},
};
use std::rc::Rc;

pub type SaveAction = Box<dyn FnMut(RoleId) -> bool>;

pub struct AutosaveScheduler {
    config:        AutosaveConfig,
    clock:         Rc<dyn Clock>,
    save:          SaveAction,
    role:          RoleId,
    paused:        bool,
    pending_since: Option<TimestampMs>,
    last_save_at:  TimestampMs,
    saves_written: u64,
}

impl AutosaveScheduler {
    pub fn new(config: AutosaveConfig, clock: Rc<dyn Clock>, role: RoleId, save: SaveAction) -> Self {
        let now = clock.now_ms();
        Self {
            config,
            clock,
            save,
            role,
            paused: false,
            pending_since: None,
            last_save_at: now,
            saves_written: 0,
        }
    }

    /// Arm (or re-arm) the debounced save.
    pub fn request_save(&mut self) {
        self.pending_since = Some(self.clock.now_ms());
    }

    /// Fire whatever is due. Returns true if a save ran.
    pub fn tick(&mut self) -> bool {
        if self.paused {
            return false;
        }
        let now = self.clock.now_ms();
        let debounce_due = self
            .pending_since
            .is_some_and(|since| now - since >= self.config.debounce_ms);
        let interval_due = now - self.last_save_at >= self.config.interval_ms;
        if debounce_due || interval_due {
            self.save_now();
            return true;
        }
        false
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn has_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    pub fn role(&self) -> RoleId {
        self.role
    }

    pub fn saves_written(&self) -> u64 {
        self.saves_written
    }

    fn save_now(&mut self) -> bool {
        self.pending_since = None;
        self.last_save_at = self.clock.now_ms();
        let ok = (self.save)(self.role);
        if ok {
            self.saves_written += 1;
        } else {
            log::warn!("autosave for role {} failed", self.role);
        }
        ok
    }
}

impl AutosaveSystem for AutosaveScheduler {
    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn cancel_pending(&mut self) -> bool {
        self.pending_since.take().is_some()
    }

    fn force_save(&mut self) -> bool {
        self.save_now()
    }

    fn set_role(&mut self, role: RoleId) {
        self.role = role;
    }
}
