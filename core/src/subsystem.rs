//! Collaborator contracts driven by the switch orchestrator.
//!
//! RULE: the orchestrator only reaches rendering, tasks, progression,
//! interaction and autosave through these traits. Their internals are
//! someone else's business.
//!
//! Methods that move a subsystem to a new role return `DuetResult` so a
//! failing step aborts the switch. The autosave controls used during
//! cleanup cannot fail.

use crate::{
    error::DuetResult,
    event::{EventBus, GameEvent},
    invariant::PlayerEntity,
    types::{ItemId, RoleId},
};
use std::cell::RefCell;
use std::rc::Rc;

pub trait TaskSystem {
    /// Live inventory of the active role.
    fn inventory(&self) -> Vec<ItemId>;
    fn switch_character(&mut self, role: RoleId, inventory: Vec<ItemId>) -> DuetResult<()>;
    fn current_role(&self) -> RoleId;
}

pub trait ProgressionSystem {
    /// Reload the task queue for `role`.
    fn switch_role(&mut self, role: RoleId) -> DuetResult<()>;
}

pub trait InteractionSystem {
    /// Drop proximity/dwell state tied to the previous role.
    fn clear_dwell(&mut self) -> DuetResult<()>;
}

pub trait AutosaveSystem {
    fn pause(&mut self);
    fn resume(&mut self);
    /// Drop a debounced save that has not fired yet. Returns true if one was
    /// pending.
    fn cancel_pending(&mut self) -> bool;
    /// Save now. Returns false if the write failed.
    fn force_save(&mut self) -> bool;
    fn set_role(&mut self, role: RoleId);
}

pub trait World {
    /// Make `role`'s player entity live and the other inert.
    fn set_active_role(&mut self, role: RoleId) -> DuetResult<()>;
    fn player_entity(&self, role: RoleId) -> PlayerEntity;
}

/// Everything the orchestrator drives, wired once at construction.
pub struct Collaborators {
    pub tasks:       Box<dyn TaskSystem>,
    pub progression: Box<dyn ProgressionSystem>,
    pub interaction: Box<dyn InteractionSystem>,
    pub autosave:    Box<dyn AutosaveSystem>,
    pub world:       Box<dyn World>,
    pub events:      Box<dyn EventBus>,
}

// ── Shared handles ─────────────────────────────────────────────
// The frame loop keeps driving these subsystems between switches, so it and
// the orchestrator hold the same `Rc<RefCell<_>>`.

impl<T: TaskSystem + ?Sized> TaskSystem for Rc<RefCell<T>> {
    fn inventory(&self) -> Vec<ItemId> {
        self.borrow().inventory()
    }
    fn switch_character(&mut self, role: RoleId, inventory: Vec<ItemId>) -> DuetResult<()> {
        self.borrow_mut().switch_character(role, inventory)
    }
    fn current_role(&self) -> RoleId {
        self.borrow().current_role()
    }
}

impl<T: ProgressionSystem + ?Sized> ProgressionSystem for Rc<RefCell<T>> {
    fn switch_role(&mut self, role: RoleId) -> DuetResult<()> {
        self.borrow_mut().switch_role(role)
    }
}

impl<T: InteractionSystem + ?Sized> InteractionSystem for Rc<RefCell<T>> {
    fn clear_dwell(&mut self) -> DuetResult<()> {
        self.borrow_mut().clear_dwell()
    }
}

impl<T: AutosaveSystem + ?Sized> AutosaveSystem for Rc<RefCell<T>> {
    fn pause(&mut self) {
        self.borrow_mut().pause()
    }
    fn resume(&mut self) {
        self.borrow_mut().resume()
    }
    fn cancel_pending(&mut self) -> bool {
        self.borrow_mut().cancel_pending()
    }
    fn force_save(&mut self) -> bool {
        self.borrow_mut().force_save()
    }
    fn set_role(&mut self, role: RoleId) {
        self.borrow_mut().set_role(role)
    }
}

impl<T: World + ?Sized> World for Rc<RefCell<T>> {
    fn set_active_role(&mut self, role: RoleId) -> DuetResult<()> {
        self.borrow_mut().set_active_role(role)
    }
    fn player_entity(&self, role: RoleId) -> PlayerEntity {
        self.borrow().player_entity(role)
    }
}

impl<T: EventBus + ?Sized> EventBus for Rc<RefCell<T>> {
    fn emit(&mut self, event: GameEvent) {
        self.borrow_mut().emit(event)
    }
}
