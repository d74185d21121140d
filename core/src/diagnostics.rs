//! Call tracing for the save facade.
//!
//! `TracedSaves` wraps any `SaveAccess` and logs every call with the
//! current switch sequence, so facade traffic inside a switch can be matched
//! to that switch's log lines. Compose it at construction time:
//!
//! ```ignore
//! let saves = TracedSaves::new(SaveFacade::new(store, &config), context.clone());
//! ```

use crate::{
    error::DuetResult,
    facade::SaveAccess,
    save_data::{SaveData, SharedState},
    switch_context::SwitchContext,
    types::{AreaId, ItemId, RoleId, TaskId},
};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub struct TracedSaves<S: SaveAccess> {
    inner:   S,
    context: Rc<SwitchContext>,
    calls:   Cell<u64>,
    /// Calls made while a switch was open, as (seq, op).
    in_switch: RefCell<Vec<(u64, &'static str)>>,
}

impl<S: SaveAccess> TracedSaves<S> {
    pub fn new(inner: S, context: Rc<SwitchContext>) -> Self {
        Self {
            inner,
            context,
            calls: Cell::new(0),
            in_switch: RefCell::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn calls(&self) -> u64 {
        self.calls.get()
    }

    pub fn calls_during_switch(&self) -> Vec<(u64, &'static str)> {
        self.in_switch.borrow().clone()
    }

    fn trace(&self, op: &'static str) {
        self.calls.set(self.calls.get() + 1);
        if self.context.is_switching() {
            let seq = self.context.seq();
            self.in_switch.borrow_mut().push((seq, op));
            log::debug!("save.{op} slot={} seq={seq}", self.inner.slot_id());
        } else {
            log::trace!("save.{op} slot={}", self.inner.slot_id());
        }
    }
}

impl<S: SaveAccess> SaveAccess for TracedSaves<S> {
    fn slot_id(&self) -> &str {
        self.inner.slot_id()
    }

    fn load_or_create(&self) -> SaveData {
        self.trace("load_or_create");
        self.inner.load_or_create()
    }

    fn load_main(&self) -> SaveData {
        self.trace("load_main");
        self.inner.load_main()
    }

    fn try_load_main(&self) -> DuetResult<SaveData> {
        self.trace("try_load_main");
        self.inner.try_load_main()
    }

    fn write_main(&self, save: &SaveData) -> bool {
        self.trace("write_main");
        let written = self.inner.write_main(save);
        if !written {
            log::warn!("save.write_main slot={} returned false", self.inner.slot_id());
        }
        written
    }

    fn delete_slot(&self) {
        self.trace("delete_slot");
        self.inner.delete_slot()
    }

    fn get_inventory(&self, role: RoleId) -> Vec<ItemId> {
        self.trace("get_inventory");
        self.inner.get_inventory(role)
    }

    fn set_inventory(&self, role: RoleId, inventory: &[ItemId]) -> bool {
        self.trace("set_inventory");
        self.inner.set_inventory(role, inventory)
    }

    fn get_completed_tasks(&self, role: RoleId) -> Vec<TaskId> {
        self.trace("get_completed_tasks");
        self.inner.get_completed_tasks(role)
    }

    fn mark_task_complete(&self, role: RoleId, task: &str) -> bool {
        self.trace("mark_task_complete");
        self.inner.mark_task_complete(role, task)
    }

    fn get_unlocked_areas(&self, role: RoleId) -> Vec<AreaId> {
        self.trace("get_unlocked_areas");
        self.inner.get_unlocked_areas(role)
    }

    fn mark_area_complete(&self, role: RoleId, area: &str) -> bool {
        self.trace("mark_area_complete");
        self.inner.mark_area_complete(role, area)
    }

    fn get_last_area(&self, role: RoleId) -> Option<AreaId> {
        self.trace("get_last_area");
        self.inner.get_last_area(role)
    }

    fn set_last_area(&self, role: RoleId, area: &str) -> bool {
        self.trace("set_last_area");
        self.inner.set_last_area(role, area)
    }

    fn get_shared(&self) -> SharedState {
        self.trace("get_shared");
        self.inner.get_shared()
    }

    fn set_shared(&self, shared: &SharedState) -> bool {
        self.trace("set_shared");
        self.inner.set_shared(shared)
    }

    fn get_world_flag(&self, area: &str, key: &str) -> Option<Value> {
        self.trace("get_world_flag");
        self.inner.get_world_flag(area, key)
    }

    fn set_world_flag(&self, area: &str, key: &str, value: Value) -> bool {
        self.trace("set_world_flag");
        self.inner.set_world_flag(area, key, value)
    }

    fn clear_world_flags(&self, area: &str) -> bool {
        self.trace("clear_world_flags");
        self.inner.clear_world_flags(area)
    }

    fn set_last_selected_role(&self, role: Option<RoleId>) -> bool {
        self.trace("set_last_selected_role");
        self.inner.set_last_selected_role(role)
    }

    fn commit_role_handoff(&self, from: RoleId, inventory: &[ItemId], to: RoleId) -> bool {
        self.trace("commit_role_handoff");
        self.inner.commit_role_handoff(from, inventory, to)
    }
}
