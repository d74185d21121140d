//! The single choke point for save reads and writes.
//!
//! RULES:
//!   - Nothing else touches the SaveStore.
//!   - Every read migrates, audits and hands back a value the caller owns
//!     outright; no buffer is shared with anything the facade keeps.
//!   - Every write re-audits the caller's value, detaches it, stamps the
//!     timestamp and persists.
//!   - A stored save that cannot be read is never replaced. Reads fall back
//!     to an in-memory default and every write is refused until a read
//!     succeeds again or the slot is deleted.
//!   - Accessors do one load -> mutate -> write cycle each. The facade does
//!     not serialise overlapping callers; the switch orchestrator is the
//!     only caller that needs that, and SwitchContext gives it.

use crate::{
    clock::{Clock, SystemClock},
    config::SaveConfig,
    error::{DuetError, DuetResult},
    migration::{audit_aliasing, detect_version, repair_aliasing, SchemaMigrator},
    save_data::{push_unique, RoleProgress, SaveData, SharedState, CURRENT_VERSION},
    store::SaveStore,
    types::{AreaId, ItemId, RoleId, SlotId, TaskId},
};
use serde_json::Value;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

/// The facade interface. `SaveFacade` is the real thing; `TracedSaves`
/// decorates any implementation with call logging.
pub trait SaveAccess {
    fn slot_id(&self) -> &str;

    /// Load the slot, creating and persisting the default save on first
    /// access.
    fn load_or_create(&self) -> SaveData;
    fn load_main(&self) -> SaveData;
    /// Like `load_main`, but an unreadable stored save is an error instead
    /// of a default.
    fn try_load_main(&self) -> DuetResult<SaveData>;
    /// Persist `save`. Returns false if the store rejected the write.
    fn write_main(&self, save: &SaveData) -> bool;
    fn delete_slot(&self);

    fn get_inventory(&self, role: RoleId) -> Vec<ItemId>;
    fn set_inventory(&self, role: RoleId, inventory: &[ItemId]) -> bool;
    fn get_completed_tasks(&self, role: RoleId) -> Vec<TaskId>;
    fn mark_task_complete(&self, role: RoleId, task: &str) -> bool;
    fn get_unlocked_areas(&self, role: RoleId) -> Vec<AreaId>;
    fn mark_area_complete(&self, role: RoleId, area: &str) -> bool;
    fn get_last_area(&self, role: RoleId) -> Option<AreaId>;
    fn set_last_area(&self, role: RoleId, area: &str) -> bool;

    fn get_shared(&self) -> SharedState;
    fn set_shared(&self, shared: &SharedState) -> bool;

    fn get_world_flag(&self, area: &str, key: &str) -> Option<Value>;
    fn set_world_flag(&self, area: &str, key: &str, value: Value) -> bool;
    fn clear_world_flags(&self, area: &str) -> bool;

    fn set_last_selected_role(&self, role: Option<RoleId>) -> bool;

    /// Store `from`'s live inventory and select `to`, in one write.
    fn commit_role_handoff(&self, from: RoleId, inventory: &[ItemId], to: RoleId) -> bool;
}

/// Outcome of an accessor's mutation closure.
enum Edit {
    Changed,
    Unchanged,
    Rejected,
}

pub struct SaveFacade {
    store:         Box<dyn SaveStore>,
    migrator:      SchemaMigrator,
    clock:         Rc<dyn Clock>,
    slot_id:       SlotId,
    default_areas: Vec<AreaId>,
    repairs:       Cell<u64>,
    unreadable:    Cell<bool>,
}

impl SaveFacade {
    pub fn new(store: Box<dyn SaveStore>, config: &SaveConfig) -> Self {
        Self {
            store,
            migrator:      SchemaMigrator::new(config.default_areas.clone()),
            clock:         Rc::new(SystemClock),
            slot_id:       config.slot_id.clone(),
            default_areas: config.default_areas.clone(),
            repairs:       Cell::new(0),
            unreadable:    Cell::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Aliasing repairs made on load or write since construction.
    pub fn repairs_made(&self) -> u64 {
        self.repairs.get()
    }

    fn note_repairs(&self, count: usize) {
        self.repairs.set(self.repairs.get() + count as u64);
    }

    /// Load, migrate and repair the slot. A missing slot is created and
    /// persisted; an unreadable one is reported and left alone.
    fn read_slot(&self) -> DuetResult<SaveData> {
        let raw = match self.store.load(&self.slot_id) {
            Ok(raw) => {
                self.unreadable.set(false);
                raw
            }
            Err(e) => {
                self.unreadable.set(true);
                log::error!("slot '{}': stored save is unreadable: {e}", self.slot_id);
                return Err(DuetError::UnreadableSave {
                    slot:   self.slot_id.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let Some(raw) = raw else {
            let save = SaveData::fresh(&self.slot_id, &self.default_areas);
            if !self.persist(&save) {
                log::warn!("slot '{}': fresh save could not be persisted", self.slot_id);
            }
            log::info!("slot '{}': created fresh save", self.slot_id);
            return Ok(save);
        };

        let stored_version = detect_version(&raw);
        let mut save = self.migrator.migrate(&raw, CURRENT_VERSION);
        if save.slot_id.is_empty() {
            save.slot_id = self.slot_id.clone();
        }

        let repaired = repair_aliasing(&mut save);
        if repaired > 0 {
            log::warn!("slot '{}': repaired {repaired} shared list(s) on load", self.slot_id);
            self.note_repairs(repaired);
        }
        if (repaired > 0 || stored_version < CURRENT_VERSION) && !self.persist(&save) {
            log::warn!("slot '{}': repaired save could not be persisted", self.slot_id);
        }
        Ok(save)
    }

    fn persist(&self, save: &SaveData) -> bool {
        if self.unreadable.get() {
            log::error!(
                "slot '{}': write refused, the stored save could not be read",
                self.slot_id
            );
            return false;
        }
        let aliased = audit_aliasing(save);
        if !aliased.is_empty() {
            let names: Vec<&str> = aliased.iter().map(|f| f.name()).collect();
            log::warn!(
                "slot '{}': write received roles sharing {names:?}; detaching",
                self.slot_id
            );
            self.note_repairs(aliased.len());
        }

        let mut copy = save.detached();
        copy.timestamp = self.clock.now_ms();
        if copy.slot_id.is_empty() {
            copy.slot_id = self.slot_id.clone();
        }
        let value = match serde_json::to_value(&copy) {
            Ok(value) => value,
            Err(e) => {
                log::error!("slot '{}': cannot encode save: {e}", self.slot_id);
                return false;
            }
        };
        self.store.write(&self.slot_id, &value)
    }

    fn update<F>(&self, op: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut SaveData) -> Edit,
    {
        let Ok(mut save) = self.read_slot() else {
            log::warn!("slot '{}': {op} skipped, stored save unreadable", self.slot_id);
            return false;
        };
        match mutate(&mut save) {
            Edit::Unchanged => true,
            Edit::Rejected => false,
            Edit::Changed => {
                let written = self.write_main(&save);
                if !written {
                    log::warn!("slot '{}': {op} was not persisted", self.slot_id);
                }
                written
            }
        }
    }

    fn update_role<F>(&self, op: &str, role: RoleId, mutate: F) -> bool
    where
        F: FnOnce(&mut RoleProgress) -> Edit,
    {
        let slot = self.slot_id.clone();
        self.update(op, |save| match save.role_mut(role) {
            Some(progress) => mutate(progress),
            None => {
                log::warn!("slot '{slot}': {op} skipped, role {role} has no progress");
                Edit::Rejected
            }
        })
    }

    fn read_role<T, F>(&self, role: RoleId, read: F) -> Option<T>
    where
        F: FnOnce(&RoleProgress) -> T,
    {
        self.load_main().role(role).map(read)
    }
}

impl SaveAccess for SaveFacade {
    fn slot_id(&self) -> &str {
        &self.slot_id
    }

    fn load_or_create(&self) -> SaveData {
        self.read_slot()
            .unwrap_or_else(|_| SaveData::fresh(&self.slot_id, &self.default_areas))
    }

    fn load_main(&self) -> SaveData {
        self.load_or_create()
    }

    fn try_load_main(&self) -> DuetResult<SaveData> {
        self.read_slot()
    }

    fn write_main(&self, save: &SaveData) -> bool {
        self.persist(save)
    }

    fn delete_slot(&self) {
        log::info!("slot '{}': deleted", self.slot_id);
        self.store.delete(&self.slot_id);
        self.unreadable.set(false);
    }

    fn get_inventory(&self, role: RoleId) -> Vec<ItemId> {
        self.read_role(role, |p| p.inventory.to_vec()).unwrap_or_default()
    }

    fn set_inventory(&self, role: RoleId, inventory: &[ItemId]) -> bool {
        self.update_role("set_inventory", role, |progress| {
            progress.inventory = Arc::new(inventory.to_vec());
            Edit::Changed
        })
    }

    fn get_completed_tasks(&self, role: RoleId) -> Vec<TaskId> {
        self.read_role(role, |p| p.completed_tasks.to_vec()).unwrap_or_default()
    }

    fn mark_task_complete(&self, role: RoleId, task: &str) -> bool {
        self.update_role("mark_task_complete", role, |progress| {
            if push_unique(&mut progress.completed_tasks, task) {
                Edit::Changed
            } else {
                Edit::Unchanged
            }
        })
    }

    fn get_unlocked_areas(&self, role: RoleId) -> Vec<AreaId> {
        self.read_role(role, |p| p.unlocked_areas.to_vec()).unwrap_or_default()
    }

    fn mark_area_complete(&self, role: RoleId, area: &str) -> bool {
        self.update_role("mark_area_complete", role, |progress| {
            if push_unique(&mut progress.completed_areas, area) {
                Edit::Changed
            } else {
                Edit::Unchanged
            }
        })
    }

    fn get_last_area(&self, role: RoleId) -> Option<AreaId> {
        self.read_role(role, |p| p.last_area_id.clone())
            .filter(|area| !area.is_empty())
    }

    fn set_last_area(&self, role: RoleId, area: &str) -> bool {
        self.update_role("set_last_area", role, |progress| {
            if progress.last_area_id == area {
                return Edit::Unchanged;
            }
            progress.last_area_id = area.to_string();
            Edit::Changed
        })
    }

    fn get_shared(&self) -> SharedState {
        self.load_main().shared
    }

    fn set_shared(&self, shared: &SharedState) -> bool {
        self.update("set_shared", |save| {
            save.shared = shared.clone();
            Edit::Changed
        })
    }

    fn get_world_flag(&self, area: &str, key: &str) -> Option<Value> {
        self.load_main()
            .world_flags
            .get(area)
            .and_then(|flags| flags.get(key))
            .cloned()
    }

    fn set_world_flag(&self, area: &str, key: &str, value: Value) -> bool {
        self.update("set_world_flag", |save| {
            let flags = save.world_flags.entry(area.to_string()).or_default();
            if flags.get(key) == Some(&value) {
                return Edit::Unchanged;
            }
            flags.insert(key.to_string(), value);
            Edit::Changed
        })
    }

    fn clear_world_flags(&self, area: &str) -> bool {
        self.update("clear_world_flags", |save| match save.world_flags.remove(area) {
            Some(_) => Edit::Changed,
            None => Edit::Unchanged,
        })
    }

    fn set_last_selected_role(&self, role: Option<RoleId>) -> bool {
        self.update("set_last_selected_role", |save| {
            if save.last_selected_role == role {
                return Edit::Unchanged;
            }
            save.last_selected_role = role;
            Edit::Changed
        })
    }

    fn commit_role_handoff(&self, from: RoleId, inventory: &[ItemId], to: RoleId) -> bool {
        let slot = self.slot_id.clone();
        self.update("commit_role_handoff", |save| {
            let Some(progress) = save.role_mut(from) else {
                log::warn!("slot '{slot}': handoff skipped, role {from} has no progress");
                return Edit::Rejected;
            };
            progress.inventory = Arc::new(inventory.to_vec());
            save.last_selected_role = Some(to);
            Edit::Changed
        })
    }
}
