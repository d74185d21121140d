//! The persisted save shape (schema version 4).
//!
//! Per-role list fields are copy-on-write buffers (`IdList`). A derived
//! `Clone` shares those buffers, which is cheap but means two roles can end up
//! pointing at the same allocation. `SaveData::detached()` is the structural
//! clone that gives every tracked list its own buffer; the migrator and the
//! facade use it (and `repair_aliasing`) so the two roles never share one.

use crate::types::{AreaId, ItemId, RoleId, SlotId, TimestampMs};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Current persisted schema version.
pub const CURRENT_VERSION: u32 = 4;

/// A shared, copy-on-write list of ids. Mutate through `Arc::make_mut`.
pub type IdList = Arc<Vec<String>>;

/// Per-area flag storage: area -> key -> arbitrary JSON value.
pub type WorldFlags = BTreeMap<AreaId, BTreeMap<String, Value>>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleProgress {
    pub unlocked_areas:  IdList,
    pub completed_areas: IdList,
    pub completed_tasks: IdList,
    pub inventory:       IdList,
    pub last_area_id:    AreaId,
}

impl RoleProgress {
    /// Progress for a role that has just started: every default area unlocked,
    /// standing in the first one.
    pub fn fresh(default_areas: &[AreaId]) -> Self {
        Self {
            unlocked_areas:  Arc::new(default_areas.to_vec()),
            completed_areas: IdList::default(),
            completed_tasks: IdList::default(),
            inventory:       IdList::default(),
            last_area_id:    default_areas.first().cloned().unwrap_or_default(),
        }
    }

    /// Copy with a fresh buffer behind every tracked list.
    pub fn detached(&self) -> Self {
        Self {
            unlocked_areas:  Arc::new(self.unlocked_areas.to_vec()),
            completed_areas: Arc::new(self.completed_areas.to_vec()),
            completed_tasks: Arc::new(self.completed_tasks.to_vec()),
            inventory:       Arc::new(self.inventory.to_vec()),
            last_area_id:    self.last_area_id.clone(),
        }
    }
}

/// The list-valued fields of `RoleProgress` covered by the anti-aliasing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedField {
    UnlockedAreas,
    CompletedAreas,
    CompletedTasks,
    Inventory,
}

impl TrackedField {
    pub const ALL: [TrackedField; 4] = [
        TrackedField::UnlockedAreas,
        TrackedField::CompletedAreas,
        TrackedField::CompletedTasks,
        TrackedField::Inventory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::UnlockedAreas  => "unlockedAreas",
            Self::CompletedAreas => "completedAreas",
            Self::CompletedTasks => "completedTasks",
            Self::Inventory      => "inventory",
        }
    }

    pub fn get(self, progress: &RoleProgress) -> &IdList {
        match self {
            Self::UnlockedAreas  => &progress.unlocked_areas,
            Self::CompletedAreas => &progress.completed_areas,
            Self::CompletedTasks => &progress.completed_tasks,
            Self::Inventory      => &progress.inventory,
        }
    }

    pub fn get_mut(self, progress: &mut RoleProgress) -> &mut IdList {
        match self {
            Self::UnlockedAreas  => &mut progress.unlocked_areas,
            Self::CompletedAreas => &mut progress.completed_areas,
            Self::CompletedTasks => &mut progress.completed_tasks,
            Self::Inventory      => &mut progress.inventory,
        }
    }
}

/// Collectibles and unlocks visible to both roles.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SharedState {
    /// Items found per area.
    pub finds:         BTreeMap<AreaId, Vec<ItemId>>,
    pub trophies:      Vec<String>,
    pub postcards:     Vec<String>,
    pub audio_unlocks: Vec<String>,
    pub camp_upgrades: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveData {
    pub version:            u32,
    pub timestamp:          TimestampMs,
    pub slot_id:            SlotId,
    pub roles:              BTreeMap<RoleId, RoleProgress>,
    pub last_selected_role: Option<RoleId>,
    pub shared:             SharedState,
    pub world_flags:        WorldFlags,
}

impl SaveData {
    /// The default save for a slot that has never been written.
    pub fn fresh(slot_id: &str, default_areas: &[AreaId]) -> Self {
        let roles = RoleId::ALL
            .iter()
            .map(|role| (*role, RoleProgress::fresh(default_areas)))
            .collect();
        Self {
            version:            CURRENT_VERSION,
            timestamp:          0,
            slot_id:            slot_id.to_string(),
            roles,
            last_selected_role: None,
            shared:             SharedState::default(),
            world_flags:        WorldFlags::new(),
        }
    }

    /// An empty save at `version` with no role containers. Migration fills it.
    pub(crate) fn empty(version: u32) -> Self {
        Self {
            version,
            timestamp:          0,
            slot_id:            String::new(),
            roles:              BTreeMap::new(),
            last_selected_role: None,
            shared:             SharedState::default(),
            world_flags:        WorldFlags::new(),
        }
    }

    pub fn role(&self, role: RoleId) -> Option<&RoleProgress> {
        self.roles.get(&role)
    }

    pub fn role_mut(&mut self, role: RoleId) -> Option<&mut RoleProgress> {
        self.roles.get_mut(&role)
    }

    /// Structural clone: same values, no buffer shared with `self`.
    pub fn detached(&self) -> Self {
        Self {
            version:            self.version,
            timestamp:          self.timestamp,
            slot_id:            self.slot_id.clone(),
            roles:              self
                .roles
                .iter()
                .map(|(role, progress)| (*role, progress.detached()))
                .collect(),
            last_selected_role: self.last_selected_role,
            shared:             self.shared.clone(),
            world_flags:        self.world_flags.clone(),
        }
    }

    /// Roles with no progress container.
    pub fn missing_roles(&self) -> Vec<RoleId> {
        RoleId::ALL
            .iter()
            .copied()
            .filter(|role| !self.roles.contains_key(role))
            .collect()
    }
}

/// Append `id` unless already present. Returns true if the list changed.
pub fn push_unique(list: &mut IdList, id: &str) -> bool {
    if list.iter().any(|existing| existing == id) {
        return false;
    }
    Arc::make_mut(list).push(id.to_string());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn areas() -> Vec<AreaId> {
        vec!["meadow".into(), "lake".into()]
    }

    #[test]
    fn fresh_save_unlocks_default_areas_for_both_roles() {
        let save = SaveData::fresh("main", &areas());
        assert_eq!(save.version, CURRENT_VERSION);
        assert_eq!(save.last_selected_role, None);
        for role in RoleId::ALL {
            let progress = save.role(role).expect("role present");
            assert_eq!(progress.unlocked_areas.as_slice(), areas().as_slice());
            assert_eq!(progress.last_area_id, "meadow");
        }
    }

    #[test]
    fn derived_clone_shares_buffers_but_detached_does_not() {
        let save = SaveData::fresh("main", &areas());
        let shallow = save.clone();
        let deep = save.detached();
        let a = save.role(RoleId::A).unwrap();
        assert!(Arc::ptr_eq(&a.unlocked_areas, &shallow.role(RoleId::A).unwrap().unlocked_areas));
        assert!(!Arc::ptr_eq(&a.unlocked_areas, &deep.role(RoleId::A).unwrap().unlocked_areas));
        assert_eq!(save, deep);
    }

    #[test]
    fn push_unique_ignores_duplicates() {
        let mut list = IdList::default();
        assert!(push_unique(&mut list, "t1"));
        assert!(!push_unique(&mut list, "t1"));
        assert_eq!(list.as_slice(), ["t1".to_string()]);
    }

    #[test]
    fn serialises_with_camel_case_keys() {
        let save = SaveData::fresh("main", &areas());
        let json = serde_json::to_value(&save).unwrap();
        assert_eq!(json["slotId"], "main");
        assert!(json["roles"]["A"]["unlockedAreas"].is_array());
        assert!(json["lastSelectedRole"].is_null());
    }
}
