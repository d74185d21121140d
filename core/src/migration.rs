//! Schema migration for persisted save blobs.
//!
//! Version history:
//!   v0  ad hoc, unversioned (`progress.{tasks,items,area}` or bare `tasks`/`items`)
//!   v1  single progress record, no roles
//!   v2  per-role progress under `roles`
//!   v3  every default area unlocked for every role
//!   v4  `shared` collectibles, `worldFlags`, validated `lastSelectedRole`
//!
//! RULES:
//!   - Steps run strictly in order from `version + 1` to the target. A blob
//!     already past the target is never downgraded.
//!   - The typed model starts at v2. A lower target is raised to v2, since a
//!     v0/v1 progress record has nowhere to live in `SaveData`.
//!   - Every field is read defensively; anything missing or malformed becomes
//!     a typed default.
//!   - `repair_aliasing` runs after every step.

use crate::{
    save_data::{IdList, RoleProgress, SaveData, SharedState, TrackedField, WorldFlags},
    types::{AreaId, RoleId},
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Oldest version `migrate` can emit.
pub const FIRST_ROLE_VERSION: u32 = 2;

pub struct SchemaMigrator {
    default_areas: Vec<AreaId>,
}

/// Single pre-role progress record (v0/v1).
#[derive(Debug, Default)]
struct LegacyProgress {
    completed_tasks: Vec<String>,
    inventory:       Vec<String>,
    unlocked_areas:  Vec<String>,
    completed_areas: Vec<String>,
    last_area_id:    Option<String>,
}

struct Working {
    save:   SaveData,
    legacy: LegacyProgress,
    source: Map<String, Value>,
}

impl SchemaMigrator {
    pub fn new(default_areas: Vec<AreaId>) -> Self {
        Self { default_areas }
    }

    /// Upgrade `raw` to `target`. The caller's value is never mutated or
    /// referenced by the result.
    pub fn migrate(&self, raw: &Value, target: u32) -> SaveData {
        let source = raw.as_object().cloned().unwrap_or_default();
        let from = detect_version(raw);
        let mut working = lift(source, from);

        let target = if target < FIRST_ROLE_VERSION {
            log::warn!("target v{target} predates per-role saves; migrating to v{FIRST_ROLE_VERSION}");
            FIRST_ROLE_VERSION
        } else {
            target
        };

        if from > target {
            log::warn!("save version {from} is newer than target {target}; leaving as-is");
            return working.save;
        }

        for version in (from + 1)..=target {
            self.apply_step(version, &mut working);
            working.save.version = version;
            let repaired = repair_aliasing(&mut working.save);
            if repaired > 0 {
                log::debug!("migration v{version}: detached {repaired} shared list(s)");
            }
        }

        if from < target {
            log::info!("migrated save '{}' v{from} -> v{target}", working.save.slot_id);
        }
        working.save
    }

    fn apply_step(&self, version: u32, working: &mut Working) {
        match version {
            1 => self.to_v1(working),
            2 => self.to_v2(working),
            3 => self.to_v3(working),
            4 => self.to_v4(working),
            other => log::warn!("no migration step for v{other}; version bumped only"),
        }
    }

    /// Fold ad hoc v0 fields into the single progress record.
    fn to_v1(&self, working: &mut Working) {
        let source = &working.source;
        let legacy = &mut working.legacy;
        let scopes = [source.get("progress").and_then(Value::as_object), Some(source)];
        for scope in scopes.into_iter().flatten() {
            merge_unique(&mut legacy.completed_tasks, string_vec(scope.get("tasks")));
            merge_unique(&mut legacy.inventory, string_vec(scope.get("items")));
            if legacy.last_area_id.is_none() {
                legacy.last_area_id = non_empty_str(scope.get("area"));
            }
        }
    }

    /// Introduce per-role progress. Missing roles start from the single
    /// legacy record.
    fn to_v2(&self, working: &mut Working) {
        let legacy = &working.legacy;
        let seed = RoleProgress {
            unlocked_areas:  Arc::new(legacy.unlocked_areas.clone()),
            completed_areas: Arc::new(legacy.completed_areas.clone()),
            completed_tasks: Arc::new(legacy.completed_tasks.clone()),
            inventory:       Arc::new(legacy.inventory.clone()),
            last_area_id:    legacy.last_area_id.clone().unwrap_or_default(),
        };
        for role in RoleId::ALL {
            working.save.roles.entry(role).or_insert_with(|| seed.clone());
        }
    }

    fn to_v3(&self, working: &mut Working) {
        for progress in working.save.roles.values_mut() {
            let missing: Vec<&AreaId> = self
                .default_areas
                .iter()
                .filter(|area| !progress.unlocked_areas.contains(*area))
                .collect();
            if !missing.is_empty() {
                Arc::make_mut(&mut progress.unlocked_areas).extend(missing.into_iter().cloned());
            }
        }
    }

    fn to_v4(&self, working: &mut Working) {
        let source = &working.source;
        let shared = &mut working.save.shared;
        if let Some(finds) = source.get("finds").and_then(Value::as_object) {
            for (area, items) in finds {
                merge_unique(shared.finds.entry(area.clone()).or_default(), string_vec(Some(items)));
            }
        }
        merge_unique(&mut shared.trophies, string_vec(source.get("trophies")));
        merge_unique(&mut shared.postcards, string_vec(source.get("postcards")));
        merge_unique(&mut shared.audio_unlocks, string_vec(source.get("audioUnlocks")));
        merge_unique(&mut shared.camp_upgrades, string_vec(source.get("campUpgrades")));

        let fallback = self.default_areas.first().cloned().unwrap_or_default();
        for progress in working.save.roles.values_mut() {
            if progress.last_area_id.is_empty() {
                progress.last_area_id = progress
                    .unlocked_areas
                    .first()
                    .cloned()
                    .unwrap_or_else(|| fallback.clone());
            }
        }
    }
}

/// Persisted version of a raw blob; 0 when absent or not a non-negative integer.
pub fn detect_version(raw: &Value) -> u32 {
    raw.get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}

/// Tracked fields whose buffer is shared between the two roles.
pub fn audit_aliasing(save: &SaveData) -> Vec<TrackedField> {
    match (save.role(RoleId::A), save.role(RoleId::B)) {
        (Some(a), Some(b)) => TrackedField::ALL
            .iter()
            .copied()
            .filter(|field| Arc::ptr_eq(field.get(a), field.get(b)))
            .collect(),
        _ => Vec::new(),
    }
}

/// Give role B its own buffer for every list it shares with role A.
/// Idempotent. Returns the number of lists detached.
pub fn repair_aliasing(save: &mut SaveData) -> usize {
    let aliased = audit_aliasing(save);
    if let Some(b) = save.role_mut(RoleId::B) {
        for field in &aliased {
            let list = field.get_mut(b);
            *list = Arc::new(list.to_vec());
        }
    }
    aliased.len()
}

// ── Lenient readers ────────────────────────────────────────────

fn lift(source: Map<String, Value>, version: u32) -> Working {
    let mut save = SaveData::empty(version);
    save.timestamp = source.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
    save.slot_id = non_empty_str(source.get("slotId")).unwrap_or_default();
    save.roles = lift_roles(source.get("roles"));
    save.last_selected_role = source
        .get("lastSelectedRole")
        .and_then(Value::as_str)
        .and_then(RoleId::parse);
    save.shared = lift_shared(source.get("shared"));
    save.world_flags = lift_world_flags(source.get("worldFlags"));

    let legacy = LegacyProgress {
        completed_tasks: string_vec(source.get("completedTasks")),
        inventory:       string_vec(source.get("inventory")),
        unlocked_areas:  string_vec(source.get("unlockedAreas")),
        completed_areas: string_vec(source.get("completedAreas")),
        last_area_id:    non_empty_str(source.get("lastAreaId")),
    };
    Working { save, legacy, source }
}

fn lift_roles(value: Option<&Value>) -> BTreeMap<RoleId, RoleProgress> {
    let Some(roles) = value.and_then(Value::as_object) else {
        return BTreeMap::new();
    };
    roles
        .iter()
        .filter_map(|(key, progress)| {
            let role = RoleId::parse(key)?;
            let progress = progress.as_object()?;
            Some((role, lift_progress(progress)))
        })
        .collect()
}

fn lift_progress(map: &Map<String, Value>) -> RoleProgress {
    RoleProgress {
        unlocked_areas:  id_list(map.get("unlockedAreas")),
        completed_areas: id_list(map.get("completedAreas")),
        completed_tasks: id_list(map.get("completedTasks")),
        inventory:       id_list(map.get("inventory")),
        last_area_id:    non_empty_str(map.get("lastAreaId")).unwrap_or_default(),
    }
}

fn lift_shared(value: Option<&Value>) -> SharedState {
    let Some(map) = value.and_then(Value::as_object) else {
        return SharedState::default();
    };
    let finds = map
        .get("finds")
        .and_then(Value::as_object)
        .map(|finds| {
            finds
                .iter()
                .map(|(area, items)| (area.clone(), string_vec(Some(items))))
                .collect()
        })
        .unwrap_or_default();
    SharedState {
        finds,
        trophies:      string_vec(map.get("trophies")),
        postcards:     string_vec(map.get("postcards")),
        audio_unlocks: string_vec(map.get("audioUnlocks")),
        camp_upgrades: string_vec(map.get("campUpgrades")),
    }
}

fn lift_world_flags(value: Option<&Value>) -> WorldFlags {
    let Some(map) = value.and_then(Value::as_object) else {
        return WorldFlags::new();
    };
    map.iter()
        .filter_map(|(area, flags)| {
            let flags = flags.as_object()?;
            Some((area.clone(), flags.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
        })
        .collect()
}

/// Strings from a JSON array; non-arrays give an empty list and non-string
/// entries are dropped.
fn string_vec(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn id_list(value: Option<&Value>) -> IdList {
    Arc::new(string_vec(value))
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn merge_unique(into: &mut Vec<String>, from: Vec<String>) {
    for item in from {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}
