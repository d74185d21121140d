use crate::{
    invariant::InvariantPolicy,
    types::{AreaId, RoleId, SlotId, TaskId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutosaveConfig {
    /// Periodic save interval while not paused.
    pub interval_ms: i64,
    /// Quiet period after the last save request before a debounced save fires.
    pub debounce_ms: i64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            debounce_ms: 1_500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveConfig {
    #[serde(default = "default_slot_id")]
    pub slot_id: SlotId,
    /// Areas unlocked for both roles on a fresh save. The first entry is the
    /// starting area.
    pub default_areas: Vec<AreaId>,
    /// Ordered task queue per area.
    #[serde(default)]
    pub area_tasks: BTreeMap<AreaId, Vec<TaskId>>,
    #[serde(default)]
    pub invariant_policy: InvariantPolicy,
    #[serde(default)]
    pub autosave: AutosaveConfig,
    #[serde(default = "default_initial_role")]
    pub initial_role: RoleId,
}

fn default_slot_id() -> SlotId {
    "main".to_string()
}

fn default_initial_role() -> RoleId {
    RoleId::A
}

impl SaveConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: SaveConfig = serde_json::from_str(&content)?;
        if config.default_areas.is_empty() {
            anyhow::bail!("{path}: default_areas must name at least one area");
        }
        Ok(config)
    }

    /// The area a role starts in when nothing else is recorded.
    pub fn starting_area(&self) -> &str {
        self.default_areas.first().map(String::as_str).unwrap_or("")
    }

    pub fn tasks_for(&self, area: &str) -> &[TaskId] {
        self.area_tasks.get(area).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Small fixed configuration used throughout the test suite.
    pub fn default_test() -> Self {
        let mut area_tasks = BTreeMap::new();
        area_tasks.insert(
            "meadow".to_string(),
            vec!["gather_sticks".into(), "build_fire".into(), "find_map".into()],
        );
        area_tasks.insert(
            "lake".to_string(),
            vec!["fix_boat".into(), "cross_lake".into()],
        );
        area_tasks.insert("forest".to_string(), vec!["find_owl".into()]);
        Self {
            slot_id: default_slot_id(),
            default_areas: vec!["meadow".into(), "lake".into(), "forest".into()],
            area_tasks,
            invariant_policy: InvariantPolicy::Strict,
            autosave: AutosaveConfig::default(),
            initial_role: RoleId::A,
        }
    }
}
