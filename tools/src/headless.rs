//! Headless stand-ins for the game-side subsystems, so a switch can be run
//! against a real save file from the command line.

use duet_core::{
    error::DuetResult,
    facade::SaveAccess,
    invariant::PlayerEntity,
    subsystem::{InteractionSystem, TaskSystem, World},
    types::{ItemId, RoleId},
};

pub struct HeadlessTasks {
    role:      RoleId,
    inventory: Vec<ItemId>,
}

impl HeadlessTasks {
    /// Start as `role` holding whatever the save has for it.
    pub fn load(saves: &dyn SaveAccess, role: RoleId) -> Self {
        Self {
            role,
            inventory: saves.get_inventory(role),
        }
    }
}

impl TaskSystem for HeadlessTasks {
    fn inventory(&self) -> Vec<ItemId> {
        self.inventory.clone()
    }

    fn switch_character(&mut self, role: RoleId, inventory: Vec<ItemId>) -> DuetResult<()> {
        self.role = role;
        self.inventory = inventory;
        Ok(())
    }

    fn current_role(&self) -> RoleId {
        self.role
    }
}

pub struct HeadlessWorld {
    active: RoleId,
}

impl HeadlessWorld {
    pub fn new(active: RoleId) -> Self {
        Self { active }
    }
}

impl World for HeadlessWorld {
    fn set_active_role(&mut self, role: RoleId) -> DuetResult<()> {
        self.active = role;
        Ok(())
    }

    fn player_entity(&self, role: RoleId) -> PlayerEntity {
        let live = role == self.active;
        PlayerEntity {
            id: format!("player_{}", role.as_str().to_lowercase()),
            role,
            active: live,
            pickable: live,
            collidable: live,
        }
    }
}

/// No proximity triggers without a scene.
pub struct NoInteraction;

impl InteractionSystem for NoInteraction {
    fn clear_dwell(&mut self) -> DuetResult<()> {
        Ok(())
    }
}
