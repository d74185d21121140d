//! Area task-queue progression.
//!
//! Each area has a fixed, ordered task queue. A role resumes at the first
//! task in its current area that it has not completed. When none remain,
//! the area is marked complete.

use crate::{
    config::SaveConfig,
    error::{DuetError, DuetResult},
    facade::SaveAccess,
    subsystem::ProgressionSystem,
    types::{AreaId, RoleId, TaskId},
};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePosition {
    pub role:          RoleId,
    pub area:          AreaId,
    /// Index of the next task; equals the queue length once the area is done.
    pub index:         usize,
    pub area_complete: bool,
}

pub struct AreaProgression {
    saves:    Rc<dyn SaveAccess>,
    config:   SaveConfig,
    position: Option<QueuePosition>,
}

impl AreaProgression {
    pub fn new(saves: Rc<dyn SaveAccess>, config: &SaveConfig) -> Self {
        Self {
            saves,
            config: config.clone(),
            position: None,
        }
    }

    pub fn position(&self) -> Option<&QueuePosition> {
        self.position.as_ref()
    }

    pub fn current_task(&self) -> Option<&str> {
        let position = self.position.as_ref()?;
        self.config
            .tasks_for(&position.area)
            .get(position.index)
            .map(String::as_str)
    }

    /// Complete the current task and move to the next one. Returns the task
    /// that was completed, if any.
    pub fn complete_current(&mut self) -> DuetResult<Option<TaskId>> {
        let Some(task) = self.current_task().map(str::to_string) else {
            return Ok(None);
        };
        let Some(role) = self.position.as_ref().map(|p| p.role) else {
            return Ok(None);
        };
        if !self.saves.mark_task_complete(role, &task) {
            return Err(DuetError::StorageWrite {
                slot: self.saves.slot_id().to_string(),
            });
        }
        self.load_queue(role)?;
        Ok(Some(task))
    }

    fn load_queue(&mut self, role: RoleId) -> DuetResult<()> {
        let area = match self.saves.get_last_area(role) {
            Some(area) => area,
            None => {
                let start = self.config.starting_area();
                if start.is_empty() {
                    return Err(DuetError::Collaborator {
                        system:  "progression",
                        message: format!("role {role} has no current area"),
                    });
                }
                log::warn!("role {role} has no current area; starting at '{start}'");
                start.to_string()
            }
        };
        let completed = self.saves.get_completed_tasks(role);
        let queue = self.config.tasks_for(&area);

        let position = match queue.iter().position(|task| !completed.contains(task)) {
            Some(index) => QueuePosition {
                role,
                area,
                index,
                area_complete: false,
            },
            None => {
                let index = queue.len();
                if !self.saves.mark_area_complete(role, &area) {
                    return Err(DuetError::StorageWrite {
                        slot: self.saves.slot_id().to_string(),
                    });
                }
                log::info!("role {role} finished area '{area}'");
                QueuePosition {
                    role,
                    area,
                    index,
                    area_complete: true,
                }
            }
        };
        log::debug!(
            "progression: role {role} at '{}' task #{}",
            position.area,
            position.index
        );
        self.position = Some(position);
        Ok(())
    }
}

impl ProgressionSystem for AreaProgression {
    fn switch_role(&mut self, role: RoleId) -> DuetResult<()> {
        self.load_queue(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::SaveFacade;
    use crate::store::SqliteSaveStore;

    fn build() -> (Rc<SaveFacade>, AreaProgression) {
        let config = SaveConfig::default_test();
        let store = SqliteSaveStore::in_memory().expect("in-memory store");
        let saves = Rc::new(SaveFacade::new(Box::new(store), &config));
        let progression = AreaProgression::new(saves.clone(), &config);
        (saves, progression)
    }

    #[test]
    fn resumes_at_first_uncompleted_task() {
        let (saves, mut progression) = build();
        assert!(saves.mark_task_complete(RoleId::B, "gather_sticks"));

        progression.switch_role(RoleId::B).unwrap();
        assert_eq!(progression.current_task(), Some("build_fire"));

        progression.switch_role(RoleId::A).unwrap();
        assert_eq!(progression.current_task(), Some("gather_sticks"));
    }

    #[test]
    fn finishing_the_queue_marks_area_complete() {
        let (saves, mut progression) = build();
        assert!(saves.set_last_area(RoleId::A, "forest"));
        progression.switch_role(RoleId::A).unwrap();
        assert_eq!(progression.complete_current().unwrap(), Some("find_owl".to_string()));

        let position = progression.position().unwrap();
        assert!(position.area_complete);
        assert_eq!(progression.current_task(), None);
        assert_eq!(
            saves.load_main().role(RoleId::A).unwrap().completed_areas.as_slice(),
            ["forest".to_string()]
        );
        assert!(saves.load_main().role(RoleId::B).unwrap().completed_areas.is_empty());
    }

    #[test]
    fn role_without_an_area_starts_at_the_first_default_area() {
        let (saves, mut progression) = build();
        assert!(saves.set_last_area(RoleId::B, ""));
        assert_eq!(saves.get_last_area(RoleId::B), None);

        progression.switch_role(RoleId::B).unwrap();
        assert_eq!(progression.position().unwrap().area, "meadow");
        assert_eq!(progression.current_task(), Some("gather_sticks"));
    }
}
