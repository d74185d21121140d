//! Character switch orchestrator tests.
//!
//! The world, task, interaction and autosave subsystems are small fakes that
//! record what they were told; progression is the real AreaProgression.

use duet_core::{
    autosave::AutosaveScheduler,
    clock::ManualClock,
    config::SaveConfig,
    error::{DuetError, DuetResult},
    event::{EventQueue, GameEvent, ToastLevel},
    facade::{SaveAccess, SaveFacade},
    invariant::{InvariantChecker, InvariantPolicy, PlayerEntity},
    orchestrator::{CharacterSwitchOrchestrator, SwitchOutcome},
    progression::AreaProgression,
    store::{SaveStore, SqliteSaveStore},
    subsystem::{
        AutosaveSystem, Collaborators, InteractionSystem, ProgressionSystem, TaskSystem, World,
    },
    switch_context::SwitchContext,
    types::{ItemId, RoleId},
};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

// ── Fakes ──────────────────────────────────────────────────────

struct FakeTasks {
    role:      RoleId,
    inventory: Vec<ItemId>,
    switches:  u32,
}

impl TaskSystem for FakeTasks {
    fn inventory(&self) -> Vec<ItemId> {
        self.inventory.clone()
    }
    fn switch_character(&mut self, role: RoleId, inventory: Vec<ItemId>) -> DuetResult<()> {
        self.role = role;
        self.inventory = inventory;
        self.switches += 1;
        Ok(())
    }
    fn current_role(&self) -> RoleId {
        self.role
    }
}

#[derive(Default)]
struct FakeWorld {
    active:          Option<RoleId>,
    fail_on_swap:    bool,
    leave_both_live: bool,
    reenter:         Option<Weak<CharacterSwitchOrchestrator>>,
    reentry:         Option<SwitchOutcome>,
    seen_switching:  Option<Rc<SwitchContext>>,
    was_switching:   bool,
}

impl World for FakeWorld {
    fn set_active_role(&mut self, role: RoleId) -> DuetResult<()> {
        if let Some(ctx) = &self.seen_switching {
            self.was_switching = ctx.is_switching();
        }
        if let Some(orchestrator) = self.reenter.as_ref().and_then(Weak::upgrade) {
            self.reentry = Some(orchestrator.switch_to(role.other()));
        }
        if self.fail_on_swap {
            return Err(DuetError::Collaborator {
                system:  "world",
                message: "player entity missing".into(),
            });
        }
        self.active = Some(role);
        Ok(())
    }

    fn player_entity(&self, role: RoleId) -> PlayerEntity {
        let live = self.leave_both_live || self.active == Some(role);
        PlayerEntity {
            id: format!("player_{}", role.as_str().to_lowercase()),
            role,
            active: live,
            pickable: live,
            collidable: live,
        }
    }
}

#[derive(Default)]
struct FakeInteraction {
    clears: u32,
}

impl InteractionSystem for FakeInteraction {
    fn clear_dwell(&mut self) -> DuetResult<()> {
        self.clears += 1;
        Ok(())
    }
}

#[derive(Default)]
struct FakeAutosave {
    paused:  bool,
    pending: bool,
    forced:  u32,
    role:    Option<RoleId>,
}

impl AutosaveSystem for FakeAutosave {
    fn pause(&mut self) {
        self.paused = true;
    }
    fn resume(&mut self) {
        self.paused = false;
    }
    fn cancel_pending(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }
    fn force_save(&mut self) -> bool {
        self.forced += 1;
        true
    }
    fn set_role(&mut self, role: RoleId) {
        self.role = Some(role);
    }
}

/// Store whose writes, or reads, can be switched off.
struct FlakyStore {
    inner:      SqliteSaveStore,
    broken:     Rc<Cell<bool>>,
    unreadable: Rc<Cell<bool>>,
}

impl SaveStore for FlakyStore {
    fn load(&self, slot: &str) -> DuetResult<Option<Value>> {
        if self.unreadable.get() {
            return Err(DuetError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                Some("database is locked".into()),
            )));
        }
        self.inner.load(slot)
    }
    fn write(&self, slot: &str, data: &Value) -> bool {
        !self.broken.get() && self.inner.write(slot, data)
    }
    fn delete(&self, slot: &str) {
        self.inner.delete(slot)
    }
}

// ── Harness ────────────────────────────────────────────────────

struct Harness {
    saves:        Rc<SaveFacade>,
    store:        Rc<FlakyStore>,
    context:      Rc<SwitchContext>,
    tasks:        Rc<RefCell<FakeTasks>>,
    world:        Rc<RefCell<FakeWorld>>,
    interaction:  Rc<RefCell<FakeInteraction>>,
    autosave:     Rc<RefCell<FakeAutosave>>,
    progression:  Rc<RefCell<AreaProgression>>,
    events:       Rc<RefCell<EventQueue>>,
    orchestrator: Rc<CharacterSwitchOrchestrator>,
}

fn harness(policy: InvariantPolicy) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = SaveConfig::default_test();
    let store = Rc::new(FlakyStore {
        inner:      SqliteSaveStore::in_memory().expect("in-memory store"),
        broken:     Rc::new(Cell::new(false)),
        unreadable: Rc::new(Cell::new(false)),
    });
    let saves = Rc::new(SaveFacade::new(Box::new(store.clone()), &config));
    saves.load_or_create();

    let context = Rc::new(SwitchContext::new());
    let tasks = Rc::new(RefCell::new(FakeTasks {
        role:      RoleId::A,
        inventory: vec!["stick".into(), "shell".into()],
        switches:  0,
    }));
    let world = Rc::new(RefCell::new(FakeWorld {
        active: Some(RoleId::A),
        ..FakeWorld::default()
    }));
    let interaction = Rc::new(RefCell::new(FakeInteraction::default()));
    let autosave = Rc::new(RefCell::new(FakeAutosave::default()));
    let progression = Rc::new(RefCell::new(AreaProgression::new(saves.clone(), &config)));
    let events = Rc::new(RefCell::new(EventQueue::new()));

    let systems = Collaborators {
        tasks:       Box::new(tasks.clone()),
        progression: Box::new(progression.clone()),
        interaction: Box::new(interaction.clone()),
        autosave:    Box::new(autosave.clone()),
        world:       Box::new(world.clone()),
        events:      Box::new(events.clone()),
    };
    let orchestrator = Rc::new(CharacterSwitchOrchestrator::new(
        saves.clone(),
        context.clone(),
        InvariantChecker::new(policy),
        systems,
    ));

    Harness {
        saves,
        store,
        context,
        tasks,
        world,
        interaction,
        autosave,
        progression,
        events,
        orchestrator,
    }
}

fn toasts(h: &Harness, level: ToastLevel) -> usize {
    h.events
        .borrow()
        .pending()
        .iter()
        .filter(|e| matches!(e, GameEvent::Toast { level: l, .. } if *l == level))
        .count()
}

// ── Tests ──────────────────────────────────────────────────────

#[test]
fn switch_from_fresh_slot_commits_everywhere() {
    let h = harness(InvariantPolicy::Strict);
    assert_eq!(h.saves.load_main().last_selected_role, None);

    let outcome = h.orchestrator.switch_to(RoleId::B);
    assert_eq!(
        outcome,
        SwitchOutcome::Committed { seq: 1, from: RoleId::A, to: RoleId::B }
    );

    let save = h.saves.load_main();
    assert_eq!(save.last_selected_role, Some(RoleId::B));
    assert_eq!(
        save.role(RoleId::A).unwrap().inventory.as_slice(),
        ["stick".to_string(), "shell".to_string()]
    );

    assert_eq!(h.tasks.borrow().role, RoleId::B);
    assert!(h.tasks.borrow().inventory.is_empty());
    assert_eq!(h.world.borrow().active, Some(RoleId::B));
    assert_eq!(h.progression.borrow().current_task(), Some("gather_sticks"));
    assert_eq!(h.progression.borrow().position().unwrap().role, RoleId::B);
    assert_eq!(h.interaction.borrow().clears, 2);
    assert_eq!(h.orchestrator.checker().violations(), 0);

    let autosave = h.autosave.borrow();
    assert!(!autosave.paused);
    assert_eq!(autosave.role, Some(RoleId::B));
    assert_eq!(autosave.forced, 1);

    assert!(!h.context.is_switching());
    assert_eq!(h.orchestrator.active_role(), Some(RoleId::B));
    let events = h.events.borrow();
    assert_eq!(
        events.pending()[0],
        GameEvent::RoleChanged { from: RoleId::A, to: RoleId::B, seq: 1 }
    );
    drop(events);
    assert_eq!(toasts(&h, ToastLevel::Info), 1);
    assert_eq!(toasts(&h, ToastLevel::Error), 0);
}

#[test]
fn switching_back_restores_each_roles_inventory() {
    let h = harness(InvariantPolicy::Strict);
    assert!(h.orchestrator.switch_to(RoleId::B).is_committed());
    h.tasks.borrow_mut().inventory.push("feather".into());

    assert!(h.orchestrator.switch_to(RoleId::A).is_committed());
    assert_eq!(h.tasks.borrow().inventory, vec!["stick".to_string(), "shell".to_string()]);
    assert_eq!(h.saves.get_inventory(RoleId::B), vec!["feather".to_string()]);
    assert_eq!(h.context.seq(), 2);
}

#[test]
fn switching_to_active_role_changes_nothing() {
    let h = harness(InvariantPolicy::Strict);
    h.progression.borrow_mut().switch_role(RoleId::A).unwrap();
    let position = h.progression.borrow().position().cloned();
    let before = h.saves.load_main();

    assert_eq!(h.orchestrator.switch_to(RoleId::A), SwitchOutcome::Unchanged);

    assert_eq!(h.saves.load_main(), before);
    assert_eq!(h.progression.borrow().position().cloned(), position);
    assert_eq!(h.world.borrow().active, Some(RoleId::A));
    assert_eq!(h.tasks.borrow().switches, 0);
    assert_eq!(h.context.seq(), 0);
    assert!(h.events.borrow().pending().is_empty());
}

#[test]
fn world_failure_aborts_but_always_cleans_up() {
    let h = harness(InvariantPolicy::Strict);
    h.world.borrow_mut().fail_on_swap = true;
    h.autosave.borrow_mut().pending = true;

    let outcome = h.orchestrator.switch_to(RoleId::B);
    assert!(matches!(outcome, SwitchOutcome::Aborted { seq: 1, .. }));

    assert!(!h.autosave.borrow().paused, "autosave left paused");
    assert!(!h.context.is_switching());
    assert_eq!(toasts(&h, ToastLevel::Error), 1);
    assert_eq!(toasts(&h, ToastLevel::Info), 0);
    // The cancelled debounced save is replaced by a forced one.
    assert_eq!(h.autosave.borrow().forced, 1);
    // Persisted selection and autosave both follow whatever the task
    // system ended up on.
    let live = h.tasks.borrow().role;
    assert_eq!(h.saves.load_main().last_selected_role, Some(live));
    assert_eq!(h.autosave.borrow().role, Some(live));
}

#[test]
fn aborted_switch_never_saves_one_roles_items_under_the_other() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = SaveConfig::default_test();
    let saves = Rc::new(SaveFacade::new(
        Box::new(SqliteSaveStore::in_memory().expect("in-memory store")),
        &config,
    ));
    saves.load_or_create();

    let tasks = Rc::new(RefCell::new(FakeTasks {
        role:      RoleId::A,
        inventory: vec!["stick".into(), "shell".into()],
        switches:  0,
    }));
    let autosave = {
        let saves = saves.clone();
        let tasks = tasks.clone();
        Rc::new(RefCell::new(AutosaveScheduler::new(
            config.autosave.clone(),
            Rc::new(ManualClock::new(0)),
            RoleId::A,
            Box::new(move |role| saves.set_inventory(role, &tasks.borrow().inventory())),
        )))
    };
    autosave.borrow_mut().request_save();

    let systems = Collaborators {
        tasks:       Box::new(tasks.clone()),
        progression: Box::new(AreaProgression::new(saves.clone(), &config)),
        interaction: Box::new(FakeInteraction::default()),
        autosave:    Box::new(autosave.clone()),
        world:       Box::new(FakeWorld {
            active: Some(RoleId::A),
            fail_on_swap: true,
            ..FakeWorld::default()
        }),
        events:      Box::new(EventQueue::new()),
    };
    let orchestrator = CharacterSwitchOrchestrator::new(
        saves.clone(),
        Rc::new(SwitchContext::new()),
        InvariantChecker::new(InvariantPolicy::Strict),
        systems,
    );

    assert!(matches!(orchestrator.switch_to(RoleId::B), SwitchOutcome::Aborted { .. }));

    assert_eq!(saves.get_inventory(RoleId::A), vec!["stick".to_string(), "shell".to_string()]);
    let autosave = autosave.borrow();
    assert_eq!(autosave.role(), tasks.borrow().current_role());
    assert!(!autosave.is_paused());
    assert!(!autosave.has_pending());
    assert_eq!(autosave.saves_written(), 1);
}

#[test]
fn unreadable_save_aborts_before_anything_is_written() {
    let h = harness(InvariantPolicy::Strict);
    h.store.unreadable.set(true);

    match h.orchestrator.switch_to(RoleId::B) {
        SwitchOutcome::Aborted { error, .. } => assert!(error.contains("cannot be read"), "{error}"),
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(h.tasks.borrow().switches, 0);
    assert_eq!(toasts(&h, ToastLevel::Error), 1);
    assert!(!h.context.is_switching());

    h.store.unreadable.set(false);
    let save = h.saves.load_main();
    assert_eq!(save.last_selected_role, None);
    assert!(save.role(RoleId::A).unwrap().inventory.is_empty());
}

#[test]
fn missing_role_container_is_a_data_integrity_abort() {
    let h = harness(InvariantPolicy::Strict);
    let mut raw = h.store.load("main").unwrap().unwrap();
    raw["roles"].as_object_mut().unwrap().remove("B");
    assert!(h.store.write("main", &raw));

    match h.orchestrator.switch_to(RoleId::B) {
        SwitchOutcome::Aborted { error, .. } => assert!(error.contains("role B"), "{error}"),
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(h.tasks.borrow().role, RoleId::A);
    assert_eq!(h.tasks.borrow().switches, 0);
    assert_eq!(h.saves.load_main().last_selected_role, None);
    assert_eq!(toasts(&h, ToastLevel::Error), 1);
    assert!(!h.autosave.borrow().paused);
    // Nothing was pending, so nothing extra was saved.
    assert_eq!(h.autosave.borrow().forced, 0);
}

#[test]
fn failed_handoff_write_aborts_before_touching_subsystems() {
    let h = harness(InvariantPolicy::Strict);
    h.store.broken.set(true);

    let outcome = h.orchestrator.switch_to(RoleId::B);
    match outcome {
        SwitchOutcome::Aborted { error, .. } => assert!(error.contains("Write"), "{error}"),
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(h.tasks.borrow().switches, 0);
    assert_eq!(h.world.borrow().active, Some(RoleId::A));
    assert!(!h.context.is_switching());

    h.store.broken.set(false);
    assert_eq!(h.saves.load_main().last_selected_role, None);
}

#[test]
fn strict_policy_aborts_on_exclusivity_violation() {
    let h = harness(InvariantPolicy::Strict);
    h.world.borrow_mut().leave_both_live = true;

    let outcome = h.orchestrator.switch_to(RoleId::B);
    match outcome {
        SwitchOutcome::Aborted { error, .. } => assert!(error.contains("Invariant"), "{error}"),
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(h.orchestrator.checker().violations(), 1);
    assert_eq!(toasts(&h, ToastLevel::Error), 1);
}

#[test]
fn lenient_policy_logs_violation_and_commits() {
    let h = harness(InvariantPolicy::Lenient);
    h.world.borrow_mut().leave_both_live = true;

    assert!(h.orchestrator.switch_to(RoleId::B).is_committed());
    assert_eq!(h.orchestrator.checker().violations(), 1);
    assert_eq!(toasts(&h, ToastLevel::Error), 0);
}

#[test]
fn reentrant_switch_is_rejected_without_consuming_a_sequence() {
    let h = harness(InvariantPolicy::Strict);
    {
        let mut world = h.world.borrow_mut();
        world.reenter = Some(Rc::downgrade(&h.orchestrator));
        world.seen_switching = Some(h.context.clone());
    }

    let outcome = h.orchestrator.switch_to(RoleId::B);
    assert!(outcome.is_committed());
    let world = h.world.borrow();
    assert_eq!(world.reentry, Some(SwitchOutcome::Rejected));
    assert!(world.was_switching);
    assert_eq!(h.context.seq(), 1);
}

#[test]
fn externally_open_transaction_blocks_switching() {
    let h = harness(InvariantPolicy::Strict);
    h.context.begin();
    assert_eq!(h.orchestrator.switch_to(RoleId::B), SwitchOutcome::Rejected);
    assert_eq!(h.context.seq(), 1);
    assert_eq!(h.tasks.borrow().role, RoleId::A);

    h.context.end();
    assert!(h.orchestrator.switch_to(RoleId::B).is_committed());
    assert_eq!(h.context.seq(), 2);
}

#[test]
fn session_start_resumes_last_selected_role() {
    let h = harness(InvariantPolicy::Strict);
    assert_eq!(h.orchestrator.resume_last_selected(), SwitchOutcome::Unchanged);

    assert!(h.saves.set_last_selected_role(Some(RoleId::B)));
    assert!(h.orchestrator.resume_last_selected().is_committed());
    assert_eq!(h.tasks.borrow().role, RoleId::B);
    assert_eq!(h.world.borrow().active, Some(RoleId::B));
}
