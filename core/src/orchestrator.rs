//! Character switch orchestrator. Moves the active role across every
//! role-dependent subsystem as one transaction.
//!
//! STATES: IDLE -> TRANSACTION_OPEN -> {COMMITTED | ABORTED} -> IDLE
//!
//! STEP ORDER (fixed, each step a failure point):
//!   1. open transaction; cancel pending autosave, pause autosave
//!   2. clear dwell state
//!   3. load save (must be readable), verify both role containers
//!   4. one write: outgoing role's live inventory + lastSelectedRole
//!   5. read target inventory back
//!   6. hand (role, inventory) to the task system
//!   7. swap the live player entity in the world
//!   8. reload progression for the target role
//!   9. clear dwell state again
//!  10. retarget autosave
//!  11. active-player exclusivity check
//!  12. broadcast role change + toast
//!  13. resume autosave, force one save
//!
//! RULES:
//!   - At most one transaction is open. A second request is rejected, never
//!     queued, and does not consume a sequence number.
//!   - Every error from the steps is caught once, here. The player sees one
//!     short toast; nothing propagates to the UI layer.
//!   - Cleanup runs exactly once per transaction whatever happened.
//!   - No step yields. The whole transaction is one synchronous call.

use crate::{
    error::{DuetError, DuetResult},
    event::{GameEvent, ToastLevel},
    facade::SaveAccess,
    invariant::InvariantChecker,
    subsystem::Collaborators,
    switch_context::SwitchContext,
    types::{RoleId, SwitchSeq},
};
use std::cell::RefCell;
use std::rc::Rc;

const SWITCH_FAILED_TOAST: &str = "Couldn't switch characters right now. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// Another switch was in flight.
    Rejected,
    /// Target was already the active role.
    Unchanged,
    Committed { seq: SwitchSeq, from: RoleId, to: RoleId },
    Aborted { seq: SwitchSeq, error: String },
}

impl SwitchOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, SwitchOutcome::Committed { .. })
    }
}

/// Per-transaction bookkeeping for cleanup.
struct Transaction {
    seq:               SwitchSeq,
    from:              RoleId,
    to:                RoleId,
    pending_cancelled: bool,
    autosave_paused:   bool,
    handoff_written:   bool,
    committed:         bool,
    closed:            bool,
}

impl Transaction {
    fn open(context: &SwitchContext, from: RoleId, to: RoleId) -> Self {
        Self {
            seq: context.begin(),
            from,
            to,
            pending_cancelled: false,
            autosave_paused: false,
            handoff_written: false,
            committed: false,
            closed: false,
        }
    }
}

pub struct CharacterSwitchOrchestrator {
    saves:   Rc<dyn SaveAccess>,
    context: Rc<SwitchContext>,
    checker: InvariantChecker,
    systems: RefCell<Collaborators>,
}

impl CharacterSwitchOrchestrator {
    pub fn new(
        saves: Rc<dyn SaveAccess>,
        context: Rc<SwitchContext>,
        checker: InvariantChecker,
        systems: Collaborators,
    ) -> Self {
        Self {
            saves,
            context,
            checker,
            systems: RefCell::new(systems),
        }
    }

    pub fn context(&self) -> &SwitchContext {
        &self.context
    }

    pub fn checker(&self) -> &InvariantChecker {
        &self.checker
    }

    /// Role the task system reports as live. `None` while a switch holds the
    /// collaborators.
    pub fn active_role(&self) -> Option<RoleId> {
        self.systems
            .try_borrow()
            .ok()
            .map(|systems| systems.tasks.current_role())
    }

    /// On session start, switch to the role the save last selected.
    pub fn resume_last_selected(&self) -> SwitchOutcome {
        match self.saves.load_main().last_selected_role {
            Some(role) => self.switch_to(role),
            None => SwitchOutcome::Unchanged,
        }
    }

    pub fn switch_to(&self, target: RoleId) -> SwitchOutcome {
        if self.context.is_switching() {
            log::warn!(
                "switch to {target} rejected: seq={} still open",
                self.context.seq()
            );
            return SwitchOutcome::Rejected;
        }
        let Ok(mut systems) = self.systems.try_borrow_mut() else {
            log::warn!("switch to {target} rejected: subsystems busy");
            return SwitchOutcome::Rejected;
        };

        let current = systems.tasks.current_role();
        if current == target {
            log::debug!("switch to {target} ignored: already active");
            return SwitchOutcome::Unchanged;
        }

        let mut tx = Transaction::open(&self.context, current, target);
        log::debug!("seq={} switch {current} -> {target} opened", tx.seq);

        let outcome = match self.run_steps(&mut systems, &mut tx) {
            Ok(()) => {
                tx.committed = true;
                log::info!("seq={} switch {current} -> {target} committed", tx.seq);
                SwitchOutcome::Committed {
                    seq:  tx.seq,
                    from: current,
                    to:   target,
                }
            }
            Err(e) => {
                log::error!("seq={} switch {current} -> {target} aborted: {e}", tx.seq);
                systems.events.emit(GameEvent::Toast {
                    level:   ToastLevel::Error,
                    message: SWITCH_FAILED_TOAST.to_string(),
                });
                SwitchOutcome::Aborted {
                    seq:   tx.seq,
                    error: e.to_string(),
                }
            }
        };

        self.close(&mut systems, &mut tx);
        outcome
    }

    fn run_steps(&self, systems: &mut Collaborators, tx: &mut Transaction) -> DuetResult<()> {
        let (seq, from, to) = (tx.seq, tx.from, tx.to);

        // 1. A debounced save firing mid-switch would write a stale role.
        tx.pending_cancelled = systems.autosave.cancel_pending();
        systems.autosave.pause();
        tx.autosave_paused = true;

        // 2.
        systems.interaction.clear_dwell()?;

        // 3. An unreadable save aborts here rather than being replaced.
        let save = self.saves.try_load_main()?;
        if let Some(role) = save.missing_roles().first() {
            return Err(DuetError::DataIntegrity {
                slot: self.saves.slot_id().to_string(),
                role: *role,
            });
        }

        // 4. Inventory and selection go out in one write.
        let live_inventory = systems.tasks.inventory();
        if !self.saves.commit_role_handoff(from, &live_inventory, to) {
            return Err(DuetError::StorageWrite {
                slot: self.saves.slot_id().to_string(),
            });
        }
        tx.handoff_written = true;
        log::debug!("seq={seq} stored {} item(s) for {from}", live_inventory.len());

        // 5.
        let inventory = self.saves.get_inventory(to);

        // 6.
        systems.tasks.switch_character(to, inventory)?;

        // 7.
        systems.world.set_active_role(to)?;

        // 8.
        systems.progression.switch_role(to)?;

        // 9. Loading tasks can leave a fresh dwell target behind.
        systems.interaction.clear_dwell()?;

        // 10.
        systems.autosave.set_role(to);

        // 11.
        let a = systems.world.player_entity(RoleId::A);
        let b = systems.world.player_entity(RoleId::B);
        let expected = if to == RoleId::A { a.id.clone() } else { b.id.clone() };
        self.checker.assert_active_players_exclusive(
            &a,
            &b,
            &expected,
            &format!("switch seq={seq} {from}->{to}"),
        )?;

        // 12.
        systems.events.emit(GameEvent::RoleChanged { from, to, seq });
        systems.events.emit(GameEvent::Toast {
            level:   ToastLevel::Info,
            message: format!("Now playing as {to}"),
        });

        // 13.
        systems.autosave.resume();
        tx.autosave_paused = false;
        if !systems.autosave.force_save() {
            log::warn!("seq={seq} post-switch save failed; autosave will retry");
        }
        Ok(())
    }

    /// Cleanup. Runs once per transaction.
    fn close(&self, systems: &mut Collaborators, tx: &mut Transaction) {
        if tx.closed {
            return;
        }
        tx.closed = true;

        if tx.autosave_paused {
            systems.autosave.resume();
            tx.autosave_paused = false;
        }

        if !tx.committed {
            // Step 10 may not have run. Saves taken from here on capture the
            // task system's inventory, so they must go under its role.
            let live = systems.tasks.current_role();
            systems.autosave.set_role(live);

            if tx.handoff_written {
                // Keep the persisted selection in line with the role that
                // is actually live.
                if !self.saves.set_last_selected_role(Some(live)) {
                    log::warn!("seq={} could not restore lastSelectedRole={live}", tx.seq);
                }
            }
            if tx.pending_cancelled && !systems.autosave.force_save() {
                log::warn!("seq={} save of pre-switch state failed", tx.seq);
            }
        }

        self.context.end();
        log::debug!("seq={} closed", tx.seq);
    }
}
