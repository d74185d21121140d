//! Post-condition checks on the two player entities.
//!
//! Exactly one entity may be live after a switch, it must be the expected
//! one, and the other must be neither pickable nor colliding.

use crate::{
    error::{DuetError, DuetResult},
    types::RoleId,
};
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// What to do when an invariant does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantPolicy {
    /// Fail immediately. Diagnostic builds.
    Strict,
    /// Log and continue. Release builds.
    Lenient,
}

impl Default for InvariantPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            InvariantPolicy::Strict
        } else {
            InvariantPolicy::Lenient
        }
    }
}

/// World-side view of one pre-instantiated player entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerEntity {
    pub id:         String,
    pub role:       RoleId,
    pub active:     bool,
    pub pickable:   bool,
    pub collidable: bool,
}

#[derive(Debug, Default)]
pub struct InvariantChecker {
    policy:     InvariantPolicy,
    violations: Cell<u64>,
}

impl InvariantChecker {
    pub fn new(policy: InvariantPolicy) -> Self {
        Self {
            policy,
            violations: Cell::new(0),
        }
    }

    pub fn policy(&self) -> InvariantPolicy {
        self.policy
    }

    /// Violations seen so far, including ones the lenient policy let through.
    pub fn violations(&self) -> u64 {
        self.violations.get()
    }

    pub fn assert_active_players_exclusive(
        &self,
        a: &PlayerEntity,
        b: &PlayerEntity,
        expected_active_id: &str,
        context: &str,
    ) -> DuetResult<()> {
        match exclusivity_violation(a, b, expected_active_id) {
            None => Ok(()),
            Some(detail) => self.report(context, detail),
        }
    }

    fn report(&self, context: &str, detail: String) -> DuetResult<()> {
        self.violations.set(self.violations.get() + 1);
        match self.policy {
            InvariantPolicy::Strict => Err(DuetError::InvariantViolation {
                context: context.to_string(),
                detail,
            }),
            InvariantPolicy::Lenient => {
                log::error!("invariant violated during {context}: {detail}");
                Ok(())
            }
        }
    }
}

fn exclusivity_violation(a: &PlayerEntity, b: &PlayerEntity, expected: &str) -> Option<String> {
    let (active, inactive) = match (a.active, b.active) {
        (true, false) => (a, b),
        (false, true) => (b, a),
        (true, true) => return Some(format!("both '{}' and '{}' are active", a.id, b.id)),
        (false, false) => return Some(format!("neither '{}' nor '{}' is active", a.id, b.id)),
    };
    if active.id != expected {
        return Some(format!("'{}' is active, expected '{expected}'", active.id));
    }
    if inactive.pickable || inactive.collidable {
        return Some(format!(
            "inactive '{}' is still pickable={} collidable={}",
            inactive.id, inactive.pickable, inactive.collidable
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str, role: RoleId, live: bool) -> PlayerEntity {
        PlayerEntity {
            id: id.to_string(),
            role,
            active: live,
            pickable: live,
            collidable: live,
        }
    }

    #[test]
    fn exclusive_pair_passes() {
        let checker = InvariantChecker::new(InvariantPolicy::Strict);
        let a = entity("player_a", RoleId::A, false);
        let b = entity("player_b", RoleId::B, true);
        assert!(checker.assert_active_players_exclusive(&a, &b, "player_b", "test").is_ok());
        assert_eq!(checker.violations(), 0);
    }

    #[test]
    fn strict_policy_fails_on_double_active() {
        let checker = InvariantChecker::new(InvariantPolicy::Strict);
        let a = entity("player_a", RoleId::A, true);
        let b = entity("player_b", RoleId::B, true);
        let err = checker
            .assert_active_players_exclusive(&a, &b, "player_b", "switch")
            .unwrap_err();
        assert!(matches!(err, DuetError::InvariantViolation { .. }));
    }

    #[test]
    fn strict_policy_fails_on_wrong_active_entity() {
        let checker = InvariantChecker::new(InvariantPolicy::Strict);
        let a = entity("player_a", RoleId::A, true);
        let b = entity("player_b", RoleId::B, false);
        assert!(checker
            .assert_active_players_exclusive(&a, &b, "player_b", "switch")
            .is_err());
    }

    #[test]
    fn inactive_entity_must_not_collide() {
        let checker = InvariantChecker::new(InvariantPolicy::Strict);
        let a = entity("player_a", RoleId::A, true);
        let mut b = entity("player_b", RoleId::B, false);
        b.collidable = true;
        assert!(checker
            .assert_active_players_exclusive(&a, &b, "player_a", "switch")
            .is_err());
    }

    #[test]
    fn lenient_policy_counts_but_continues() {
        let checker = InvariantChecker::new(InvariantPolicy::Lenient);
        let a = entity("player_a", RoleId::A, false);
        let b = entity("player_b", RoleId::B, false);
        assert!(checker
            .assert_active_players_exclusive(&a, &b, "player_a", "switch")
            .is_ok());
        assert_eq!(checker.violations(), 1);
    }
}
