//! Shared primitive types used across the save and switch layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Area identifier (e.g. "meadow").
pub type AreaId = String;

/// Task identifier within an area's task queue.
pub type TaskId = String;

/// Inventory item identifier.
pub type ItemId = String;

/// Save slot key in the backing store.
pub type SlotId = String;

/// Wall-clock milliseconds since the Unix epoch.
pub type TimestampMs = i64;

/// Monotonic switch transaction sequence number.
pub type SwitchSeq = u64;

/// One of the two playable characters sharing a save slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoleId {
    A,
    B,
}

impl RoleId {
    pub const ALL: [RoleId; 2] = [RoleId::A, RoleId::B];

    /// The role that is not `self`.
    pub fn other(self) -> RoleId {
        match self {
            RoleId::A => RoleId::B,
            RoleId::B => RoleId::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoleId::A => "A",
            RoleId::B => "B",
        }
    }

    pub fn parse(s: &str) -> Option<RoleId> {
        match s {
            "A" | "a" => Some(RoleId::A),
            "B" | "b" => Some(RoleId::B),
            _ => None,
        }
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
