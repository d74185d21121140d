use crate::types::{RoleId, SlotId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DuetError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Save '{slot}' has no progress container for role {role}")]
    DataIntegrity { slot: SlotId, role: RoleId },

    #[error("Save slot '{slot}' exists but cannot be read: {reason}")]
    UnreadableSave { slot: SlotId, reason: String },

    #[error("Write to save slot '{slot}' failed")]
    StorageWrite { slot: SlotId },

    #[error("Invariant violated during {context}: {detail}")]
    InvariantViolation { context: String, detail: String },

    #[error("{system} failed: {message}")]
    Collaborator { system: &'static str, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type DuetResult<T> = Result<T, DuetError>;
