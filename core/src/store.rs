//! SQLite slot store.
//!
//! RULE: Only store.rs talks to the database.
//! The store moves opaque JSON blobs per slot. No migration or business
//! logic lives here; that is the facade's job.

use crate::{
    error::DuetResult,
    types::{SlotId, TimestampMs},
};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::rc::Rc;

/// Raw key -> blob persistence for save slots.
///
/// `load` gives `Ok(None)` only when the slot does not exist; a row that
/// cannot be read or decoded is an error, never an empty slot. `write`
/// reports failure by returning `false`; implementations never panic on I/O
/// or quota errors.
pub trait SaveStore {
    fn load(&self, slot: &str) -> DuetResult<Option<Value>>;
    fn write(&self, slot: &str, data: &Value) -> bool;
    fn delete(&self, slot: &str);
}

impl<T: SaveStore + ?Sized> SaveStore for Rc<T> {
    fn load(&self, slot: &str) -> DuetResult<Option<Value>> {
        (**self).load(slot)
    }

    fn write(&self, slot: &str, data: &Value) -> bool {
        (**self).write(slot, data)
    }

    fn delete(&self, slot: &str) {
        (**self).delete(slot)
    }
}

pub struct SqliteSaveStore {
    conn: Connection,
}

impl SqliteSaveStore {
    /// Open (or create) the save database at `path`.
    pub fn open(path: &str) -> DuetResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; ignore failure elsewhere.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> DuetResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Create the slot table if it does not exist yet.
    pub fn migrate(&self) -> DuetResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS save_slot (
                slot_id    TEXT PRIMARY KEY,
                payload    TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    /// All stored slot ids, sorted.
    pub fn slots(&self) -> DuetResult<Vec<SlotId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT slot_id FROM save_slot ORDER BY slot_id ASC")?;
        let slots = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(slots)
    }

    fn try_write(&self, slot: &str, data: &Value) -> DuetResult<()> {
        let payload = serde_json::to_string(data)?;
        let updated_at: TimestampMs = data.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
        self.conn.execute(
            "INSERT INTO save_slot (slot_id, payload, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(slot_id) DO UPDATE
             SET payload = excluded.payload, updated_at = excluded.updated_at",
            params![slot, payload, updated_at],
        )?;
        Ok(())
    }
}

impl SaveStore for SqliteSaveStore {
    fn load(&self, slot: &str) -> DuetResult<Option<Value>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM save_slot WHERE slot_id = ?1",
                params![slot],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn write(&self, slot: &str, data: &Value) -> bool {
        match self.try_write(slot, data) {
            Ok(()) => true,
            Err(e) => {
                log::error!("slot '{slot}': write failed: {e}");
                false
            }
        }
    }

    fn delete(&self, slot: &str) {
        if let Err(e) = self
            .conn
            .execute("DELETE FROM save_slot WHERE slot_id = ?1", params![slot])
        {
            log::error!("slot '{slot}': delete failed: {e}");
        }
    }
}
