//! Save persistence and character switching for a two-role exploration game.
//!
//! LAYERS (leaves first):
//!   store         raw slot -> blob persistence (SQLite)
//!   migration     versioned upgrade of legacy blobs + aliasing repair
//!   facade        the only way to read or write a save
//!   switch_context / invariant
//!   orchestrator  the role-switch transaction
//!
//! Rendering, input, terrain, audio and UI sit behind the traits in
//! `subsystem`.

pub mod autosave;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod facade;
pub mod invariant;
pub mod migration;
pub mod orchestrator;
pub mod progression;
pub mod save_data;
pub mod store;
pub mod subsystem;
pub mod switch_context;
pub mod types;
