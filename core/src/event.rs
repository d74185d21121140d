//! Events broadcast to the UI layer.
//!
//! RULE: the orchestrator never talks to UI widgets directly; it emits
//! events and whoever listens renders them.

use crate::types::{RoleId, SwitchSeq};
use serde::{Deserialize, Serialize};

/// Every event the save/switch layer emits.
/// Variants are added over time, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    RoleChanged {
        from: RoleId,
        to:   RoleId,
        seq:  SwitchSeq,
    },
    Toast {
        level:   ToastLevel,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    Info,
    Warn,
    Error,
}

pub trait EventBus {
    fn emit(&mut self, event: GameEvent);
}

/// Buffered bus; the frame loop drains it.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<GameEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn pending(&self) -> &[GameEvent] {
        &self.events
    }

    /// Pending toasts in emission order, without draining.
    pub fn toasts(&self) -> Vec<(ToastLevel, &str)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                GameEvent::Toast { level, message } => Some((*level, message.as_str())),
                _ => None,
            })
            .collect()
    }
}

impl EventBus for EventQueue {
    fn emit(&mut self, event: GameEvent) {
        log::debug!("event {}", event_type_name(&event));
        self.events.push(event);
    }
}

/// Stable string name of a GameEvent variant.
pub fn event_type_name(event: &GameEvent) -> &'static str {
    match event {
        GameEvent::RoleChanged { .. } => "role_changed",
        GameEvent::Toast { .. }       => "toast",
    }
}
