//! # apply
//!
//! why: committed commands have to land somewhere outside the engine
//! relations: invoked by server.rs as the commit index advances
//! what: the application state machine contract

use crate::command_log::LogEntry;

/// consumer of committed commands
///
/// entries arrive in increasing index order, exactly once per index; the
/// engine does not deduplicate beyond log position, so implementations
/// must be idempotent per command_index
pub trait StateMachine {
    fn apply(&mut self, entry: &LogEntry);
}

/// no-op state machine for nodes that only replicate
#[derive(Debug, Default)]
pub struct NullStateMachine;

impl StateMachine for NullStateMachine {
    fn apply(&mut self, _entry: &LogEntry) {}
}
