//! # storage
//!
//! why: persistent state must survive a restart; the engine only needs the contract
//! relations: implemented durably by quorum-storage, consumed by PersistentState
//! what: Storage trait, MemStorage for tests and in-process clusters

use crate::command_log::LogEntry;
use crate::{LogIndex, ServerId, Term};
use std::io;

/// durable backing for the per-node persistent fields
///
/// implementations must make each mutation durable before returning so
/// that PersistentState can reply to peers referencing the new value
pub trait Storage {
    /// persist the current term and granted vote together
    fn save_term_and_vote(&mut self, term: Term, voted_for: Option<ServerId>) -> io::Result<()>;

    /// load the persisted term and vote, defaults for a new node
    fn load_term_and_vote(&self) -> io::Result<(Term, Option<ServerId>)>;

    /// append entries to the durable log
    fn append_entries(&mut self, entries: &[LogEntry]) -> io::Result<()>;

    /// load the whole log for crash recovery
    fn load_log(&self) -> io::Result<Vec<LogEntry>>;

    /// drop durable entries from `from_index` to the end
    fn truncate_log_from(&mut self, from_index: LogIndex) -> io::Result<()>;
}

/// in-memory storage, no persistence across restarts
#[derive(Debug, Default)]
pub struct MemStorage {
    term: Term,
    voted_for: Option<ServerId>,
    log: Vec<LogEntry>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemStorage {
    fn save_term_and_vote(&mut self, term: Term, voted_for: Option<ServerId>) -> io::Result<()> {
        self.term = term;
        self.voted_for = voted_for;
        Ok(())
    }

    fn load_term_and_vote(&self) -> io::Result<(Term, Option<ServerId>)> {
        Ok((self.term, self.voted_for))
    }

    fn append_entries(&mut self, entries: &[LogEntry]) -> io::Result<()> {
        self.log.extend(entries.iter().cloned());
        Ok(())
    }

    fn load_log(&self) -> io::Result<Vec<LogEntry>> {
        Ok(self.log.clone())
    }

    fn truncate_log_from(&mut self, from_index: LogIndex) -> io::Result<()> {
        self.log.retain(|e| e.key.index < from_index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_log::{Command, LogKey};

    #[test]
    fn mem_storage_keeps_term_and_vote() {
        let mut storage = MemStorage::new();
        storage.save_term_and_vote(5, Some(2)).unwrap();
        assert_eq!(storage.load_term_and_vote().unwrap(), (5, Some(2)));
    }

    #[test]
    fn mem_storage_truncates_from_index() {
        let mut storage = MemStorage::new();
        let entries: Vec<LogEntry> = (1..=3)
            .map(|i| LogEntry::new(LogKey::new(1, i), Command::new(i, 0, vec![i as u8])))
            .collect();
        storage.append_entries(&entries).unwrap();

        storage.truncate_log_from(2).unwrap();

        let log = storage.load_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].key.index, 1);
    }
}
