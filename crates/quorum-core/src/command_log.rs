//! # command_log
//!
//! why: manage the append-only log of commands that raft replicates
//! relations: owned by PersistentState, queried by roles for log matching
//! what: LogKey/Command/LogEntry types, CommandLog store, containment check

use crate::error::LogError;
use crate::{LogIndex, Term};
use serde::{Deserialize, Serialize};

/// identifies an entry by (term, index); ordered by index, term carried
/// for the log matching check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogKey {
    pub term: Term,
    pub index: LogIndex,
}

impl LogKey {
    pub const fn new(term: Term, index: LogIndex) -> Self {
        Self { term, index }
    }

    /// key of the empty log prefix
    pub const ZERO: LogKey = LogKey { term: 0, index: 0 };
}

/// a client command carried by exactly one log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// client-assigned dedup key
    pub command_index: u64,
    /// originating client/source identity
    pub source_id: u32,
    pub payload: Vec<u8>,
}

impl Command {
    pub fn new(command_index: u64, source_id: u32, payload: Vec<u8>) -> Self {
        Self {
            command_index,
            source_id,
            payload,
        }
    }
}

/// immutable once appended; identified uniquely by its key within a node's log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub key: LogKey,
    pub command: Command,
}

impl LogEntry {
    pub fn new(key: LogKey, command: Command) -> Self {
        Self { key, command }
    }
}

/// where a candidate key falls relative to this log's tail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogContainment {
    /// an entry with matching (term, index) exists
    In,
    /// the log's tail is before the key: a gap
    Behind,
    /// the log reaches the key's index but the term mismatches: a conflict
    Ahead,
}

/// ordered, append-only sequence of entries with indices contiguous from 1
#[derive(Debug, Default)]
pub struct CommandLog {
    entries: Vec<LogEntry>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// rebuild from durable storage; entries must be contiguous from 1
    pub fn from_entries(entries: Vec<LogEntry>) -> Result<Self, LogError> {
        for (i, entry) in entries.iter().enumerate() {
            let expected = i as LogIndex + 1;
            if entry.key.index != expected {
                return Err(LogError::IndexGap {
                    index: entry.key.index,
                    last: expected - 1,
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn size(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_entry(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// key of the last entry, or `LogKey::ZERO` for an empty log
    pub fn last_key(&self) -> LogKey {
        self.last_entry().map(|e| e.key).unwrap_or(LogKey::ZERO)
    }

    pub fn read(&self, index: LogIndex) -> Option<&LogEntry> {
        if index == 0 {
            return None;
        }
        self.entries.get(index as usize - 1)
    }

    pub fn term_at(&self, index: LogIndex) -> Option<Term> {
        self.read(index).map(|e| e.key.term)
    }

    /// all entries at `index` and after
    pub fn entries_from(&self, index: LogIndex) -> &[LogEntry] {
        let start = (index.max(1) as usize - 1).min(self.entries.len());
        &self.entries[start..]
    }

    /// append a command under `term` at the next contiguous index
    pub fn append(&mut self, term: Term, command: Command) -> LogKey {
        let key = LogKey::new(term, self.last_key().index + 1);
        self.entries.push(LogEntry::new(key, command));
        key
    }

    /// append an entry carrying its own key; rejects a non-contiguous index
    pub fn append_entry(&mut self, entry: LogEntry) -> Result<(), LogError> {
        let last = self.last_key().index;
        if entry.key.index != last + 1 {
            return Err(LogError::IndexGap {
                index: entry.key.index,
                last,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub(crate) fn pop_last(&mut self) -> Option<LogEntry> {
        self.entries.pop()
    }

    /// drop entries from `index` to the end; refuses to touch committed entries
    pub fn truncate_including(
        &mut self,
        index: LogIndex,
        commit_index: LogIndex,
    ) -> Result<(), LogError> {
        if index <= commit_index {
            return Err(LogError::TruncateBelowCommit {
                index,
                commit_index,
            });
        }
        self.entries.truncate(index.saturating_sub(1) as usize);
        Ok(())
    }

    /// the log matching check: (index, term) identifies an entry; a term
    /// mismatch at a held index means this log conflicts with the leader's
    pub fn contains(&self, key: LogKey) -> LogContainment {
        if key.index == 0 {
            // the empty prefix is part of every log
            return LogContainment::In;
        }
        if key.index > self.last_key().index {
            return LogContainment::Behind;
        }
        match self.term_at(key.index) {
            Some(term) if term == key.term => LogContainment::In,
            _ => LogContainment::Ahead,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(n: u64) -> Command {
        Command::new(n, 7, vec![n as u8])
    }

    #[test]
    fn append_assigns_contiguous_indices() {
        let mut log = CommandLog::new();
        assert_eq!(log.append(1, cmd(10)), LogKey::new(1, 1));
        assert_eq!(log.append(1, cmd(11)), LogKey::new(1, 2));
        assert_eq!(log.size(), 2);
    }

    #[test]
    fn append_entry_rejects_gap() {
        let mut log = CommandLog::new();
        let err = log
            .append_entry(LogEntry::new(LogKey::new(1, 3), cmd(1)))
            .unwrap_err();
        assert_eq!(err, LogError::IndexGap { index: 3, last: 0 });
    }

    #[test]
    fn contains_tristate() {
        let mut log = CommandLog::new();
        log.append(1, cmd(1));
        log.append(2, cmd(2));

        assert_eq!(log.contains(LogKey::ZERO), LogContainment::In);
        assert_eq!(log.contains(LogKey::new(2, 2)), LogContainment::In);
        assert_eq!(log.contains(LogKey::new(2, 3)), LogContainment::Behind);
        assert_eq!(log.contains(LogKey::new(1, 2)), LogContainment::Ahead);
    }

    #[test]
    fn truncate_below_commit_fails() {
        let mut log = CommandLog::new();
        for n in 1..=4 {
            log.append(1, cmd(n));
        }
        let err = log.truncate_including(2, 2).unwrap_err();
        assert_eq!(
            err,
            LogError::TruncateBelowCommit {
                index: 2,
                commit_index: 2
            }
        );
        assert_eq!(log.size(), 4);
    }

    #[test]
    fn truncate_drops_exactly_from_index() {
        let mut log = CommandLog::new();
        for n in 1..=4 {
            log.append(1, cmd(n));
        }
        log.truncate_including(3, 1).unwrap();
        assert_eq!(log.size(), 2);
        assert_eq!(log.last_key(), LogKey::new(1, 2));
    }

    #[test]
    fn from_entries_validates_contiguity() {
        let good = vec![
            LogEntry::new(LogKey::new(1, 1), cmd(1)),
            LogEntry::new(LogKey::new(1, 2), cmd(2)),
        ];
        assert!(CommandLog::from_entries(good).is_ok());

        let gapped = vec![LogEntry::new(LogKey::new(1, 2), cmd(2))];
        assert!(CommandLog::from_entries(gapped).is_err());
    }
}
