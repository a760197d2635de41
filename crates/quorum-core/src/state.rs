//! # state
//!
//! why: split a node's state by durability: what survives a crash and what doesn't
//! relations: PersistentState writes through storage.rs; roles mutate both
//! what: PersistentState (term, vote, log) and VolatileState (role, commit, timer)

use crate::config::ConsensusConfig;
use crate::error::RaftError;
use crate::command_log::{Command, CommandLog, LogEntry, LogKey};
use crate::role::Role;
use crate::storage::Storage;
use crate::timer::ElectionTimer;
use crate::{LogIndex, ServerId, Term};

/// durable per-node fields; every mutation is flushed to storage before
/// the mutating call returns, so replies referencing the new value are safe
pub struct PersistentState {
    current_term: Term,
    voted_for: Option<ServerId>,
    log: CommandLog,
    storage: Box<dyn Storage>,
}

impl PersistentState {
    /// recover from durable storage, defaults for a brand-new node
    pub fn recover(storage: Box<dyn Storage>) -> Result<Self, RaftError> {
        let (current_term, voted_for) = storage.load_term_and_vote()?;
        let log = CommandLog::from_entries(storage.load_log()?)?;
        Ok(Self {
            current_term,
            voted_for,
            log,
            storage,
        })
    }

    pub fn current_term(&self) -> Term {
        self.current_term
    }

    pub fn voted_for(&self) -> Option<ServerId> {
        self.voted_for
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    /// the higher-term rule: adopt `term` and forget any granted vote,
    /// durably, in one flush
    pub fn clear_voted_for_and_set_current_term(&mut self, term: Term) -> Result<(), RaftError> {
        self.storage.save_term_and_vote(term, None)?;
        self.current_term = term;
        self.voted_for = None;
        Ok(())
    }

    /// durably record a granted vote; must complete before the response is sent
    pub fn grant_vote(&mut self, candidate_id: ServerId) -> Result<(), RaftError> {
        self.storage.save_term_and_vote(self.current_term, Some(candidate_id))?;
        self.voted_for = Some(candidate_id);
        Ok(())
    }

    /// start an election: increment the term and vote for self in one flush
    pub fn begin_candidacy(&mut self, self_id: ServerId) -> Result<Term, RaftError> {
        let term = self.current_term + 1;
        self.storage.save_term_and_vote(term, Some(self_id))?;
        self.current_term = term;
        self.voted_for = Some(self_id);
        Ok(term)
    }

    /// leader-side append at the next contiguous index
    pub fn append_command(&mut self, term: Term, command: Command) -> Result<LogKey, RaftError> {
        let key = self.log.append(term, command);
        if let Err(e) = self.flush_last_entry() {
            self.log.pop_last();
            return Err(e);
        }
        Ok(key)
    }

    /// follower-side append of a replicated entry; rejects index gaps
    pub fn append_entry(&mut self, entry: LogEntry) -> Result<(), RaftError> {
        self.log.append_entry(entry)?;
        if let Err(e) = self.flush_last_entry() {
            self.log.pop_last();
            return Err(e);
        }
        Ok(())
    }

    fn flush_last_entry(&mut self) -> Result<(), RaftError> {
        if let Some(entry) = self.log.last_entry() {
            self.storage.append_entries(std::slice::from_ref(entry))?;
        }
        Ok(())
    }

    /// drop log entries from `index` onward, in memory and durably
    pub fn truncate_including(
        &mut self,
        index: LogIndex,
        commit_index: LogIndex,
    ) -> Result<(), RaftError> {
        self.log.truncate_including(index, commit_index)?;
        self.storage.truncate_log_from(index)?;
        Ok(())
    }
}

impl std::fmt::Debug for PersistentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentState")
            .field("current_term", &self.current_term)
            .field("voted_for", &self.voted_for)
            .field("log_size", &self.log.size())
            .finish()
    }
}

/// non-durable per-node fields, reset to defaults on process start
#[derive(Debug)]
pub struct VolatileState {
    role: Role,
    commit_index: LogIndex,
    last_applied: LogIndex,
    election_timer: ElectionTimer,
}

impl VolatileState {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            role: Role::Follower,
            commit_index: 0,
            last_applied: 0,
            election_timer: ElectionTimer::new(
                config.election_timeout_min,
                config.election_timeout_max,
            ),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    /// commit index only ever moves forward
    pub fn advance_commit_index(&mut self, to: LogIndex) {
        if to > self.commit_index {
            self.commit_index = to;
        }
    }

    pub fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    /// invariant: last_applied never passes commit_index
    pub fn set_last_applied(&mut self, index: LogIndex) {
        debug_assert!(index <= self.commit_index);
        self.last_applied = index;
    }

    pub fn election_timer(&self) -> &ElectionTimer {
        &self.election_timer
    }

    pub fn election_timer_mut(&mut self) -> &mut ElectionTimer {
        &mut self.election_timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;

    fn state() -> PersistentState {
        PersistentState::recover(Box::new(MemStorage::new())).unwrap()
    }

    #[test]
    fn begin_candidacy_increments_term_and_votes_self() {
        let mut p = state();
        let term = p.begin_candidacy(1).unwrap();
        assert_eq!(term, 1);
        assert_eq!(p.current_term(), 1);
        assert_eq!(p.voted_for(), Some(1));
    }

    #[test]
    fn higher_term_clears_vote() {
        let mut p = state();
        p.begin_candidacy(1).unwrap();
        p.clear_voted_for_and_set_current_term(5).unwrap();
        assert_eq!(p.current_term(), 5);
        assert_eq!(p.voted_for(), None);
    }

    #[test]
    fn commit_index_is_monotonic() {
        let config = ConsensusConfig::new().with_server(1, "a");
        let mut v = VolatileState::new(&config);
        v.advance_commit_index(4);
        v.advance_commit_index(2);
        assert_eq!(v.commit_index(), 4);
    }
}
