//! # follower
//!
//! why: the passive role; answers leaders and candidates, never initiates
//! relations: append handling is reused by candidate.rs when it concedes
//! what: Follower behavior, log-matching append path, TimeoutNow handling

use crate::command_log::LogContainment;
use crate::error::RaftError;
use crate::message::{AppendRequest, AppendResponse, Message};
use crate::role::{self, Role, Transition};
use crate::server::ServerContext;
use crate::state::{PersistentState, VolatileState};

#[derive(Debug, Default)]
pub struct Follower;

impl Follower {
    pub fn on_message(
        &mut self,
        ctx: &mut ServerContext,
        persistent: &mut PersistentState,
        volatile: &mut VolatileState,
        message: &Message<'_>,
    ) -> Result<Transition, RaftError> {
        match message {
            Message::VoteRequest(request) => {
                role::handle_vote_request(ctx, persistent, volatile, request)?;
            }
            Message::AppendRequest(request) => {
                handle_append_request(ctx, persistent, volatile, request)?;
            }
            Message::TimeoutNow(timeout) => {
                // a leader handing off: only honored when targeted at this
                // node in the current term
                if timeout.term == persistent.current_term() && timeout.candidate_id == ctx.id() {
                    volatile.election_timer_mut().timeout_now();
                }
            }
            other => {
                log::debug!(
                    "server {}: follower ignoring {:?}",
                    ctx.id(),
                    other.message_type()
                );
            }
        }
        Ok(Transition::Steady)
    }

    pub fn perform(
        &mut self,
        _ctx: &mut ServerContext,
        _persistent: &mut PersistentState,
        volatile: &mut VolatileState,
    ) -> Result<Transition, RaftError> {
        if volatile.election_timer().is_expired() {
            return Ok(Transition::To(Role::Candidate));
        }
        Ok(Transition::Steady)
    }
}

/// the append path, shared with a conceding candidate: term must match
/// exactly (the higher-term gate already ran), prev_log_key must be IN
/// the log, conflicting entries are truncated in favor of the leader's
pub(crate) fn handle_append_request(
    ctx: &mut ServerContext,
    persistent: &mut PersistentState,
    volatile: &mut VolatileState,
    request: &AppendRequest<'_>,
) -> Result<(), RaftError> {
    let current_term = persistent.current_term();
    let successful = if request.term == current_term {
        volatile.election_timer_mut().reset();
        match persistent.log().contains(request.prev_log_key) {
            LogContainment::In => {
                append_entries(persistent, volatile, request)?;
                true
            }
            containment => {
                log::debug!(
                    "server {}: prev log key {:?} is {:?}, forcing leader retry",
                    ctx.id(),
                    request.prev_log_key,
                    containment
                );
                false
            }
        }
    } else {
        // stale term: reject without mutating any state
        false
    };

    let match_log_index = if successful {
        let last = persistent.log().last_key().index;
        volatile.advance_commit_index(request.leader_commit.min(last));
        last
    } else {
        0
    };

    let response = AppendResponse {
        term: current_term,
        successful,
        server_id: ctx.id(),
        match_log_index,
    };
    ctx.send_to(request.leader_id, &Message::AppendResponse(response))
}

fn append_entries(
    persistent: &mut PersistentState,
    volatile: &mut VolatileState,
    request: &AppendRequest<'_>,
) -> Result<(), RaftError> {
    for entry in &request.entries {
        match persistent.log().contains(entry.key) {
            LogContainment::In => continue,
            LogContainment::Ahead => {
                // conflicting entry: the leader's log wins
                persistent.truncate_including(entry.key.index, volatile.commit_index())?;
                persistent.append_entry(entry.to_entry())?;
            }
            LogContainment::Behind => {
                persistent.append_entry(entry.to_entry())?;
            }
        }
    }
    Ok(())
}
