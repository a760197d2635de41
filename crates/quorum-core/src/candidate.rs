//! # candidate
//!
//! why: the transitional role; campaigns for leadership one term at a time
//! relations: promoted from follower.rs on timeout, promotes to leader.rs
//! what: election start, vote counting, concession to a live leader

use crate::error::RaftError;
use crate::message::{Message, VoteRequest};
use crate::role::{self, Role, Transition};
use crate::server::ServerContext;
use crate::state::{PersistentState, VolatileState};
use crate::ServerId;

#[derive(Debug, Default)]
pub struct Candidate {
    votes_received: Vec<ServerId>,
}

impl Candidate {
    pub fn new() -> Self {
        Self::default()
    }

    /// increment the term, durably vote for self, broadcast VoteRequest
    /// and rearm the election timer
    pub fn start_election(
        &mut self,
        ctx: &mut ServerContext,
        persistent: &mut PersistentState,
        volatile: &mut VolatileState,
    ) -> Result<(), RaftError> {
        let term = persistent.begin_candidacy(ctx.id())?;
        self.votes_received.clear();
        self.votes_received.push(ctx.id());
        volatile.election_timer_mut().reset();
        log::info!("server {}: starting election for term {}", ctx.id(), term);

        let request = VoteRequest {
            term,
            candidate_id: ctx.id(),
            last_log_key: persistent.log().last_key(),
        };
        ctx.broadcast(&Message::VoteRequest(request));
        Ok(())
    }

    /// votes from a strict majority of the configured server set
    pub fn has_quorum(&self, quorum: usize) -> bool {
        self.votes_received.len() >= quorum
    }

    pub fn on_message(
        &mut self,
        ctx: &mut ServerContext,
        persistent: &mut PersistentState,
        volatile: &mut VolatileState,
        message: &Message<'_>,
    ) -> Result<Transition, RaftError> {
        match message {
            Message::VoteResponse(response) => {
                let current = response.term == persistent.current_term();
                if current && response.granted && !self.votes_received.contains(&response.server_id)
                {
                    self.votes_received.push(response.server_id);
                    if self.has_quorum(ctx.config().quorum_size()) {
                        return Ok(Transition::To(Role::Leader));
                    }
                }
                Ok(Transition::Steady)
            }
            Message::VoteRequest(request) => {
                // already voted for self this term, so this denies unless
                // the request came from a later term via the dispatch gate
                role::handle_vote_request(ctx, persistent, volatile, request)?;
                Ok(Transition::Steady)
            }
            Message::AppendRequest(request) => {
                let live_leader = request.term == persistent.current_term();
                crate::follower::handle_append_request(ctx, persistent, volatile, request)?;
                if live_leader {
                    // another server won this term
                    Ok(Transition::To(Role::Follower))
                } else {
                    Ok(Transition::Steady)
                }
            }
            other => {
                log::debug!(
                    "server {}: candidate ignoring {:?}",
                    ctx.id(),
                    other.message_type()
                );
                Ok(Transition::Steady)
            }
        }
    }

    pub fn perform(
        &mut self,
        ctx: &mut ServerContext,
        persistent: &mut PersistentState,
        volatile: &mut VolatileState,
    ) -> Result<Transition, RaftError> {
        if volatile.election_timer().is_expired() {
            // split vote: campaign again under a fresh term
            self.start_election(ctx, persistent, volatile)?;
            if self.has_quorum(ctx.config().quorum_size()) {
                return Ok(Transition::To(Role::Leader));
            }
        }
        Ok(Transition::Steady)
    }
}
