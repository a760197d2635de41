//! # role
//!
//! why: a node behaves as exactly one of three roles at any time
//! relations: dispatch.rs routes messages here after the higher-term gate
//! what: Role/Transition enums, RoleState dispatch, shared vote handling

use crate::command_log::{CommandLog, LogKey};
use crate::error::RaftError;
use crate::message::{Message, VoteRequest, VoteResponse};
use crate::server::ServerContext;
use crate::state::{PersistentState, VolatileState};

pub use crate::candidate::Candidate;
pub use crate::follower::Follower;
pub use crate::leader::Leader;

/// the three mutually exclusive behaviors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Follower,
    Candidate,
    Leader,
}

/// what a handler wants to happen to the active role afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Steady,
    To(Role),
}

/// the active behavior object plus its role-private state
#[derive(Debug)]
pub enum RoleState {
    Follower(Follower),
    Candidate(Candidate),
    Leader(Leader),
}

impl Default for RoleState {
    fn default() -> Self {
        RoleState::Follower(Follower)
    }
}

impl RoleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(&self) -> Role {
        match self {
            RoleState::Follower(_) => Role::Follower,
            RoleState::Candidate(_) => Role::Candidate,
            RoleState::Leader(_) => Role::Leader,
        }
    }

    pub fn on_message(
        &mut self,
        ctx: &mut ServerContext,
        persistent: &mut PersistentState,
        volatile: &mut VolatileState,
        message: &Message<'_>,
    ) -> Result<Transition, RaftError> {
        match self {
            RoleState::Follower(follower) => follower.on_message(ctx, persistent, volatile, message),
            RoleState::Candidate(candidate) => {
                candidate.on_message(ctx, persistent, volatile, message)
            }
            RoleState::Leader(leader) => leader.on_message(ctx, persistent, volatile, message),
        }
    }

    /// periodic action, invoked once per scheduler tick regardless of messages
    pub fn perform(
        &mut self,
        ctx: &mut ServerContext,
        persistent: &mut PersistentState,
        volatile: &mut VolatileState,
    ) -> Result<Transition, RaftError> {
        match self {
            RoleState::Follower(follower) => follower.perform(ctx, persistent, volatile),
            RoleState::Candidate(candidate) => candidate.perform(ctx, persistent, volatile),
            RoleState::Leader(leader) => leader.perform(ctx, persistent, volatile),
        }
    }
}

/// vote handling shared by every role: grant at most one vote per term,
/// and only to a candidate whose log is at least as up to date as ours
pub(crate) fn handle_vote_request(
    ctx: &mut ServerContext,
    persistent: &mut PersistentState,
    volatile: &mut VolatileState,
    request: &VoteRequest,
) -> Result<(), RaftError> {
    let current_term = persistent.current_term();
    let granted = request.term == current_term
        && persistent
            .voted_for()
            .map_or(true, |v| v == request.candidate_id)
        && log_up_to_date(persistent.log(), request.last_log_key);
    if granted {
        // durable before the response leaves this node
        persistent.grant_vote(request.candidate_id)?;
        volatile.election_timer_mut().reset();
        log::debug!(
            "server {}: granted vote to {} for term {}",
            ctx.id(),
            request.candidate_id,
            current_term
        );
    }
    let response = VoteResponse {
        term: current_term,
        granted,
        server_id: ctx.id(),
    };
    ctx.send_to(request.candidate_id, &Message::VoteResponse(response))
}

fn log_up_to_date(log: &CommandLog, candidate_last: LogKey) -> bool {
    let own = log.last_key();
    candidate_last.term > own.term
        || (candidate_last.term == own.term && candidate_last.index >= own.index)
}
