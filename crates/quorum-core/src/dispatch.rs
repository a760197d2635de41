//! # dispatch
//!
//! why: every inbound message passes one term gate before any role logic
//! relations: called by server.rs for each decoded message and each tick
//! what: higher-term rule, role handler invocation, transition application

use crate::error::RaftError;
use crate::message::Message;
use crate::role::{Candidate, Follower, Leader, Role, RoleState, Transition};
use crate::server::ServerContext;
use crate::state::{PersistentState, VolatileState};

/// run the term-gated pipeline for one inbound message: (1) a term above
/// ours durably clears the vote, adopts the term and demotes to follower,
/// identically for every message type; (2) the active role handles the
/// message; (3) any requested transition is applied
pub fn on_message(
    ctx: &mut ServerContext,
    persistent: &mut PersistentState,
    volatile: &mut VolatileState,
    role: &mut RoleState,
    message: &Message<'_>,
) -> Result<(), RaftError> {
    if message.term() > persistent.current_term() {
        log::info!(
            "server {}: {:?} carries term {} > {}, stepping down",
            ctx.id(),
            message.message_type(),
            message.term(),
            persistent.current_term()
        );
        persistent.clear_voted_for_and_set_current_term(message.term())?;
        become_follower(role, volatile);
    }
    let transition = role.on_message(ctx, persistent, volatile, message)?;
    apply_transition(ctx, persistent, volatile, role, transition)
}

/// advance the election/heartbeat timer path once
pub fn tick(
    ctx: &mut ServerContext,
    persistent: &mut PersistentState,
    volatile: &mut VolatileState,
    role: &mut RoleState,
) -> Result<(), RaftError> {
    let transition = role.perform(ctx, persistent, volatile)?;
    apply_transition(ctx, persistent, volatile, role, transition)
}

fn become_follower(role: &mut RoleState, volatile: &mut VolatileState) {
    if role.role() != Role::Follower {
        *role = RoleState::Follower(Follower);
        volatile.set_role(Role::Follower);
        volatile.election_timer_mut().reset();
    }
}

fn apply_transition(
    ctx: &mut ServerContext,
    persistent: &mut PersistentState,
    volatile: &mut VolatileState,
    role: &mut RoleState,
    transition: Transition,
) -> Result<(), RaftError> {
    let target = match transition {
        Transition::Steady => return Ok(()),
        Transition::To(target) => target,
    };
    if target == role.role() {
        return Ok(());
    }
    match target {
        Role::Follower => become_follower(role, volatile),
        Role::Candidate => {
            let mut candidate = Candidate::new();
            candidate.start_election(ctx, persistent, volatile)?;
            volatile.set_role(Role::Candidate);
            let won = candidate.has_quorum(ctx.config().quorum_size());
            *role = RoleState::Candidate(candidate);
            if won {
                // single-server cluster: own vote is already a majority
                return apply_transition(ctx, persistent, volatile, role, Transition::To(Role::Leader));
            }
        }
        Role::Leader => {
            log::info!(
                "server {}: won election, leading term {}",
                ctx.id(),
                persistent.current_term()
            );
            let leader = Leader::new(ctx, persistent);
            volatile.set_role(Role::Leader);
            // immediate heartbeat asserts leadership before the next tick
            leader.replicate_all(ctx, persistent, volatile);
            *role = RoleState::Leader(leader);
        }
    }
    Ok(())
}
