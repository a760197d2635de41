//! # leader
//!
//! why: the active role; the only writer of new log entries in its term
//! relations: replicates via AppendRequest, advances commit on responses
//! what: per-follower cursors, replication, majority commit advancement

use crate::command_log::LogKey;
use crate::error::RaftError;
use crate::message::{
    AppendRequest, AppendResponse, CommandMessage, EntryRef, Message,
};
use crate::role::{self, Transition};
use crate::server::ServerContext;
use crate::state::{PersistentState, VolatileState};
use crate::{LogIndex, ServerId};
use std::collections::HashMap;

#[derive(Debug)]
pub struct Leader {
    /// next log index to send to each follower
    next_index: HashMap<ServerId, LogIndex>,
    /// highest log index known replicated on each follower
    match_index: HashMap<ServerId, LogIndex>,
}

impl Leader {
    pub fn new(ctx: &ServerContext, persistent: &PersistentState) -> Self {
        let next = persistent.log().last_key().index + 1;
        let mut next_index = HashMap::new();
        let mut match_index = HashMap::new();
        for peer in ctx.config().peer_ids(ctx.id()) {
            next_index.insert(peer, next);
            match_index.insert(peer, 0);
        }
        Self {
            next_index,
            match_index,
        }
    }

    pub fn on_message(
        &mut self,
        ctx: &mut ServerContext,
        persistent: &mut PersistentState,
        volatile: &mut VolatileState,
        message: &Message<'_>,
    ) -> Result<Transition, RaftError> {
        match message {
            Message::Command(command) => self.on_command(ctx, persistent, volatile, command),
            Message::AppendResponse(response) => {
                self.on_append_response(ctx, persistent, volatile, response)
            }
            Message::VoteRequest(request) => {
                role::handle_vote_request(ctx, persistent, volatile, request)?;
                Ok(Transition::Steady)
            }
            other => {
                log::debug!(
                    "server {}: leader ignoring {:?}",
                    ctx.id(),
                    other.message_type()
                );
                Ok(Transition::Steady)
            }
        }
    }

    /// heartbeat and replication retry in one: resend AppendRequest to
    /// every follower each tick
    pub fn perform(
        &mut self,
        ctx: &mut ServerContext,
        persistent: &mut PersistentState,
        volatile: &mut VolatileState,
    ) -> Result<Transition, RaftError> {
        self.replicate_all(ctx, persistent, volatile);
        Ok(Transition::Steady)
    }

    fn on_command(
        &mut self,
        ctx: &mut ServerContext,
        persistent: &mut PersistentState,
        volatile: &mut VolatileState,
        command: &CommandMessage<'_>,
    ) -> Result<Transition, RaftError> {
        if !ctx.config().is_client_source(command.command.source_id) {
            log::warn!(
                "server {}: command from unconfigured source {} dropped",
                ctx.id(),
                command.command.source_id
            );
            return Ok(Transition::Steady);
        }
        let term = persistent.current_term();
        let key = persistent.append_command(term, command.command.to_command())?;
        log::debug!(
            "server {}: appended command {} at {:?}",
            ctx.id(),
            command.command.command_index,
            key
        );
        // a single-server cluster commits on its own majority
        self.advance_commit_index(ctx, persistent, volatile);
        self.replicate_all(ctx, persistent, volatile);
        Ok(Transition::Steady)
    }

    fn on_append_response(
        &mut self,
        ctx: &mut ServerContext,
        persistent: &mut PersistentState,
        volatile: &mut VolatileState,
        response: &AppendResponse,
    ) -> Result<Transition, RaftError> {
        if response.term != persistent.current_term() {
            return Ok(Transition::Steady);
        }
        if response.successful {
            let matched = self.match_index.entry(response.server_id).or_insert(0);
            *matched = (*matched).max(response.match_log_index);
            self.next_index.insert(response.server_id, *matched + 1);
            self.advance_commit_index(ctx, persistent, volatile);
        } else {
            // the follower's log diverges; back up one index and retry
            // with an earlier prev_log_key
            let next = self.next_index.entry(response.server_id).or_insert(1);
            *next = next.saturating_sub(1).max(1);
            if let Err(e) = self.replicate_to(ctx, persistent, volatile, response.server_id) {
                log::warn!(
                    "server {}: retry to {} failed: {e}",
                    ctx.id(),
                    response.server_id
                );
            }
        }
        Ok(Transition::Steady)
    }

    pub(crate) fn replicate_all(
        &self,
        ctx: &mut ServerContext,
        persistent: &PersistentState,
        volatile: &VolatileState,
    ) {
        for peer in ctx.config().peer_ids(ctx.id()) {
            if let Err(e) = self.replicate_to(ctx, persistent, volatile, peer) {
                log::warn!("server {}: append request to {peer} failed: {e}", ctx.id());
            }
        }
    }

    fn replicate_to(
        &self,
        ctx: &mut ServerContext,
        persistent: &PersistentState,
        volatile: &VolatileState,
        follower: ServerId,
    ) -> Result<(), RaftError> {
        let next = self
            .next_index
            .get(&follower)
            .copied()
            .unwrap_or(persistent.log().last_key().index + 1);
        let prev_index = next.saturating_sub(1);
        let prev_log_key = LogKey::new(
            persistent.log().term_at(prev_index).unwrap_or(0),
            prev_index,
        );
        let entries: Vec<EntryRef<'_>> = persistent
            .log()
            .entries_from(next)
            .iter()
            .map(EntryRef::from)
            .collect();
        let request = AppendRequest {
            term: persistent.current_term(),
            leader_id: ctx.id(),
            prev_log_key,
            leader_commit: volatile.commit_index(),
            entries,
        };
        ctx.send_to(follower, &Message::AppendRequest(request))
    }

    /// advance to the highest index replicated on a strict majority whose
    /// entry was appended in the current term; prior-term entries are never
    /// committed by counting replicas alone
    fn advance_commit_index(
        &self,
        ctx: &ServerContext,
        persistent: &PersistentState,
        volatile: &mut VolatileState,
    ) {
        let quorum = ctx.config().quorum_size();
        let current_term = persistent.current_term();
        let mut highest = volatile.commit_index();
        for index in (volatile.commit_index() + 1)..=persistent.log().last_key().index {
            let replicas = 1 + self.match_index.values().filter(|&&m| m >= index).count();
            if replicas >= quorum && persistent.log().term_at(index) == Some(current_term) {
                highest = index;
            }
        }
        if highest > volatile.commit_index() {
            log::debug!(
                "server {}: commit index advanced to {highest}",
                ctx.id()
            );
            volatile.advance_commit_index(highest);
        }
    }
}
