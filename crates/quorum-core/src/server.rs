//! # server
//!
//! why: compose one node's identity, config, state and channels in one place
//! relations: everything else receives the context as an explicit argument
//! what: ServerContext with the sender set, Server run loop

use crate::apply::StateMachine;
use crate::config::{ConsensusConfig, ExecutionMode};
use crate::dispatch;
use crate::error::{RaftError, SendError};
use crate::message::Message;
use crate::role::RoleState;
use crate::state::{PersistentState, VolatileState};
use crate::storage::Storage;
use crate::transport::{self, Receiver, Sender, DEFAULT_MAX_TRIES};
use crate::wire;
use crate::ServerId;
use std::collections::HashMap;

/// composition root passed into every operation; never ambient, never global
pub struct ServerContext {
    id: ServerId,
    config: ConsensusConfig,
    senders: HashMap<ServerId, Box<dyn Sender>>,
    scratch: Vec<u8>,
}

impl ServerContext {
    pub fn new(id: ServerId, config: ConsensusConfig) -> Self {
        Self {
            id,
            config,
            senders: HashMap::new(),
            scratch: Vec::new(),
        }
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// bind the outbound channel for a peer or client source
    pub fn register_sender(&mut self, peer: ServerId, sender: Box<dyn Sender>) {
        self.senders.insert(peer, sender);
    }

    /// encode into the scratch buffer and offer with bounded retries;
    /// transient back pressure is retried, anything else fails the send
    pub fn send_to(&mut self, peer: ServerId, message: &Message<'_>) -> Result<(), RaftError> {
        let needed = wire::encoded_len(message);
        if self.scratch.len() < needed {
            self.scratch.resize(needed, 0);
        }
        let n = wire::encode(message, &mut self.scratch, 0)?;
        let sender = self
            .senders
            .get_mut(&peer)
            .ok_or(SendError::UnknownPeer(peer))?;
        transport::offer_with_retry(sender.as_mut(), &self.scratch[..n], DEFAULT_MAX_TRIES)?;
        Ok(())
    }

    /// best-effort send to every peer; failures are logged, not propagated
    pub fn broadcast(&mut self, message: &Message<'_>) {
        for peer in self.config.peer_ids(self.id) {
            if let Err(e) = self.send_to(peer, message) {
                log::warn!("server {}: broadcast to {peer} failed: {e}", self.id);
            }
        }
    }
}

/// how many frames one `run_once` drains before ticking the timer path
const POLL_LIMIT: usize = 64;

/// a single consensus node: one thread, no locks; all state is mutated
/// from this run loop only
pub struct Server<M: StateMachine> {
    ctx: ServerContext,
    persistent: PersistentState,
    volatile: VolatileState,
    role: RoleState,
    receiver: Box<dyn Receiver>,
    state_machine: M,
}

impl<M: StateMachine> Server<M> {
    pub fn new(
        id: ServerId,
        config: ConsensusConfig,
        storage: Box<dyn Storage>,
        receiver: Box<dyn Receiver>,
        state_machine: M,
    ) -> Result<Self, RaftError> {
        let persistent = PersistentState::recover(storage)?;
        let volatile = VolatileState::new(&config);
        Ok(Self {
            ctx: ServerContext::new(id, config),
            persistent,
            volatile,
            role: RoleState::new(),
            receiver,
            state_machine,
        })
    }

    pub fn context_mut(&mut self) -> &mut ServerContext {
        &mut self.ctx
    }

    pub fn persistent(&self) -> &PersistentState {
        &self.persistent
    }

    pub fn volatile(&self) -> &VolatileState {
        &self.volatile
    }

    pub fn role(&self) -> crate::role::Role {
        self.role.role()
    }

    pub fn state_machine(&self) -> &M {
        &self.state_machine
    }

    /// one run-loop iteration: drain a bounded batch of inbound frames
    /// through the dispatch pipeline, advance the timer path, apply newly
    /// committed entries; returns the number of frames handled
    ///
    /// undecodable frames and recoverable handler failures are logged and
    /// dropped; a fatal error (durability violation, failed durable write)
    /// halts the node by propagating
    pub fn run_once(&mut self) -> Result<usize, RaftError> {
        let Self {
            ctx,
            persistent,
            volatile,
            role,
            receiver,
            state_machine,
        } = self;

        let mut fatal: Option<RaftError> = None;
        let count = receiver.poll(
            &mut |frame| {
                if fatal.is_some() {
                    return;
                }
                match wire::decode(frame, 0) {
                    Ok(message) => {
                        if let Err(e) = dispatch::on_message(ctx, persistent, volatile, role, &message)
                        {
                            if e.is_fatal() {
                                fatal = Some(e);
                            } else {
                                log::warn!("server {}: message dropped: {e}", ctx.id());
                            }
                        }
                    }
                    Err(e) => log::warn!("server {}: undecodable frame dropped: {e}", ctx.id()),
                }
            },
            POLL_LIMIT,
        );
        if let Some(e) = fatal {
            log::error!("server {}: halting: {e}", ctx.id());
            return Err(e);
        }

        match dispatch::tick(ctx, persistent, volatile, role) {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                log::error!("server {}: halting: {e}", ctx.id());
                return Err(e);
            }
            Err(e) => log::warn!("server {}: tick: {e}", ctx.id()),
        }

        apply_committed(persistent, volatile, state_machine);
        Ok(count)
    }

    /// drive the node on the current thread; only meaningful in
    /// `ExecutionMode::Threaded` (in-process embedders call `run_once`)
    pub fn run(&mut self) -> Result<(), RaftError> {
        loop {
            self.run_once()?;
            if self.ctx.config().execution_mode == ExecutionMode::Threaded {
                std::thread::sleep(self.ctx.config().heartbeat_interval);
            }
        }
    }
}

/// hand newly committed entries to the application state machine in
/// increasing index order, exactly once
fn apply_committed<M: StateMachine>(
    persistent: &PersistentState,
    volatile: &mut VolatileState,
    state_machine: &mut M,
) {
    while volatile.last_applied() < volatile.commit_index() {
        let index = volatile.last_applied() + 1;
        match persistent.log().read(index) {
            Some(entry) => state_machine.apply(entry),
            None => {
                log::error!("committed entry {index} missing from log");
                return;
            }
        }
        volatile.set_last_applied(index);
    }
}
