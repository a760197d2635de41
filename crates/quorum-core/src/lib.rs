//! # quorum-core
//!
//! why: implement a single raft node's consensus engine in pure, portable rust
//! relations: persisted via quorum-storage, driven by a transport at the edges
//! what: wire codec, command log, role state machine, term-gated dispatch

pub mod apply;
pub mod command_log;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod role;
pub mod server;
pub mod state;
pub mod storage;
pub mod timer;
pub mod transport;
pub mod wire;

mod candidate;
mod follower;
mod leader;

/// logical clock partitioning time into leader epochs
pub type Term = u32;
/// 1-based position in the replicated log
pub type LogIndex = u64;
/// identity of a server in the static membership list
pub type ServerId = u32;

pub use apply::{NullStateMachine, StateMachine};
pub use command_log::{Command, CommandLog, LogContainment, LogEntry, LogKey};
pub use config::{ConsensusConfig, ExecutionMode};
pub use error::{LogError, RaftError, SendError, WireError};
pub use message::{
    AppendRequest, AppendResponse, CommandMessage, CommandRef, EntryRef, Message, MessageType,
    TimeoutNow, VoteRequest, VoteResponse,
};
pub use role::{Role, RoleState, Transition};
pub use server::{Server, ServerContext};
pub use state::{PersistentState, VolatileState};
pub use storage::{MemStorage, Storage};
