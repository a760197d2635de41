//! # error
//!
//! why: one taxonomy for everything that can go wrong inside the engine
//! relations: WireError from wire.rs, LogError from command_log.rs, SendError from transport.rs
//! what: per-concern error enums plus the top-level RaftError with a fatality split

use crate::{LogIndex, ServerId};
use thiserror::Error;

/// decode or encode failed against the fixed layout
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// the buffer region is shorter than the frame's minimum size
    #[error("buffer too small: need {needed} bytes at offset {offset}, have {available}")]
    SizeValidation {
        needed: usize,
        offset: usize,
        available: usize,
    },
    /// leading type byte does not name a known message
    #[error("unknown message type discriminant {0}")]
    UnknownMessageType(u8),
}

/// the command log refused an operation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogError {
    #[error("append at index {index} leaves a gap after index {last}")]
    IndexGap { index: LogIndex, last: LogIndex },
    /// committed entries are durable; dropping them is a safety violation
    #[error("truncation at index {index} would drop committed entries (commit index {commit_index})")]
    TruncateBelowCommit {
        index: LogIndex,
        commit_index: LogIndex,
    },
}

/// an outbound offer failed terminally or ran out of retries
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("transport not connected")]
    NotConnected,
    #[error("transport closed")]
    Closed,
    #[error("gave up after {0} tries")]
    Exhausted(usize),
    #[error("no sender registered for server {0}")]
    UnknownPeer(ServerId),
}

/// top-level error handed to the run loop
#[derive(Debug, Error)]
pub enum RaftError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Log(#[from] LogError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error("storage: {0}")]
    Storage(#[from] std::io::Error),
}

impl RaftError {
    /// true when the node must halt instead of dropping the message and
    /// carrying on: a durability violation or a failed durable write means
    /// persistent state can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RaftError::Log(LogError::TruncateBelowCommit { .. }) | RaftError::Storage(_)
        )
    }
}
