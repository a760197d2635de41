//! # message
//!
//! why: define all raft rpc message types exchanged between nodes
//! relations: encoded/decoded by wire.rs, routed by dispatch.rs to the roles
//! what: tagged-union Message over six wire types, zero-copy command refs

use crate::command_log::{Command, LogEntry, LogKey};
use crate::{LogIndex, ServerId, Term};

/// leading type discriminant carried by every encoded message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    VoteRequest = 1,
    VoteResponse = 2,
    AppendRequest = 3,
    AppendResponse = 4,
    TimeoutNow = 5,
    Command = 6,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::VoteRequest),
            2 => Some(Self::VoteResponse),
            3 => Some(Self::AppendRequest),
            4 => Some(Self::AppendResponse),
            5 => Some(Self::TimeoutNow),
            6 => Some(Self::Command),
            _ => None,
        }
    }
}

/// command view borrowing its payload from a receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRef<'a> {
    pub command_index: u64,
    pub source_id: u32,
    pub payload: &'a [u8],
}

impl<'a> CommandRef<'a> {
    /// copy out of the receive buffer; named to stay clear of the
    /// blanket `ToOwned` the `Clone` derive brings in
    pub fn to_command(self) -> Command {
        Command::new(self.command_index, self.source_id, self.payload.to_vec())
    }
}

impl<'a> From<&'a Command> for CommandRef<'a> {
    fn from(command: &'a Command) -> Self {
        Self {
            command_index: command.command_index,
            source_id: command.source_id,
            payload: &command.payload,
        }
    }
}

/// log entry view borrowing its command payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef<'a> {
    pub key: LogKey,
    pub command: CommandRef<'a>,
}

impl<'a> EntryRef<'a> {
    pub fn to_entry(self) -> LogEntry {
        LogEntry::new(self.key, self.command.to_command())
    }
}

impl<'a> From<&'a LogEntry> for EntryRef<'a> {
    fn from(entry: &'a LogEntry) -> Self {
        Self {
            key: entry.key,
            command: CommandRef::from(&entry.command),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteRequest {
    pub term: Term,
    pub candidate_id: ServerId,
    pub last_log_key: LogKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteResponse {
    pub term: Term,
    pub granted: bool,
    /// the voter, so a candidate can count distinct servers
    pub server_id: ServerId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendRequest<'a> {
    pub term: Term,
    pub leader_id: ServerId,
    pub prev_log_key: LogKey,
    pub leader_commit: LogIndex,
    pub entries: Vec<EntryRef<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResponse {
    pub term: Term,
    pub successful: bool,
    /// the responder, so the leader can advance that follower's cursors
    pub server_id: ServerId,
    /// highest index the responder holds after the append, 0 on failure
    pub match_log_index: LogIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutNow {
    pub term: Term,
    pub candidate_id: ServerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandMessage<'a> {
    pub term: Term,
    pub command: CommandRef<'a>,
}

/// every message a node can receive or send, borrowing variable-length
/// sections from the buffer it was decoded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<'a> {
    VoteRequest(VoteRequest),
    VoteResponse(VoteResponse),
    AppendRequest(AppendRequest<'a>),
    AppendResponse(AppendResponse),
    TimeoutNow(TimeoutNow),
    Command(CommandMessage<'a>),
}

impl Message<'_> {
    /// the term field every message carries; read structurally by the
    /// dispatch pipeline's higher-term gate
    pub fn term(&self) -> Term {
        match self {
            Message::VoteRequest(m) => m.term,
            Message::VoteResponse(m) => m.term,
            Message::AppendRequest(m) => m.term,
            Message::AppendResponse(m) => m.term,
            Message::TimeoutNow(m) => m.term,
            Message::Command(m) => m.term,
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Message::VoteRequest(_) => MessageType::VoteRequest,
            Message::VoteResponse(_) => MessageType::VoteResponse,
            Message::AppendRequest(_) => MessageType::AppendRequest,
            Message::AppendResponse(_) => MessageType::AppendResponse,
            Message::TimeoutNow(_) => MessageType::TimeoutNow,
            Message::Command(_) => MessageType::Command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // the append path iterates `&request.entries`, so the conversion has
    // to produce an owned LogEntry when called through a reference
    #[test]
    fn entry_refs_convert_to_owned_entries_through_a_reference() {
        let payload = b"My command";
        let refs = vec![EntryRef {
            key: LogKey::new(1, 101),
            command: CommandRef {
                command_index: 324234,
                source_id: 56,
                payload,
            },
        }];

        let owned: Vec<LogEntry> = refs.iter().map(|e| e.to_entry()).collect();
        assert_eq!(owned[0].key, LogKey::new(1, 101));
        assert_eq!(owned[0].command, Command::new(324234, 56, payload.to_vec()));
    }

    #[test]
    fn command_ref_copies_its_payload_out_of_the_buffer() {
        let buffer = b"My command".to_vec();
        let command = CommandRef {
            command_index: 324234,
            source_id: 56,
            payload: &buffer,
        }
        .to_command();
        drop(buffer);
        assert_eq!(command.payload, b"My command".to_vec());
    }
}
