//! # wire
//!
//! why: exchange messages as fixed-layout bytes, read and written in place
//! relations: decodes into message.rs types, driven by server.rs at the edges
//! what: layout constant tables, bounds-checked scalar codecs, encode/decode
//!
//! every scalar is little-endian. variable sections carry a 4-byte length
//! prefix that is written before the payload bytes; a receiver derives the
//! full frame length from the stored lengths (`frame_len`) so no external
//! framing metadata is needed.

use crate::error::WireError;
use crate::command_log::LogKey;
use crate::message::{
    AppendRequest, AppendResponse, CommandMessage, CommandRef, EntryRef, Message, MessageType,
    TimeoutNow, VoteRequest, VoteResponse,
};

/// fixed offsets for every frame type
pub mod layout {
    pub mod log_key {
        pub const TERM: usize = 0; // u32
        pub const INDEX: usize = 4; // u64
        pub const LEN: usize = 12;
    }

    pub mod command {
        pub const COMMAND_INDEX: usize = 0; // u64
        pub const SOURCE_ID: usize = 8; // u32
        pub const PAYLOAD_LEN: usize = 12; // u32
        pub const PAYLOAD: usize = 16;
        pub const MIN_LEN: usize = PAYLOAD;
    }

    pub mod log_entry {
        pub const KEY: usize = 0;
        pub const COMMAND: usize = super::log_key::LEN;
        pub const MIN_LEN: usize = COMMAND + super::command::MIN_LEN;
    }

    pub mod vote_request {
        pub const TYPE: usize = 0; // u8
        pub const TERM: usize = 1; // u32
        pub const CANDIDATE_ID: usize = 5; // u32
        pub const LAST_LOG_KEY: usize = 9;
        pub const LEN: usize = LAST_LOG_KEY + super::log_key::LEN;
    }

    pub mod vote_response {
        pub const TYPE: usize = 0;
        pub const TERM: usize = 1; // u32
        pub const GRANTED: usize = 5; // u8
        pub const SERVER_ID: usize = 6; // u32
        pub const LEN: usize = 10;
    }

    pub mod append_request {
        pub const TYPE: usize = 0;
        pub const TERM: usize = 1; // u32
        pub const LEADER_ID: usize = 5; // u32
        pub const PREV_LOG_KEY: usize = 9;
        pub const LEADER_COMMIT: usize = PREV_LOG_KEY + super::log_key::LEN; // u64
        pub const ENTRY_COUNT: usize = LEADER_COMMIT + 8; // u32
        pub const ENTRIES: usize = ENTRY_COUNT + 4;
        pub const MIN_LEN: usize = ENTRIES;
    }

    pub mod append_response {
        pub const TYPE: usize = 0;
        pub const TERM: usize = 1; // u32
        pub const SUCCESSFUL: usize = 5; // u8
        pub const SERVER_ID: usize = 6; // u32
        pub const MATCH_LOG_INDEX: usize = 10; // u64
        pub const LEN: usize = 18;
    }

    pub mod timeout_now {
        pub const TYPE: usize = 0;
        pub const TERM: usize = 1; // u32
        pub const CANDIDATE_ID: usize = 5; // u32
        pub const LEN: usize = 9;
    }

    pub mod command_message {
        pub const TYPE: usize = 0;
        pub const TERM: usize = 1; // u32
        pub const COMMAND: usize = 5;
        pub const MIN_LEN: usize = COMMAND + super::command::MIN_LEN;
    }
}

// -- bounds-checked scalar codecs --

fn slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8], WireError> {
    buf.get(offset..offset + len).ok_or(WireError::SizeValidation {
        needed: len,
        offset,
        available: buf.len().saturating_sub(offset),
    })
}

fn read_u8(buf: &[u8], offset: usize) -> Result<u8, WireError> {
    Ok(slice(buf, offset, 1)?[0])
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, WireError> {
    let b = slice(buf, offset, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, WireError> {
    let b = slice(buf, offset, 8)?;
    Ok(u64::from_le_bytes([
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
    ]))
}

fn write_bytes(buf: &mut [u8], offset: usize, src: &[u8]) -> Result<(), WireError> {
    let available = buf.len().saturating_sub(offset);
    let dst = buf
        .get_mut(offset..offset + src.len())
        .ok_or(WireError::SizeValidation {
            needed: src.len(),
            offset,
            available,
        })?;
    dst.copy_from_slice(src);
    Ok(())
}

fn write_u8(buf: &mut [u8], offset: usize, value: u8) -> Result<(), WireError> {
    write_bytes(buf, offset, &[value])
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) -> Result<(), WireError> {
    write_bytes(buf, offset, &value.to_le_bytes())
}

fn write_u64(buf: &mut [u8], offset: usize, value: u64) -> Result<(), WireError> {
    write_bytes(buf, offset, &value.to_le_bytes())
}

// -- log key --

pub fn decode_log_key(buf: &[u8], offset: usize) -> Result<LogKey, WireError> {
    Ok(LogKey::new(
        read_u32(buf, offset + layout::log_key::TERM)?,
        read_u64(buf, offset + layout::log_key::INDEX)?,
    ))
}

pub fn encode_log_key(key: LogKey, buf: &mut [u8], offset: usize) -> Result<(), WireError> {
    write_u32(buf, offset + layout::log_key::TERM, key.term)?;
    write_u64(buf, offset + layout::log_key::INDEX, key.index)
}

// -- command and log entry frames --

impl<'a> CommandRef<'a> {
    /// bind a view over `buf` at `offset` without copying the payload;
    /// fails with a size-validation error if the region is too short
    pub fn wrap(buf: &'a [u8], offset: usize) -> Result<Self, WireError> {
        let command_index = read_u64(buf, offset + layout::command::COMMAND_INDEX)?;
        let source_id = read_u32(buf, offset + layout::command::SOURCE_ID)?;
        let payload_len = read_u32(buf, offset + layout::command::PAYLOAD_LEN)? as usize;
        let payload = slice(buf, offset + layout::command::PAYLOAD, payload_len)?;
        Ok(Self {
            command_index,
            source_id,
            payload,
        })
    }

    /// total encoded size, derived from the stored length prefix
    pub fn byte_length(&self) -> usize {
        layout::command::PAYLOAD + self.payload.len()
    }

    /// write the full frame; the length prefix lands before the payload
    pub fn emit(&self, buf: &mut [u8], offset: usize) -> Result<usize, WireError> {
        write_u64(buf, offset + layout::command::COMMAND_INDEX, self.command_index)?;
        write_u32(buf, offset + layout::command::SOURCE_ID, self.source_id)?;
        write_u32(
            buf,
            offset + layout::command::PAYLOAD_LEN,
            self.payload.len() as u32,
        )?;
        write_bytes(buf, offset + layout::command::PAYLOAD, self.payload)?;
        Ok(self.byte_length())
    }
}

impl<'a> EntryRef<'a> {
    pub fn wrap(buf: &'a [u8], offset: usize) -> Result<Self, WireError> {
        let key = decode_log_key(buf, offset + layout::log_entry::KEY)?;
        let command = CommandRef::wrap(buf, offset + layout::log_entry::COMMAND)?;
        Ok(Self { key, command })
    }

    pub fn byte_length(&self) -> usize {
        layout::log_entry::COMMAND + self.command.byte_length()
    }

    pub fn emit(&self, buf: &mut [u8], offset: usize) -> Result<usize, WireError> {
        encode_log_key(self.key, buf, offset + layout::log_entry::KEY)?;
        self.command.emit(buf, offset + layout::log_entry::COMMAND)?;
        Ok(self.byte_length())
    }
}

// -- messages --

/// encoded size of a message, for sizing the send buffer
pub fn encoded_len(message: &Message<'_>) -> usize {
    match message {
        Message::VoteRequest(_) => layout::vote_request::LEN,
        Message::VoteResponse(_) => layout::vote_response::LEN,
        Message::AppendRequest(m) => {
            layout::append_request::ENTRIES
                + m.entries.iter().map(EntryRef::byte_length).sum::<usize>()
        }
        Message::AppendResponse(_) => layout::append_response::LEN,
        Message::TimeoutNow(_) => layout::timeout_now::LEN,
        Message::Command(m) => layout::command_message::COMMAND + m.command.byte_length(),
    }
}

/// write `message` at `offset`, returning the encoded length
pub fn encode(message: &Message<'_>, buf: &mut [u8], offset: usize) -> Result<usize, WireError> {
    write_u8(buf, offset, message.message_type() as u8)?;
    match message {
        Message::VoteRequest(m) => {
            use layout::vote_request::*;
            write_u32(buf, offset + TERM, m.term)?;
            write_u32(buf, offset + CANDIDATE_ID, m.candidate_id)?;
            encode_log_key(m.last_log_key, buf, offset + LAST_LOG_KEY)?;
            Ok(LEN)
        }
        Message::VoteResponse(m) => {
            use layout::vote_response::*;
            write_u32(buf, offset + TERM, m.term)?;
            write_u8(buf, offset + GRANTED, m.granted as u8)?;
            write_u32(buf, offset + SERVER_ID, m.server_id)?;
            Ok(LEN)
        }
        Message::AppendRequest(m) => {
            use layout::append_request::*;
            write_u32(buf, offset + TERM, m.term)?;
            write_u32(buf, offset + LEADER_ID, m.leader_id)?;
            encode_log_key(m.prev_log_key, buf, offset + PREV_LOG_KEY)?;
            write_u64(buf, offset + LEADER_COMMIT, m.leader_commit)?;
            write_u32(buf, offset + ENTRY_COUNT, m.entries.len() as u32)?;
            let mut at = offset + ENTRIES;
            for entry in &m.entries {
                at += entry.emit(buf, at)?;
            }
            Ok(at - offset)
        }
        Message::AppendResponse(m) => {
            use layout::append_response::*;
            write_u32(buf, offset + TERM, m.term)?;
            write_u8(buf, offset + SUCCESSFUL, m.successful as u8)?;
            write_u32(buf, offset + SERVER_ID, m.server_id)?;
            write_u64(buf, offset + MATCH_LOG_INDEX, m.match_log_index)?;
            Ok(LEN)
        }
        Message::TimeoutNow(m) => {
            use layout::timeout_now::*;
            write_u32(buf, offset + TERM, m.term)?;
            write_u32(buf, offset + CANDIDATE_ID, m.candidate_id)?;
            Ok(LEN)
        }
        Message::Command(m) => {
            use layout::command_message::*;
            write_u32(buf, offset + TERM, m.term)?;
            let n = m.command.emit(buf, offset + COMMAND)?;
            Ok(COMMAND + n)
        }
    }
}

/// decode the message at `offset`, selecting the layout from the leading
/// type discriminant; variable sections borrow from `buf`
pub fn decode(buf: &[u8], offset: usize) -> Result<Message<'_>, WireError> {
    let discriminant = read_u8(buf, offset)?;
    let message_type =
        MessageType::from_u8(discriminant).ok_or(WireError::UnknownMessageType(discriminant))?;
    match message_type {
        MessageType::VoteRequest => {
            use layout::vote_request::*;
            Ok(Message::VoteRequest(VoteRequest {
                term: read_u32(buf, offset + TERM)?,
                candidate_id: read_u32(buf, offset + CANDIDATE_ID)?,
                last_log_key: decode_log_key(buf, offset + LAST_LOG_KEY)?,
            }))
        }
        MessageType::VoteResponse => {
            use layout::vote_response::*;
            Ok(Message::VoteResponse(VoteResponse {
                term: read_u32(buf, offset + TERM)?,
                granted: read_u8(buf, offset + GRANTED)? != 0,
                server_id: read_u32(buf, offset + SERVER_ID)?,
            }))
        }
        MessageType::AppendRequest => {
            use layout::append_request::*;
            let term = read_u32(buf, offset + TERM)?;
            let leader_id = read_u32(buf, offset + LEADER_ID)?;
            let prev_log_key = decode_log_key(buf, offset + PREV_LOG_KEY)?;
            let leader_commit = read_u64(buf, offset + LEADER_COMMIT)?;
            let entry_count = read_u32(buf, offset + ENTRY_COUNT)?;
            let mut entries = Vec::with_capacity(entry_count as usize);
            let mut at = offset + ENTRIES;
            for _ in 0..entry_count {
                let entry = EntryRef::wrap(buf, at)?;
                at += entry.byte_length();
                entries.push(entry);
            }
            Ok(Message::AppendRequest(AppendRequest {
                term,
                leader_id,
                prev_log_key,
                leader_commit,
                entries,
            }))
        }
        MessageType::AppendResponse => {
            use layout::append_response::*;
            Ok(Message::AppendResponse(AppendResponse {
                term: read_u32(buf, offset + TERM)?,
                successful: read_u8(buf, offset + SUCCESSFUL)? != 0,
                server_id: read_u32(buf, offset + SERVER_ID)?,
                match_log_index: read_u64(buf, offset + MATCH_LOG_INDEX)?,
            }))
        }
        MessageType::TimeoutNow => {
            use layout::timeout_now::*;
            Ok(Message::TimeoutNow(TimeoutNow {
                term: read_u32(buf, offset + TERM)?,
                candidate_id: read_u32(buf, offset + CANDIDATE_ID)?,
            }))
        }
        MessageType::Command => {
            use layout::command_message::*;
            Ok(Message::Command(CommandMessage {
                term: read_u32(buf, offset + TERM)?,
                command: CommandRef::wrap(buf, offset + COMMAND)?,
            }))
        }
    }
}

/// total length of the frame at `offset`, derived from the type byte and
/// stored length prefixes; lets a receiver find message boundaries in a
/// contiguous buffer
pub fn frame_len(buf: &[u8], offset: usize) -> Result<usize, WireError> {
    let discriminant = read_u8(buf, offset)?;
    let message_type =
        MessageType::from_u8(discriminant).ok_or(WireError::UnknownMessageType(discriminant))?;
    match message_type {
        MessageType::VoteRequest => Ok(layout::vote_request::LEN),
        MessageType::VoteResponse => Ok(layout::vote_response::LEN),
        MessageType::AppendResponse => Ok(layout::append_response::LEN),
        MessageType::TimeoutNow => Ok(layout::timeout_now::LEN),
        MessageType::AppendRequest => {
            use layout::append_request::*;
            let entry_count = read_u32(buf, offset + ENTRY_COUNT)?;
            let mut at = offset + ENTRIES;
            for _ in 0..entry_count {
                at += EntryRef::wrap(buf, at)?.byte_length();
            }
            Ok(at - offset)
        }
        MessageType::Command => {
            use layout::command_message::*;
            let command = CommandRef::wrap(buf, offset + COMMAND)?;
            Ok(COMMAND + command.byte_length())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{CommandRef, EntryRef};

    #[test]
    fn wrap_rejects_short_buffer() {
        let buf = [0u8; 8];
        let err = CommandRef::wrap(&buf, 0).unwrap_err();
        assert!(matches!(err, WireError::SizeValidation { .. }));
    }

    #[test]
    fn log_entry_round_trip_is_identical() {
        let payload = b"My command";
        let entry = EntryRef {
            key: LogKey::new(3, 101),
            command: CommandRef {
                command_index: 324234,
                source_id: 56,
                payload,
            },
        };

        let mut buf = vec![0u8; entry.byte_length()];
        let written = entry.emit(&mut buf, 0).unwrap();
        assert_eq!(written, entry.byte_length());

        let decoded = EntryRef::wrap(&buf, 0).unwrap();
        assert_eq!(decoded.key, LogKey::new(3, 101));
        assert_eq!(decoded.command.command_index, 324234);
        assert_eq!(decoded.command.source_id, 56);
        assert_eq!(decoded.command.payload, payload);
    }

    #[test]
    fn append_request_round_trip_with_entries() {
        let entries = vec![
            EntryRef {
                key: LogKey::new(1, 101),
                command: CommandRef {
                    command_index: 1,
                    source_id: 9,
                    payload: b"first",
                },
            },
            EntryRef {
                key: LogKey::new(1, 102),
                command: CommandRef {
                    command_index: 2,
                    source_id: 9,
                    payload: b"second one",
                },
            },
        ];
        let message = Message::AppendRequest(AppendRequest {
            term: 1,
            leader_id: 2,
            prev_log_key: LogKey::new(1, 100),
            leader_commit: 50,
            entries,
        });

        let mut buf = vec![0u8; encoded_len(&message)];
        let n = encode(&message, &mut buf, 0).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(frame_len(&buf, 0).unwrap(), n);

        assert_eq!(decode(&buf, 0).unwrap(), message);
    }

    #[test]
    fn decode_rejects_unknown_discriminant() {
        let buf = [0xffu8; 32];
        assert_eq!(decode(&buf, 0).unwrap_err(), WireError::UnknownMessageType(0xff));
    }

    #[test]
    fn decode_respects_offset() {
        let message = Message::TimeoutNow(TimeoutNow {
            term: 7,
            candidate_id: 3,
        });
        let mut buf = vec![0u8; 64];
        encode(&message, &mut buf, 17).unwrap();
        assert_eq!(decode(&buf, 17).unwrap(), message);
    }
}
