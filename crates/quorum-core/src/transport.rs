//! # transport
//!
//! why: the engine only offers and polls; delivery substrate lives elsewhere
//! relations: ServerContext holds senders, server.rs polls the receiver
//! what: Offer result codes, Sender/Receiver traits, bounded retry, mem channel

use crate::error::SendError;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// bounded retry count for transient send failures
pub const DEFAULT_MAX_TRIES: usize = 8;

/// outcome of a non-blocking offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// new stream position after a successful publish
    Position(u64),
    /// not yet connected to a subscriber
    NotConnected,
    /// the subscriber's buffer is saturated; retryable
    BackPressured,
    /// an administrative action is in progress; retryable
    AdminAction,
    /// the channel is closed and must not be used again
    Closed,
}

impl Offer {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Offer::BackPressured | Offer::AdminAction)
    }
}

/// point-to-point outbound channel
pub trait Sender {
    /// non-blocking publish of one encoded frame
    fn offer(&mut self, frame: &[u8]) -> Offer;
}

/// inbound channel polled by the run loop
pub trait Receiver {
    /// invoke `handler` with up to `limit` frames, returning the count
    fn poll(&mut self, handler: &mut dyn FnMut(&[u8]), limit: usize) -> usize;
}

/// offer with a bounded retry loop: only back pressure and admin action
/// are retried, anything else fails the send immediately
pub fn offer_with_retry(
    sender: &mut dyn Sender,
    frame: &[u8],
    max_tries: usize,
) -> Result<u64, SendError> {
    for _ in 0..max_tries {
        match sender.offer(frame) {
            Offer::Position(position) => return Ok(position),
            Offer::NotConnected => return Err(SendError::NotConnected),
            Offer::Closed => return Err(SendError::Closed),
            Offer::BackPressured | Offer::AdminAction => continue,
        }
    }
    Err(SendError::Exhausted(max_tries))
}

// -- in-memory channel for tests and in-process clusters --

#[derive(Debug)]
struct Shared {
    queue: VecDeque<Vec<u8>>,
    capacity: usize,
    position: u64,
    receiver_alive: bool,
}

/// create a bounded single-threaded channel pair
pub fn mem_channel(capacity: usize) -> (MemSender, MemReceiver) {
    let shared = Rc::new(RefCell::new(Shared {
        queue: VecDeque::new(),
        capacity,
        position: 0,
        receiver_alive: true,
    }));
    (
        MemSender {
            shared: Rc::clone(&shared),
        },
        MemReceiver { shared },
    )
}

#[derive(Debug, Clone)]
pub struct MemSender {
    shared: Rc<RefCell<Shared>>,
}

impl Sender for MemSender {
    fn offer(&mut self, frame: &[u8]) -> Offer {
        let mut shared = self.shared.borrow_mut();
        if !shared.receiver_alive {
            return Offer::Closed;
        }
        if shared.queue.len() >= shared.capacity {
            return Offer::BackPressured;
        }
        shared.position += frame.len() as u64;
        let position = shared.position;
        shared.queue.push_back(frame.to_vec());
        Offer::Position(position)
    }
}

#[derive(Debug)]
pub struct MemReceiver {
    shared: Rc<RefCell<Shared>>,
}

impl Receiver for MemReceiver {
    fn poll(&mut self, handler: &mut dyn FnMut(&[u8]), limit: usize) -> usize {
        for count in 0..limit {
            // pop before invoking so the handler may offer into this
            // same channel without re-entrant borrow panics
            let frame = match self.shared.borrow_mut().queue.pop_front() {
                Some(frame) => frame,
                None => return count,
            };
            handler(&frame);
        }
        limit
    }
}

impl Drop for MemReceiver {
    fn drop(&mut self) {
        self.shared.borrow_mut().receiver_alive = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_and_poll_round_trip() {
        let (mut tx, mut rx) = mem_channel(4);
        assert!(matches!(tx.offer(b"hello"), Offer::Position(_)));

        let mut seen = Vec::new();
        let n = rx.poll(&mut |frame| seen.push(frame.to_vec()), 8);
        assert_eq!(n, 1);
        assert_eq!(seen, vec![b"hello".to_vec()]);
    }

    #[test]
    fn full_channel_back_pressures() {
        let (mut tx, _rx) = mem_channel(1);
        assert!(matches!(tx.offer(b"a"), Offer::Position(_)));
        assert_eq!(tx.offer(b"b"), Offer::BackPressured);
    }

    #[test]
    fn dropped_receiver_closes_channel() {
        let (mut tx, rx) = mem_channel(1);
        drop(rx);
        assert_eq!(tx.offer(b"a"), Offer::Closed);
    }

    #[test]
    fn retry_gives_up_after_max_tries() {
        let (mut tx, _rx) = mem_channel(1);
        assert!(matches!(tx.offer(b"fill"), Offer::Position(_)));
        let err = offer_with_retry(&mut tx, b"again", 3).unwrap_err();
        assert_eq!(err, SendError::Exhausted(3));
    }

    #[test]
    fn retry_does_not_retry_terminal_failures() {
        let (mut tx, rx) = mem_channel(1);
        drop(rx);
        let err = offer_with_retry(&mut tx, b"x", 3).unwrap_err();
        assert_eq!(err, SendError::Closed);
    }
}
