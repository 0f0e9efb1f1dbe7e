//! Reassembly and ordering: per-`message_seq` fragment
//! buffers for fragmented handshakes, plus a pending-message queue for
//! handshake records that arrived before their turn.

use std::collections::HashMap;

use crate::handshake::message::{FragmentHeader, HandshakeType};

/// Tracks which byte ranges `[offset, offset+len)` of one message's body
/// have been covered by fragments received so far. Overlapping fragments
/// are tolerated as long as they agree on overlapping bytes; this buffer
/// doesn't re-check agreement byte-for-byte (the record layer is assumed
/// to deliver a consistent datagram stream), it only tracks coverage.
struct FragmentBuffer {
    msg_type: HandshakeType,
    total_length: u32,
    data: Vec<u8>,
    covered: Vec<(u32, u32)>,
}

impl FragmentBuffer {
    fn new(msg_type: HandshakeType, total_length: u32) -> FragmentBuffer {
        FragmentBuffer {
            msg_type,
            total_length,
            data: vec![0u8; total_length as usize],
            covered: Vec::new(),
        }
    }

    fn add_fragment(&mut self, offset: u32, fragment: &[u8]) {
        let end = offset + fragment.len() as u32;
        if end > self.total_length {
            // A fragment claiming to extend past the message's declared
            // total length is malformed; silently clamp rather than
            // panicking, since duplicate/bogus fragments must not be
            // able to desync the driver; only decode errors on the
            // *accepted* message are surfaced as MalformedMessage.
            let usable = (self.total_length - offset) as usize;
            if usable == 0 {
                return;
            }
            self.data[offset as usize..self.total_length as usize].copy_from_slice(&fragment[..usable]);
            self.merge_range(offset, self.total_length);
            return;
        }

        self.data[offset as usize..end as usize].copy_from_slice(fragment);
        self.merge_range(offset, end);
    }

    fn merge_range(&mut self, start: u32, end: u32) {
        self.covered.push((start, end));
        self.covered.sort_unstable();

        let mut merged = Vec::with_capacity(self.covered.len());
        for &(s, e) in &self.covered {
            if let Some(&mut (_, ref mut last_end)) = merged.last_mut() {
                if s <= *last_end {
                    if e > *last_end {
                        *last_end = e;
                    }
                    continue;
                }
            }
            merged.push((s, e));
        }
        self.covered = merged;
    }

    fn is_complete(&self) -> bool {
        self.covered.len() == 1 && self.covered[0] == (0, self.total_length)
    }
}

/// Per-`message_seq` reassembly buffers for fragmented handshake messages
///. Entries are released as soon as a
/// message is fully assembled.
#[derive(Default)]
pub struct ReassemblyState {
    buffers: HashMap<u16, FragmentBuffer>,
}

impl ReassemblyState {
    pub fn new() -> ReassemblyState {
        ReassemblyState::default()
    }

    /// Feeds one fragment into the reassembly buffer for its
    /// `message_seq`. Returns `Some((msg_type, body))` the moment the
    /// message becomes fully covered; the entry is removed at that point.
    pub fn add_fragment(&mut self, header: FragmentHeader, fragment: &[u8]) -> Option<(HandshakeType, Vec<u8>)> {
        let buffer = self
            .buffers
            .entry(header.message_seq)
            .or_insert_with(|| FragmentBuffer::new(header.msg_type, header.length));

        buffer.add_fragment(header.fragment_offset, fragment);

        if buffer.is_complete() {
            let buffer = self.buffers.remove(&header.message_seq).unwrap();
            Some((buffer.msg_type, buffer.data))
        } else {
            None
        }
    }
}

/// Holds fully-assembled handshake messages that arrived before their
/// turn, keyed by `message_seq`, and drained once the gap in front of
/// them fills. Cleared as gaps fill.
#[derive(Default)]
pub struct PendingMessages {
    messages: HashMap<u16, (HandshakeType, Vec<u8>)>,
}

impl PendingMessages {
    pub fn new() -> PendingMessages {
        PendingMessages::default()
    }

    pub fn park(&mut self, message_seq: u16, msg_type: HandshakeType, body: Vec<u8>) {
        self.messages.insert(message_seq, (msg_type, body));
    }

    /// Removes and returns the parked message for `message_seq`, if any.
    /// A drained message must be removed from the pending buffer exactly
    /// once — this take-by-value API makes a double-drain structurally
    /// impossible.
    pub fn take(&mut self, message_seq: u16) -> Option<(HandshakeType, Vec<u8>)> {
        self.messages.remove(&message_seq)
    }

    pub fn contains(&self, message_seq: u16) -> bool {
        self.messages.contains_key(&message_seq)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(message_seq: u16, length: u32, fragment_offset: u32, fragment_length: u32) -> FragmentHeader {
        FragmentHeader {
            msg_type: HandshakeType::Certificate,
            length,
            message_seq,
            fragment_offset,
            fragment_length,
        }
    }

    #[test]
    fn two_adjacent_fragments_complete_the_message() {
        let mut state = ReassemblyState::new();
        let whole = b"hello, world!!!!".to_vec();
        let (first_half, second_half) = whole.split_at(8);

        assert!(state.add_fragment(header(0, whole.len() as u32, 0, first_half.len() as u32), first_half).is_none());
        let (msg_type, body) = state
            .add_fragment(header(0, whole.len() as u32, first_half.len() as u32, second_half.len() as u32), second_half)
            .expect("second fragment completes coverage");

        assert_eq!(msg_type, HandshakeType::Certificate);
        assert_eq!(body, whole);
    }

    #[test]
    fn overlapping_fragments_are_tolerated() {
        let mut state = ReassemblyState::new();
        let whole = b"0123456789".to_vec();

        // [0..6) then [4..10) overlap on bytes 4..6, consistent with `whole`.
        assert!(state.add_fragment(header(0, 10, 0, 6), &whole[0..6]).is_none());
        let (_, body) = state.add_fragment(header(0, 10, 4, 6), &whole[4..10]).expect("overlap still completes coverage");
        assert_eq!(body, whole);
    }

    #[test]
    fn out_of_order_fragment_arrival_still_completes() {
        let mut state = ReassemblyState::new();
        let whole = b"abcdefgh".to_vec();

        // Tail arrives before the head.
        assert!(state.add_fragment(header(1, 8, 4, 4), &whole[4..8]).is_none());
        let (_, body) = state.add_fragment(header(1, 8, 0, 4), &whole[0..4]).expect("head fills the remaining gap");
        assert_eq!(body, whole);
    }

    #[test]
    fn distinct_message_seqs_reassemble_independently() {
        let mut state = ReassemblyState::new();
        assert!(state.add_fragment(header(0, 4, 0, 2), b"ab").is_none());
        assert!(state.add_fragment(header(1, 4, 0, 2), b"xy").is_none());

        let (_, body0) = state.add_fragment(header(0, 4, 2, 2), b"cd").expect("message_seq 0 completes on its own fragments");
        assert_eq!(body0, b"abcd");
        assert!(state.add_fragment(header(1, 4, 2, 1), b"z").is_none(), "message_seq 1 still has one uncovered byte");
    }

    #[test]
    fn pending_messages_take_removes_exactly_once() {
        let mut pending = PendingMessages::new();
        pending.park(5, HandshakeType::ServerHelloDone, vec![]);
        assert!(pending.contains(5));

        assert!(pending.take(5).is_some());
        assert!(pending.take(5).is_none(), "a drained message must not be returned twice");
        assert!(pending.is_empty());
    }
}
