//! # Outbound message queue (component C)
//!
//! The original queue is an intrusive singly-linked list guarded by a
//! `pthread_mutex_t`, with a parallel "seen ids" list used for UDP
//! deduplication. Here both become a plain `VecDeque`, and the explicit
//! lock/unlock contract becomes RAII: `tokio::sync::Mutex::lock` returns
//! a guard whose `Drop` releases it, so the Sender/FSM can hold the guard
//! across a multi-step transaction just by keeping it in scope.

use std::collections::VecDeque;

use crate::codec::{MessageFlag, MessageKind};
use crate::input::CommandKind;

/// One entry in the outbound queue: an already-assembled wire frame plus
/// the bookkeeping the Sender/FSM need to decide its fate.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub buffer: Vec<u8>,
    pub flags: MessageFlag,
    pub kind: CommandKind,
    pub send_count: u8,
}

impl QueueEntry {
    pub fn new(buffer: Vec<u8>, flags: MessageFlag, kind: CommandKind) -> Self {
        Self {
            buffer,
            flags,
            kind,
            send_count: 0,
        }
    }
}

/// A `(high, low)` message-id pair recorded for UDP deduplication, paired
/// with the wire kind of the frame that produced it — dedup operates on
/// what the server actually sent, not on the client's own command
/// vocabulary, so this tracks `codec::MessageKind` rather than `CommandKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeenId {
    pub kind: MessageKind,
    pub high: u8,
    pub low: u8,
}

/// The outbound FIFO plus the side "seen ids" list, mirroring the
/// original's two linked lists under one mutex.
#[derive(Debug, Default)]
pub struct MessageQueue {
    entries: VecDeque<QueueEntry>,
    seen_ids: Vec<SeenId>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            seen_ids: Vec::new(),
        }
    }

    /// Deep-copy `buf` into a new entry at the tail (ordinary outbound traffic).
    pub fn push_back(&mut self, buf: &[u8], flags: MessageFlag, kind: CommandKind) {
        self.entries.push_back(QueueEntry::new(buf.to_vec(), flags, kind));
    }

    /// Deep-copy `buf` into a new entry at the head, used for CONFIRM and
    /// confirmation-bearing replies that must go out ahead of anything
    /// already queued.
    pub fn push_front(&mut self, buf: &[u8], flags: MessageFlag, kind: CommandKind) {
        self.entries.push_front(QueueEntry::new(buf.to_vec(), flags, kind));
    }

    /// Record a `(high, low)` id pair in the seen-ids side list, used for
    /// UDP deduplication of retransmitted inbound frames.
    pub fn push_id_only(&mut self, high: u8, low: u8, kind: MessageKind) {
        self.seen_ids.push(SeenId { kind, high, low });
    }

    pub fn peek(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Linear scan of the seen-ids list for a matching `(kind, high, low)`.
    pub fn contains_id(&self, kind: MessageKind, high: u8, low: u8) -> bool {
        self.seen_ids
            .iter()
            .any(|seen| seen.kind == kind && seen.high == high && seen.low == low)
    }

    /// Patch the message-id header bytes (offsets 1-2) of the head entry's
    /// buffer in place.
    pub fn set_head_msg_id(&mut self, msg_id: u16) {
        if let Some(head) = self.entries.front_mut() {
            if head.buffer.len() >= 3 {
                head.buffer[1..3].copy_from_slice(&msg_id.to_be_bytes());
            }
        }
    }

    pub fn set_head_flags(&mut self, flags: MessageFlag) {
        if let Some(head) = self.entries.front_mut() {
            head.flags = flags;
        }
    }

    pub fn head_flags(&self) -> Option<MessageFlag> {
        self.entries.front().map(|e| e.flags)
    }

    pub fn head_kind(&self) -> Option<CommandKind> {
        self.entries.front().map(|e| e.kind)
    }

    /// Increment the head entry's retransmission counter.
    pub fn mark_sent(&mut self) {
        if let Some(head) = self.entries.front_mut() {
            head.send_count = head.send_count.saturating_add(1);
        }
    }

    /// Drop every queued entry, used when a signal or protocol error
    /// requires the queue to be purged before enqueuing ERR/BYE.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
