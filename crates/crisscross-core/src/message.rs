//! Clocked broadcast messages
//!
//! A clocked message is the unit exchanged between peers: a Lamport
//! timestamp, the sender, the sender's sequence number, a kind tag and an
//! opaque payload. Messages are immutable once stamped.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{LogicalTime, PeerId};

/// Message kind classification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    Join = 0x01,
    Leave = 0x02,
    Guess = 0x10,
    StateUpdate = 0x11,
    GameStart = 0x20,
    GameOver = 0x21,
}

impl MessageKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(MessageKind::Join),
            0x02 => Some(MessageKind::Leave),
            0x10 => Some(MessageKind::Guess),
            0x11 => Some(MessageKind::StateUpdate),
            0x20 => Some(MessageKind::GameStart),
            0x21 => Some(MessageKind::GameOver),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Membership changes (vs game traffic)
    pub fn is_membership(self) -> bool {
        matches!(self, MessageKind::Join | MessageKind::Leave)
    }
}

/// Global delivery order: Lamport time first, sender name as tie-break
pub type OrderKey = (LogicalTime, PeerId);

/// Broadcast message stamped by its sender
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockedMessage {
    /// Lamport time at the sender when stamped
    pub logical_time: LogicalTime,
    /// Sending process
    pub sender: PeerId,
    /// Sender-assigned sequence, strictly increasing from 1
    pub sequence: u64,
    /// What the payload describes
    pub kind: MessageKind,
    /// Opaque payload
    pub payload: Bytes,
}

impl ClockedMessage {
    pub fn new(
        logical_time: LogicalTime,
        sender: PeerId,
        sequence: u64,
        kind: MessageKind,
        payload: impl Into<Bytes>,
    ) -> Self {
        ClockedMessage {
            logical_time,
            sender,
            sequence,
            kind,
            payload: payload.into(),
        }
    }

    /// Key used by receivers to order deliverable messages
    pub fn order_key(&self) -> OrderKey {
        (self.logical_time, self.sender.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_byte_roundtrip() {
        for kind in [
            MessageKind::Join,
            MessageKind::Leave,
            MessageKind::Guess,
            MessageKind::StateUpdate,
            MessageKind::GameStart,
            MessageKind::GameOver,
        ] {
            assert_eq!(MessageKind::from_byte(kind.to_byte()), Some(kind));
        }
        assert_eq!(MessageKind::from_byte(0xFF), None);
    }

    #[test]
    fn test_order_key_ties_break_on_sender() {
        let a = ClockedMessage::new(LogicalTime(4), PeerId::new("alice"), 1, MessageKind::Guess, Bytes::new());
        let b = ClockedMessage::new(LogicalTime(4), PeerId::new("bob"), 1, MessageKind::Guess, Bytes::new());
        let c = ClockedMessage::new(LogicalTime(3), PeerId::new("carol"), 1, MessageKind::Guess, Bytes::new());

        assert!(a.order_key() < b.order_key());
        assert!(c.order_key() < a.order_key());
    }
}
