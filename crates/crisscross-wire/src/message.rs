//! Clocked message encoding
//!
//! Header is 20 bytes:
//! - Byte 0: Wire version (high nibble), reserved (low nibble)
//! - Byte 1: Message kind
//! - Bytes 2-3: Sender name length (LE)
//! - Bytes 4-11: Logical time (LE)
//! - Bytes 12-19: Sequence (LE)
//!
//! followed by the sender name (UTF-8), a 4 byte payload length (LE) and
//! the payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crisscross_core::{ClockedMessage, CoordError, CoordResult, LogicalTime, MessageKind, PeerId};

/// Fixed message header size in bytes
pub const MESSAGE_HEADER_SIZE: usize = 20;

/// Current wire protocol version
pub const WIRE_VERSION: u8 = 1;

/// Longest sender name the header can describe
pub const MAX_SENDER_LEN: usize = u16::MAX as usize;

/// Encode a clocked message
pub fn encode_message(msg: &ClockedMessage, buf: &mut BytesMut) -> CoordResult<()> {
    let sender = msg.sender.as_str().as_bytes();
    if sender.len() > MAX_SENDER_LEN {
        return Err(CoordError::InvalidWireFormat(format!(
            "Sender name too long: {} bytes",
            sender.len()
        )));
    }
    let payload_len = u32::try_from(msg.payload.len())
        .map_err(|_| CoordError::InvalidWireFormat("Payload too large".into()))?;

    buf.reserve(encoded_len(msg));
    buf.put_u8(WIRE_VERSION << 4);
    buf.put_u8(msg.kind.to_byte());
    buf.put_u16_le(sender.len() as u16);
    buf.put_u64_le(msg.logical_time.value());
    buf.put_u64_le(msg.sequence);
    buf.put_slice(sender);
    buf.put_u32_le(payload_len);
    buf.put_slice(&msg.payload);
    Ok(())
}

/// Bytes needed to encode a message
pub fn encoded_len(msg: &ClockedMessage) -> usize {
    MESSAGE_HEADER_SIZE + msg.sender.as_str().len() + 4 + msg.payload.len()
}

/// Decode a clocked message, consuming it from the front of `buf`
pub fn decode_message(buf: &mut Bytes) -> CoordResult<ClockedMessage> {
    if buf.len() < MESSAGE_HEADER_SIZE {
        return Err(CoordError::BufferTooShort {
            expected: MESSAGE_HEADER_SIZE,
            actual: buf.len(),
        });
    }

    let version = buf.get_u8() >> 4;
    if version != WIRE_VERSION {
        return Err(CoordError::InvalidWireFormat(format!(
            "Unsupported wire version {}",
            version
        )));
    }

    let kind_byte = buf.get_u8();
    let kind = MessageKind::from_byte(kind_byte).ok_or(CoordError::UnknownMessageKind(kind_byte))?;
    let sender_len = buf.get_u16_le() as usize;
    let logical_time = LogicalTime(buf.get_u64_le());
    let sequence = buf.get_u64_le();

    if buf.len() < sender_len + 4 {
        return Err(CoordError::BufferTooShort {
            expected: MESSAGE_HEADER_SIZE + sender_len + 4,
            actual: MESSAGE_HEADER_SIZE + buf.len(),
        });
    }
    let sender = std::str::from_utf8(&buf[..sender_len])
        .map_err(|_| CoordError::InvalidWireFormat("Sender is not UTF-8".into()))?
        .to_owned();
    buf.advance(sender_len);

    let payload_len = buf.get_u32_le() as usize;
    if buf.len() < payload_len {
        return Err(CoordError::BufferTooShort {
            expected: payload_len,
            actual: buf.len(),
        });
    }
    let payload = buf.split_to(payload_len);

    Ok(ClockedMessage {
        logical_time,
        sender: PeerId::new(sender),
        sequence,
        kind,
        payload,
    })
}
