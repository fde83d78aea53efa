//! RPC frame structure
//!
//! Frame = Frame type (1 byte) + Body
//!
//! `Deliver` bodies use the binary clocked message encoding. All other
//! bodies are JSON, since they are small and only exchanged between the
//! coordinator and its players.

use bytes::{Bytes, BytesMut, BufMut};
use crisscross_core::{
    ActorId, Callback, CommandEnvelope, CoordError, CoordResult, Reply, Rpc, Scope, SequenceStatus,
    SessionId,
};

use crate::{decode_message, encode_message, encoded_len};

/// Largest frame that fits in one UDP datagram
pub const MAX_FRAME_SIZE: usize = 65_507;

/// Frame type tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Deliver = 0x01,
    Callback = 0x02,
    Heartbeat = 0x03,
    Command = 0x04,
    Reply = 0x05,
    SequenceQuery = 0x06,
    SequenceReport = 0x07,
}

impl FrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(FrameType::Deliver),
            0x02 => Some(FrameType::Callback),
            0x03 => Some(FrameType::Heartbeat),
            0x04 => Some(FrameType::Command),
            0x05 => Some(FrameType::Reply),
            0x06 => Some(FrameType::SequenceQuery),
            0x07 => Some(FrameType::SequenceReport),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn of(rpc: &Rpc) -> Self {
        match rpc {
            Rpc::Deliver(_) => FrameType::Deliver,
            Rpc::Callback(_) => FrameType::Callback,
            Rpc::Heartbeat { .. } => FrameType::Heartbeat,
            Rpc::Command(_) => FrameType::Command,
            Rpc::Reply { .. } => FrameType::Reply,
            Rpc::SequenceQuery { .. } => FrameType::SequenceQuery,
            Rpc::SequenceReport { .. } => FrameType::SequenceReport,
        }
    }
}

fn json_err(e: serde_json::Error) -> CoordError {
    CoordError::InvalidWireFormat(e.to_string())
}

/// Serialize one remote call into a frame
pub fn encode_rpc(rpc: &Rpc) -> CoordResult<Bytes> {
    let mut buf = BytesMut::new();
    buf.put_u8(FrameType::of(rpc).to_byte());

    match rpc {
        Rpc::Deliver(msg) => {
            buf.reserve(encoded_len(msg));
            encode_message(msg, &mut buf)?;
        }
        Rpc::Callback(callback) => {
            buf.put_slice(&serde_json::to_vec(callback).map_err(json_err)?);
        }
        Rpc::Heartbeat { session, actor } => {
            buf.put_slice(&serde_json::to_vec(&(session, actor)).map_err(json_err)?);
        }
        Rpc::Command(envelope) => {
            buf.put_slice(&serde_json::to_vec(envelope).map_err(json_err)?);
        }
        Rpc::Reply {
            scope,
            sequence,
            reply,
        } => {
            buf.put_slice(&serde_json::to_vec(&(scope, sequence, reply)).map_err(json_err)?);
        }
        Rpc::SequenceQuery {
            actor,
            scope,
            advance_to,
        } => {
            buf.put_slice(&serde_json::to_vec(&(actor, scope, advance_to)).map_err(json_err)?);
        }
        Rpc::SequenceReport { scope, status } => {
            buf.put_slice(&serde_json::to_vec(&(scope, status)).map_err(json_err)?);
        }
    }

    if buf.len() > MAX_FRAME_SIZE {
        return Err(CoordError::InvalidWireFormat(format!(
            "Frame too large: {} > {}",
            buf.len(),
            MAX_FRAME_SIZE
        )));
    }
    Ok(buf.freeze())
}

/// Parse a frame back into a remote call
pub fn decode_rpc(frame: Bytes) -> CoordResult<Rpc> {
    if frame.is_empty() {
        return Err(CoordError::BufferTooShort {
            expected: 1,
            actual: 0,
        });
    }

    let frame_type = FrameType::from_byte(frame[0])
        .ok_or_else(|| CoordError::InvalidWireFormat(format!("Unknown frame type {:#04x}", frame[0])))?;
    let mut body = frame.slice(1..);

    let rpc = match frame_type {
        FrameType::Deliver => {
            let msg = decode_message(&mut body)?;
            if !body.is_empty() {
                return Err(CoordError::InvalidWireFormat(format!(
                    "{} trailing bytes after message",
                    body.len()
                )));
            }
            Rpc::Deliver(msg)
        }
        FrameType::Callback => {
            let callback: Callback = serde_json::from_slice(&body).map_err(json_err)?;
            Rpc::Callback(callback)
        }
        FrameType::Heartbeat => {
            let (session, actor): (SessionId, ActorId) =
                serde_json::from_slice(&body).map_err(json_err)?;
            Rpc::Heartbeat { session, actor }
        }
        FrameType::Command => {
            let envelope: CommandEnvelope = serde_json::from_slice(&body).map_err(json_err)?;
            Rpc::Command(envelope)
        }
        FrameType::Reply => {
            let (scope, sequence, reply): (Scope, u64, Reply) =
                serde_json::from_slice(&body).map_err(json_err)?;
            Rpc::Reply {
                scope,
                sequence,
                reply,
            }
        }
        FrameType::SequenceQuery => {
            let (actor, scope, advance_to): (ActorId, Scope, Option<u64>) =
                serde_json::from_slice(&body).map_err(json_err)?;
            Rpc::SequenceQuery {
                actor,
                scope,
                advance_to,
            }
        }
        FrameType::SequenceReport => {
            let (scope, status): (Scope, SequenceStatus) =
                serde_json::from_slice(&body).map_err(json_err)?;
            Rpc::SequenceReport { scope, status }
        }
    };
    Ok(rpc)
}
