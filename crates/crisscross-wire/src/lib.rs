//! CrissCross Wire Protocol - Binary frame format
//!
//! This crate implements the wire format exchanged between processes:
//! - Clocked message header (20 bytes) + sender + payload
//! - RPC frames (1 byte frame type + body)

pub mod frame;
pub mod message;

pub use frame::*;
pub use message::*;
