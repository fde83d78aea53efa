//! CrissCross Broadcast - Ordered delivery across peers
//!
//! This crate provides:
//! - `DeliveryState`: last delivered sequence per sender
//! - `PeerSet`: fan-out targets
//! - `CausalChannel`: Lamport-stamped broadcast with strict per-sender
//!   FIFO contiguity and a `(logical_time, sender)` global tie-break

pub mod channel;
pub mod delivery;
pub mod peers;

pub use channel::*;
pub use delivery::*;
pub use peers::*;
