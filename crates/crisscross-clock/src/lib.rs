//! CrissCross Clocks - Logical and liveness time
//!
//! This crate implements:
//! - The Lamport clock that stamps broadcast traffic
//! - Time sources for the heartbeat detector (system and manually driven)

pub mod lamport;
pub mod source;

pub use lamport::*;
pub use source::*;
