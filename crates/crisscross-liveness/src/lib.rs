//! CrissCross Liveness - Heartbeat failure detection
//!
//! Participants ping the coordinator periodically. The monitor grades each
//! one by how long it has been silent:
//! - Active: silent for less than `T`
//! - Suspected: silent for at least `T` but less than `T * K`
//! - Failed: silent for at least `T * K`
//!
//! Only state changes are reported. Acting on them is up to the caller.

pub mod monitor;

pub use monitor::*;
