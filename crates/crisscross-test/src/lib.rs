//! CrissCross Test Harness - Chaos testing and coordination validation
//!
//! This crate provides:
//! - Seeded chaos links (latency, jitter, loss, reordering, duplication)
//! - A multi-peer causal broadcast simulator
//! - In-memory collaborators and a coordinator harness with a manual clock

pub mod chaos;
pub mod fixtures;
pub mod simulator;

pub use chaos::*;
pub use fixtures::*;
pub use simulator::*;
