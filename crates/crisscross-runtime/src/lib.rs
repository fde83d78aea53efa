//! CrissCross Runtime - Node orchestration
//!
//! This crate wires the coordination layer into running processes:
//! 1. Load and validate configuration
//! 2. Install the tracing subscriber
//! 3. Serve the coordinator: commands, heartbeats, periodic liveness scan
//! 4. Run peer nodes: ingest broadcast fan-out into the causal channel
//! 5. Drive players: heartbeat pump, numbered commands, turn waiting

pub mod client;
pub mod config;
pub mod logging;
pub mod node;
pub mod peer;

pub use client::*;
pub use config::*;
pub use logging::*;
pub use node::*;
pub use peer::*;
