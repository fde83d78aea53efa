//! CrissCross Session - The turn-based session state machine
//!
//! This crate provides:
//! - `Session`: one puzzle game with its participants and turn order
//! - `SessionCoordinator`: the session registry and the only mutator of
//!   session state, admitting commands through the sequence guard and
//!   reacting to liveness transitions
//! - Collaborator traits for the puzzle, scoring and the word repository
//! - Notification sinks for centralized (callback) and peer (broadcast) mode
//! - A per-session outbox that keeps notifications in mutation order

pub mod collab;
pub mod coordinator;
pub mod notify;
pub mod outbox;
pub mod session;

pub use collab::*;
pub use coordinator::*;
pub use notify::*;
pub use outbox::*;
pub use session::*;
