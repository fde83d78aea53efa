//! CrissCross Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every coordination component:
//! - Identifiers (ActorId, PeerId, SessionId)
//! - Logical time and clocked broadcast messages
//! - The command envelope and its replies
//! - Session settings
//! - Client callbacks and session events
//! - Remote calls
//! - The error taxonomy

pub mod id;
pub mod time;
pub mod message;
pub mod command;
pub mod settings;
pub mod callback;
pub mod event;
pub mod rpc;
pub mod error;

pub use id::*;
pub use time::*;
pub use message::*;
pub use command::*;
pub use settings::*;
pub use callback::*;
pub use event::*;
pub use rpc::*;
pub use error::*;
