//! CrissCross Transport Layer - Remote calls between processes
//!
//! This crate provides:
//! - The `Transport` trait every component sends through
//! - An in-process transport with failure injection
//! - UDP transport

pub mod local;
pub mod udp;

pub use local::*;
pub use udp::*;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crisscross_core::{CoordResult, PeerId, Rpc};

/// Result of one remote call
pub type TransportResult<T> = CoordResult<T>;

/// A remote call arriving at an endpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inbound {
    /// Calling process
    pub from: PeerId,
    pub rpc: Rpc,
}

/// Outbound half of a remote procedure call mechanism
///
/// Calls are one-way and at-least-once at best. A failed call reports
/// `PeerUnreachable` or `Transport`; callers decide whether that matters.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Identity this transport sends as
    fn local_peer(&self) -> &PeerId;

    /// Invoke `rpc` on `peer`
    async fn call(&self, peer: &PeerId, rpc: Rpc) -> TransportResult<()>;
}

/// A stream of inbound calls, whichever transport produced it
#[async_trait]
pub trait InboundSource: Send {
    /// Next call; `None` once the transport has shut down
    async fn next_inbound(&mut self) -> Option<Inbound>;
}

#[async_trait]
impl InboundSource for mpsc::UnboundedReceiver<Inbound> {
    async fn next_inbound(&mut self) -> Option<Inbound> {
        self.recv().await
    }
}

#[async_trait]
impl InboundSource for mpsc::Receiver<Inbound> {
    async fn next_inbound(&mut self) -> Option<Inbound> {
        self.recv().await
    }
}
