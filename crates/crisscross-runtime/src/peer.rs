//! Peer node
//!
//! In peer mode every participant runs a [`CausalChannel`]. The ingest loop
//! feeds `Deliver` calls into the channel; delivered messages come out of
//! the channel's delivery stream in causal order and decode back into
//! session events.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crisscross_broadcast::{CausalChannel, DeliveryReceiver};
use crisscross_core::{ClockedMessage, CoordError, CoordResult, PeerId, Rpc, SessionEvent};
use crisscross_transport::{Inbound, InboundSource, Transport};

/// Decode a delivered session event
pub fn decode_event(msg: &ClockedMessage) -> CoordResult<SessionEvent> {
    serde_json::from_slice(&msg.payload).map_err(|e| CoordError::InvalidWireFormat(e.to_string()))
}

/// One member of a broadcast group
pub struct PeerNode {
    channel: Arc<CausalChannel>,
}

impl PeerNode {
    /// Create the node and its delivery stream
    pub fn new(local: PeerId) -> (Self, DeliveryReceiver) {
        let (channel, deliveries) = CausalChannel::new(local);
        (
            PeerNode {
                channel: Arc::new(channel),
            },
            deliveries,
        )
    }

    pub fn channel(&self) -> &Arc<CausalChannel> {
        &self.channel
    }

    pub fn local_peer(&self) -> &PeerId {
        self.channel.local_peer()
    }

    /// Add a fan-out target
    pub fn connect(&self, peer: PeerId, transport: Arc<dyn Transport>) -> bool {
        self.channel.add_peer(peer, transport)
    }

    pub fn disconnect(&self, peer: &PeerId) -> bool {
        self.channel.remove_peer(peer)
    }

    /// Feed one inbound call into the channel
    ///
    /// Returns how many messages became deliverable.
    pub fn ingest(&self, inbound: Inbound) -> usize {
        match inbound.rpc {
            Rpc::Deliver(msg) => self.channel.receive(msg).len(),
            other => {
                debug!(from = %inbound.from, method = other.method(), "Non-broadcast call ignored");
                0
            }
        }
    }

    /// Ingest until the source closes
    pub fn spawn_ingest(&self, mut source: impl InboundSource + 'static) -> JoinHandle<()> {
        let node = PeerNode {
            channel: Arc::clone(&self.channel),
        };
        tokio::spawn(async move {
            while let Some(inbound) = source.next_inbound().await {
                node.ingest(inbound);
            }
            info!(peer = %node.local_peer(), "Ingest loop stopped");
        })
    }
}
