//! In-process transport
//!
//! Endpoints registered on one `LocalNetwork` reach each other through
//! unbounded channels. Peers can be marked unreachable to exercise failure
//! paths without sockets.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crisscross_core::{CoordError, PeerId, Rpc};

use crate::{Inbound, Transport, TransportResult};

/// Inbound call stream of one endpoint
pub type InboundReceiver = mpsc::UnboundedReceiver<Inbound>;

#[derive(Default)]
struct Registry {
    endpoints: HashMap<PeerId, mpsc::UnboundedSender<Inbound>>,
    unreachable: HashSet<PeerId>,
}

/// Shared in-process call fabric
#[derive(Clone, Default)]
pub struct LocalNetwork {
    registry: Arc<RwLock<Registry>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint; replaces any previous endpoint of that name
    pub fn register(&self, peer: PeerId) -> (LocalTransport, InboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry.write().endpoints.insert(peer.clone(), tx);
        (
            LocalTransport {
                local: peer,
                network: self.clone(),
            },
            rx,
        )
    }

    /// A sending handle that has no inbound endpoint of its own
    pub fn sender(&self, peer: PeerId) -> LocalTransport {
        LocalTransport {
            local: peer,
            network: self.clone(),
        }
    }

    pub fn unregister(&self, peer: &PeerId) -> bool {
        self.registry.write().endpoints.remove(peer).is_some()
    }

    /// Make every call to `peer` fail until healed
    pub fn partition(&self, peer: &PeerId) {
        self.registry.write().unreachable.insert(peer.clone());
    }

    pub fn heal(&self, peer: &PeerId) {
        self.registry.write().unreachable.remove(peer);
    }

    pub fn is_registered(&self, peer: &PeerId) -> bool {
        self.registry.read().endpoints.contains_key(peer)
    }

    fn deliver(&self, from: &PeerId, to: &PeerId, rpc: Rpc) -> TransportResult<()> {
        let registry = self.registry.read();
        if registry.unreachable.contains(to) {
            return Err(CoordError::PeerUnreachable(to.clone()));
        }
        let endpoint = registry
            .endpoints
            .get(to)
            .ok_or_else(|| CoordError::PeerUnreachable(to.clone()))?;
        endpoint
            .send(Inbound {
                from: from.clone(),
                rpc,
            })
            .map_err(|_| CoordError::PeerUnreachable(to.clone()))
    }
}

/// Sending handle bound to one local identity
#[derive(Clone)]
pub struct LocalTransport {
    local: PeerId,
    network: LocalNetwork,
}

impl LocalTransport {
    pub fn network(&self) -> &LocalNetwork {
        &self.network
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn local_peer(&self) -> &PeerId {
        &self.local
    }

    async fn call(&self, peer: &PeerId, rpc: Rpc) -> TransportResult<()> {
        self.network.deliver(&self.local, peer, rpc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crisscross_core::{ActorId, Callback, SessionId};

    #[tokio::test]
    async fn test_call_reaches_registered_endpoint() {
        let network = LocalNetwork::new();
        let (alice, _alice_rx) = network.register(PeerId::new("alice"));
        let (_bob, mut bob_rx) = network.register(PeerId::new("bob"));

        alice
            .call(&PeerId::new("bob"), Rpc::Callback(Callback::OnGameStart))
            .await
            .unwrap();

        let inbound = bob_rx.recv().await.unwrap();
        assert_eq!(inbound.from, PeerId::new("alice"));
        assert_eq!(inbound.rpc, Rpc::Callback(Callback::OnGameStart));
    }

    #[tokio::test]
    async fn test_unknown_peer_unreachable() {
        let network = LocalNetwork::new();
        let sender = network.sender(PeerId::new("coordinator"));

        let err = sender
            .call(&PeerId::new("ghost"), Rpc::Callback(Callback::OnGameStart))
            .await
            .unwrap_err();
        assert_eq!(err, CoordError::PeerUnreachable(PeerId::new("ghost")));
    }

    #[tokio::test]
    async fn test_partition_and_heal() {
        let network = LocalNetwork::new();
        let sender = network.sender(PeerId::new("alice"));
        let (_bob, mut bob_rx) = network.register(PeerId::new("bob"));
        let bob = PeerId::new("bob");
        let ping = Rpc::Heartbeat {
            session: SessionId(1),
            actor: ActorId::new("alice"),
        };

        network.partition(&bob);
        assert!(sender.call(&bob, ping.clone()).await.is_err());

        network.heal(&bob);
        sender.call(&bob, ping.clone()).await.unwrap();
        assert_eq!(bob_rx.recv().await.unwrap().rpc, ping);
    }

    #[tokio::test]
    async fn test_dropped_receiver_unreachable() {
        let network = LocalNetwork::new();
        let sender = network.sender(PeerId::new("alice"));
        let (_bob, bob_rx) = network.register(PeerId::new("bob"));
        drop(bob_rx);

        assert!(sender
            .call(&PeerId::new("bob"), Rpc::Callback(Callback::OnGameStart))
            .await
            .is_err());
        assert!(network.unregister(&PeerId::new("bob")));
        assert!(!network.is_registered(&PeerId::new("bob")));
    }
}
