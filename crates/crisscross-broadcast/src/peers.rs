//! Fan-out targets

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crisscross_core::PeerId;
use crisscross_transport::Transport;

/// Peer identity to transport handle
///
/// Mutated only through explicit add/remove. Iteration order is unspecified.
#[derive(Default)]
pub struct PeerSet {
    peers: RwLock<HashMap<PeerId, Arc<dyn Transport>>>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the peer was not present before
    pub fn add(&self, peer: PeerId, handle: Arc<dyn Transport>) -> bool {
        self.peers.write().insert(peer, handle).is_none()
    }

    pub fn remove(&self, peer: &PeerId) -> bool {
        self.peers.write().remove(peer).is_some()
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.read().contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Copy of the current entries, so fan-out runs without the lock
    pub fn snapshot(&self) -> Vec<(PeerId, Arc<dyn Transport>)> {
        self.peers
            .read()
            .iter()
            .map(|(p, t)| (p.clone(), Arc::clone(t)))
            .collect()
    }

    /// Sorted peer names
    pub fn ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.peers.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
