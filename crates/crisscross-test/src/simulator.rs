//! Multi-peer broadcast simulator
//!
//! Every simulated peer owns a [`CausalChannel`] with no transport peers.
//! A broadcast is stamped by the sender's channel, encoded with the wire
//! codec and pushed onto one [`ChaosNetwork`] link per receiver. Ticking the
//! simulator decodes arrivals and feeds them to the receivers' channels.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::{Bytes, BytesMut};

use crisscross_broadcast::{CausalChannel, DeliveryReceiver};
use crisscross_core::{ClockedMessage, CoordResult, MessageKind, PeerId};
use crisscross_wire::{decode_message, encode_message};

use crate::chaos::{ChaosConfig, ChaosNetwork, ChaosStats};

struct SimPeer {
    channel: CausalChannel,
    deliveries: DeliveryReceiver,
    delivered: Vec<ClockedMessage>,
}

/// N peers connected pairwise by chaos links
pub struct BroadcastSimulator {
    peers: BTreeMap<PeerId, SimPeer>,
    links: BTreeMap<(PeerId, PeerId), ChaosNetwork<Bytes>>,
    config: ChaosConfig,
    seed: u64,
    current_time: Duration,
}

impl BroadcastSimulator {
    pub fn new(config: ChaosConfig, seed: u64) -> Self {
        BroadcastSimulator {
            peers: BTreeMap::new(),
            links: BTreeMap::new(),
            config,
            seed,
            current_time: Duration::ZERO,
        }
    }

    /// Add a peer and links to and from every existing peer
    pub fn add_peer(&mut self, peer: PeerId) {
        let existing: Vec<PeerId> = self.peers.keys().cloned().collect();
        for other in existing {
            self.add_link(peer.clone(), other.clone());
            self.add_link(other, peer.clone());
        }
        let (channel, deliveries) = CausalChannel::new(peer.clone());
        self.peers.insert(
            peer,
            SimPeer {
                channel,
                deliveries,
                delivered: Vec::new(),
            },
        );
    }

    fn add_link(&mut self, from: PeerId, to: PeerId) {
        let seed = self.seed.wrapping_add(self.links.len() as u64);
        self.links
            .insert((from, to), ChaosNetwork::new(self.config.clone(), seed));
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.keys().cloned().collect()
    }

    /// Broadcast from `from`; returns the stamped message
    pub async fn broadcast(
        &mut self,
        from: &PeerId,
        kind: MessageKind,
        payload: impl Into<Bytes>,
    ) -> CoordResult<Option<ClockedMessage>> {
        let Some(sender) = self.peers.get(from) else {
            return Ok(None);
        };
        let (msg, _) = sender.channel.broadcast(kind, payload).await;

        let mut buf = BytesMut::new();
        encode_message(&msg, &mut buf)?;
        let frame = buf.freeze();
        for ((src, _), link) in self.links.iter_mut() {
            if src == from {
                link.send(frame.clone());
            }
        }
        Ok(Some(msg))
    }

    /// Advance time, feed arrivals into receivers, collect deliveries
    pub fn tick(&mut self, dt: Duration) -> CoordResult<usize> {
        self.current_time += dt;
        let mut arrivals = 0;
        for ((_, to), link) in self.links.iter_mut() {
            let frames = link.tick(dt);
            if frames.is_empty() {
                continue;
            }
            let Some(receiver) = self.peers.get(to) else {
                continue;
            };
            for mut frame in frames {
                let msg = decode_message(&mut frame)?;
                receiver.channel.receive(msg);
                arrivals += 1;
            }
        }
        self.collect();
        Ok(arrivals)
    }

    fn collect(&mut self) {
        for peer in self.peers.values_mut() {
            while let Ok(msg) = peer.deliveries.try_recv() {
                peer.delivered.push(msg);
            }
        }
    }

    /// Tick until every link is empty or `limit` elapses
    pub fn settle(&mut self, step: Duration, limit: Duration) -> CoordResult<bool> {
        let deadline = self.current_time + limit;
        while self.current_time < deadline {
            self.tick(step)?;
            if self.in_flight() == 0 {
                return Ok(true);
            }
        }
        Ok(self.in_flight() == 0)
    }

    pub fn in_flight(&self) -> usize {
        self.links.values().map(|l| l.in_flight()).sum()
    }

    /// Messages delivered at `peer`, in delivery order
    pub fn delivered(&self, peer: &PeerId) -> &[ClockedMessage] {
        self.peers
            .get(peer)
            .map(|p| p.delivered.as_slice())
            .unwrap_or(&[])
    }

    pub fn channel(&self, peer: &PeerId) -> Option<&CausalChannel> {
        self.peers.get(peer).map(|p| &p.channel)
    }

    pub fn link_stats(&self, from: &PeerId, to: &PeerId) -> Option<&ChaosStats> {
        self.links.get(&(from.clone(), to.clone())).map(|l| l.stats())
    }

    pub fn current_time(&self) -> Duration {
        self.current_time
    }
}

/// Simulator builder
pub struct ScenarioBuilder {
    peers: usize,
    config: ChaosConfig,
    seed: u64,
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        ScenarioBuilder {
            peers: 3,
            config: ChaosConfig::default(),
            seed: 0,
        }
    }

    pub fn with_peers(mut self, count: usize) -> Self {
        self.peers = count;
        self
    }

    pub fn with_config(mut self, config: ChaosConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Peers are named `p0`, `p1`, ...
    pub fn build(self) -> (BroadcastSimulator, Vec<PeerId>) {
        let mut sim = BroadcastSimulator::new(self.config, self.seed);
        let ids: Vec<PeerId> = (0..self.peers).map(|i| PeerId::new(format!("p{}", i))).collect();
        for id in &ids {
            sim.add_peer(id.clone());
        }
        (sim, ids)
    }
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Check the delivery order invariants of one peer's log
///
/// Per sender, sequences must be exactly 1, 2, 3, ... with no gaps or
/// repeats. Returns a description of the first violation.
pub fn check_fifo(log: &[ClockedMessage]) -> Result<(), String> {
    let mut last: BTreeMap<&PeerId, u64> = BTreeMap::new();
    for msg in log {
        let prev = last.entry(&msg.sender).or_insert(0);
        if msg.sequence != *prev + 1 {
            return Err(format!(
                "{} delivered sequence {} after {}",
                msg.sender, msg.sequence, prev
            ));
        }
        *prev = msg.sequence;
    }
    Ok(())
}

/// A message is never delivered before one its sender had already seen
pub fn check_causal(log: &[ClockedMessage]) -> Result<(), String> {
    for pair in log.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.sender == b.sender && a.logical_time >= b.logical_time {
            return Err(format!(
                "{} delivered time {} before {}",
                a.sender, a.logical_time, b.logical_time
            ));
        }
    }
    Ok(())
}
