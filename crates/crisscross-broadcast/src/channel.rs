//! Causal broadcast channel
//!
//! Every process runs one channel. Outgoing messages are stamped with the
//! Lamport clock and the next own sequence, enqueued locally and fanned out
//! to all peers concurrently. Incoming messages advance the clock and wait
//! in the pending queue until they are contiguous for their sender.
//!
//! Delivered messages are pushed onto the delivery stream while the state
//! lock is held, so the stream order is exactly the delivery order.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crisscross_clock::LogicalClock;
use crisscross_core::{ClockedMessage, LogicalTime, MessageKind, PeerId, Rpc};
use crisscross_transport::Transport;

use crate::{DeliveryState, Enqueue, PeerSet, PendingQueue};

/// Delivery stream handed to the local consumer
pub type DeliveryReceiver = mpsc::UnboundedReceiver<ClockedMessage>;

/// Per-peer results of one broadcast
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Peers a send was attempted to
    pub attempted: usize,
    /// Peers whose call failed
    pub unreachable: Vec<PeerId>,
}

impl FanoutReport {
    pub fn reached(&self) -> usize {
        self.attempted - self.unreachable.len()
    }

    pub fn is_complete(&self) -> bool {
        self.unreachable.is_empty()
    }
}

/// Channel counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub broadcasts: u64,
    pub received: u64,
    pub delivered: u64,
    pub duplicates: u64,
}

struct ChannelState {
    clock: LogicalClock,
    sequence: u64,
    delivery: DeliveryState,
    pending: PendingQueue,
    stats: ChannelStats,
}

/// Causally ordered broadcast endpoint
pub struct CausalChannel {
    local: PeerId,
    peers: PeerSet,
    state: Mutex<ChannelState>,
    deliveries: mpsc::UnboundedSender<ClockedMessage>,
}

impl CausalChannel {
    /// Create a channel and its delivery stream
    pub fn new(local: PeerId) -> (Self, DeliveryReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = CausalChannel {
            local,
            peers: PeerSet::new(),
            state: Mutex::new(ChannelState {
                clock: LogicalClock::new(),
                sequence: 0,
                delivery: DeliveryState::new(),
                pending: PendingQueue::new(),
                stats: ChannelStats::default(),
            }),
            deliveries: tx,
        };
        (channel, rx)
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    /// Add a fan-out target; the local process is never a target
    pub fn add_peer(&self, peer: PeerId, handle: Arc<dyn Transport>) -> bool {
        if peer == self.local {
            return false;
        }
        self.peers.add(peer, handle)
    }

    /// Remove a fan-out target. Delivery state for it is kept.
    pub fn remove_peer(&self, peer: &PeerId) -> bool {
        self.peers.remove(peer)
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.peers.ids()
    }

    /// Stamp, enqueue locally and send to every peer
    pub async fn broadcast(
        &self,
        kind: MessageKind,
        payload: impl Into<Bytes>,
    ) -> (ClockedMessage, FanoutReport) {
        let msg = {
            let mut state = self.state.lock();
            let logical_time = state.clock.tick();
            state.sequence += 1;
            let msg = ClockedMessage::new(logical_time, self.local.clone(), state.sequence, kind, payload);
            state.stats.broadcasts += 1;
            self.enqueue(&mut state, msg.clone());
            msg
        };

        let report = self.fan_out(&msg).await;
        (msg, report)
    }

    async fn fan_out(&self, msg: &ClockedMessage) -> FanoutReport {
        let targets = self.peers.snapshot();
        let attempted = targets.len();

        let calls = targets.into_iter().map(|(peer, handle)| {
            let rpc = Rpc::Deliver(msg.clone());
            async move {
                let result = handle.call(&peer, rpc).await;
                (peer, result)
            }
        });

        let mut unreachable = Vec::new();
        for (peer, result) in join_all(calls).await {
            if let Err(e) = result {
                warn!(%peer, sequence = msg.sequence, "Broadcast fan-out failed: {}", e);
                unreachable.push(peer);
            }
        }
        unreachable.sort();

        FanoutReport {
            attempted,
            unreachable,
        }
    }

    /// Accept a message from the network and deliver what became deliverable
    pub fn receive(&self, msg: ClockedMessage) -> Vec<ClockedMessage> {
        let mut state = self.state.lock();
        state.clock.observe(msg.logical_time);
        state.stats.received += 1;
        self.enqueue(&mut state, msg)
    }

    /// Queue a batch of messages, then drain once
    pub fn receive_batch(&self, msgs: impl IntoIterator<Item = ClockedMessage>) -> Vec<ClockedMessage> {
        let mut state = self.state.lock();
        let state = &mut *state;
        for msg in msgs {
            state.clock.observe(msg.logical_time);
            state.stats.received += 1;
            if state.pending.insert(msg, &state.delivery) == Enqueue::Duplicate {
                state.stats.duplicates += 1;
            }
        }
        self.drain(state)
    }

    fn enqueue(&self, state: &mut ChannelState, msg: ClockedMessage) -> Vec<ClockedMessage> {
        let sender = msg.sender.clone();
        let sequence = msg.sequence;
        if state.pending.insert(msg, &state.delivery) == Enqueue::Duplicate {
            state.stats.duplicates += 1;
            debug!(%sender, sequence, "Duplicate message discarded");
            return Vec::new();
        }
        self.drain(state)
    }

    fn drain(&self, state: &mut ChannelState) -> Vec<ClockedMessage> {
        let delivered = state.pending.drain(&mut state.delivery);
        for msg in &delivered {
            debug!(
                sender = %msg.sender,
                sequence = msg.sequence,
                time = msg.logical_time.value(),
                kind = ?msg.kind,
                "Delivered"
            );
            // A dropped consumer only loses the stream; callers still get the return value
            let _ = self.deliveries.send(msg.clone());
        }
        state.stats.delivered += delivered.len() as u64;
        delivered
    }

    /// Current Lamport time
    pub fn clock(&self) -> LogicalTime {
        self.state.lock().clock.now()
    }

    /// Messages waiting for a predecessor
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Last sequence delivered from `sender`
    pub fn delivered_sequence(&self, sender: &PeerId) -> u64 {
        self.state.lock().delivery.last(sender)
    }

    pub fn stats(&self) -> ChannelStats {
        self.state.lock().stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crisscross_core::CoordError;
    use crisscross_transport::{LocalNetwork, TransportResult};
    use proptest::prelude::*;

    fn msg(sender: &str, sequence: u64, time: u64) -> ClockedMessage {
        ClockedMessage::new(
            LogicalTime(time),
            PeerId::new(sender),
            sequence,
            MessageKind::Guess,
            Bytes::new(),
        )
    }

    struct FailingTransport(PeerId);

    #[async_trait]
    impl Transport for FailingTransport {
        fn local_peer(&self) -> &PeerId {
            &self.0
        }

        async fn call(&self, peer: &PeerId, _rpc: Rpc) -> TransportResult<()> {
            Err(CoordError::PeerUnreachable(peer.clone()))
        }
    }

    #[test]
    fn test_out_of_order_arrival_held() {
        let (channel, _rx) = CausalChannel::new(PeerId::new("r"));

        assert!(channel.receive(msg("bob", 2, 5)).is_empty());
        assert_eq!(channel.pending_len(), 1);
        assert_eq!(channel.clock(), LogicalTime(6));

        let delivered = channel.receive(msg("bob", 1, 3));
        let seqs: Vec<u64> = delivered.iter().map(|m| m.sequence).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(channel.delivered_sequence(&PeerId::new("bob")), 2);
        assert_eq!(channel.pending_len(), 0);
    }

    #[test]
    fn test_concurrent_senders_tie_break() {
        let (channel, _rx) = CausalChannel::new(PeerId::new("r"));
        let delivered = channel.receive_batch(vec![msg("bob", 1, 7), msg("alice", 1, 7)]);
        let senders: Vec<&str> = delivered.iter().map(|m| m.sender.as_str()).collect();
        assert_eq!(senders, vec!["alice", "bob"]);
    }

    #[test]
    fn test_duplicate_counted_not_delivered() {
        let (channel, _rx) = CausalChannel::new(PeerId::new("r"));
        assert_eq!(channel.receive(msg("bob", 1, 1)).len(), 1);
        assert!(channel.receive(msg("bob", 1, 1)).is_empty());

        let stats = channel.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.duplicates, 1);
    }

    #[tokio::test]
    async fn test_broadcast_delivers_locally_and_to_peers() {
        let network = LocalNetwork::new();
        let (alice_tx, _alice_in) = network.register(PeerId::new("alice"));
        let (_bob_tx, mut bob_in) = network.register(PeerId::new("bob"));

        let (alice, mut alice_rx) = CausalChannel::new(PeerId::new("alice"));
        let (bob, mut bob_rx) = CausalChannel::new(PeerId::new("bob"));
        alice.add_peer(PeerId::new("bob"), Arc::new(alice_tx));

        let (sent, report) = alice.broadcast(MessageKind::Join, Bytes::from_static(b"hi")).await;
        assert_eq!(sent.sequence, 1);
        assert_eq!(sent.logical_time, LogicalTime(1));
        assert_eq!(report.reached(), 1);

        // Local consumer sees its own message
        assert_eq!(alice_rx.recv().await.unwrap(), sent);

        let inbound = bob_in.recv().await.unwrap();
        let Rpc::Deliver(remote) = inbound.rpc else {
            panic!("expected a delivery");
        };
        assert_eq!(bob.receive(remote).len(), 1);
        assert_eq!(bob_rx.recv().await.unwrap(), sent);
        assert_eq!(bob.clock(), LogicalTime(2));
    }

    #[tokio::test]
    async fn test_unreachable_peer_does_not_block_others() {
        let network = LocalNetwork::new();
        let (tx, _in) = network.register(PeerId::new("alice"));
        let (_carol_tx, mut carol_in) = network.register(PeerId::new("carol"));

        let (alice, _rx) = CausalChannel::new(PeerId::new("alice"));
        alice.add_peer(PeerId::new("bob"), Arc::new(FailingTransport(PeerId::new("alice"))));
        alice.add_peer(PeerId::new("carol"), Arc::new(tx));

        let (_, report) = alice.broadcast(MessageKind::Guess, Bytes::new()).await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.unreachable, vec![PeerId::new("bob")]);
        assert!(carol_in.recv().await.is_some());
        assert_eq!(alice.delivered_sequence(&PeerId::new("alice")), 1);
    }

    #[test]
    fn test_self_is_never_a_peer() {
        let network = LocalNetwork::new();
        let (alice, _rx) = CausalChannel::new(PeerId::new("alice"));
        assert!(!alice.add_peer(PeerId::new("alice"), Arc::new(network.sender(PeerId::new("alice")))));
        assert!(alice.peers().is_empty());
    }

    /// Per-sender streams with strictly increasing times, as a real sender stamps them
    fn streams() -> impl Strategy<Value = Vec<ClockedMessage>> {
        proptest::collection::vec(proptest::collection::vec(1u64..4, 1..8), 1..4).prop_map(|gaps| {
            let mut all = Vec::new();
            for (i, sender_gaps) in gaps.iter().enumerate() {
                let sender = format!("p{}", i);
                let mut time = 0;
                for (seq, gap) in sender_gaps.iter().enumerate() {
                    time += gap;
                    all.push(msg(&sender, seq as u64 + 1, time));
                }
            }
            all
        })
    }

    proptest! {
        #[test]
        fn prop_any_arrival_order_is_fifo_and_complete(
            (all, arrival) in streams().prop_flat_map(|all| {
                let shuffled = Just(all.clone()).prop_shuffle();
                (Just(all), shuffled)
            })
        ) {
            let (channel, _rx) = CausalChannel::new(PeerId::new("r"));
            let mut delivered = Vec::new();
            for m in arrival {
                let batch = channel.receive(m);
                for pair in batch.windows(2) {
                    prop_assert!(pair[0].order_key() <= pair[1].order_key()
                        || pair[0].sender == pair[1].sender);
                }
                delivered.extend(batch);
            }

            prop_assert_eq!(delivered.len(), all.len());
            prop_assert_eq!(channel.pending_len(), 0);
            let mut last = std::collections::HashMap::new();
            for m in &delivered {
                let prev = last.insert(m.sender.clone(), m.sequence).unwrap_or(0);
                prop_assert_eq!(m.sequence, prev + 1);
            }
        }

        #[test]
        fn prop_batch_delivery_is_globally_ordered(
            arrival in streams().prop_shuffle()
        ) {
            let (channel, _rx) = CausalChannel::new(PeerId::new("r"));
            let delivered = channel.receive_batch(arrival.clone());
            prop_assert_eq!(delivered.len(), arrival.len());
            for pair in delivered.windows(2) {
                prop_assert!(pair[0].order_key() < pair[1].order_key());
            }
        }

        #[test]
        fn prop_duplicated_arrivals_deliver_once(
            arrival in streams().prop_flat_map(|all| {
                let doubled: Vec<_> = all.iter().cloned().chain(all.iter().cloned()).collect();
                Just(doubled).prop_shuffle()
            })
        ) {
            let (channel, _rx) = CausalChannel::new(PeerId::new("r"));
            let mut count = 0;
            for m in arrival.iter().cloned() {
                count += channel.receive(m).len();
            }
            prop_assert_eq!(count * 2, arrival.len());
        }
    }
}
