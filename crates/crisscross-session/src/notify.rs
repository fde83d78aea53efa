//! Notification delivery
//!
//! The coordinator hands each [`Dispatch`] to a sink after releasing the
//! session lock. Centralized mode turns it into per-player callbacks; peer
//! mode broadcasts the event once on the causal channel.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crisscross_broadcast::CausalChannel;
use crisscross_core::{Dispatch, PeerId, Rpc};
use crisscross_transport::Transport;

/// Where session notifications go
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn dispatch(&self, dispatch: Dispatch);
}

/// Per-player callbacks through a transport
///
/// Each recipient is reached at the peer named after it. Calls run
/// concurrently; a failed call is logged and does not affect the others.
pub struct DirectSink {
    transport: Arc<dyn Transport>,
}

impl DirectSink {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        DirectSink { transport }
    }
}

#[async_trait]
impl NotificationSink for DirectSink {
    async fn dispatch(&self, dispatch: Dispatch) {
        let Dispatch { recipients, event } = dispatch;

        let calls = recipients.into_iter().filter_map(|recipient| {
            let callback = event.callback_for(&recipient)?;
            let transport = Arc::clone(&self.transport);
            Some(async move {
                let peer = PeerId::from(&recipient);
                let method = callback.name();
                if let Err(e) = transport.call(&peer, Rpc::Callback(callback)).await {
                    warn!(%peer, method, "Callback failed: {}", e);
                }
            })
        });

        join_all(calls).await;
    }
}

/// Broadcast on a causal channel
///
/// Every peer receives every event; recipients are not used.
pub struct BroadcastSink {
    channel: Arc<CausalChannel>,
}

impl BroadcastSink {
    pub fn new(channel: Arc<CausalChannel>) -> Self {
        BroadcastSink { channel }
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    async fn dispatch(&self, dispatch: Dispatch) {
        let payload = match serde_json::to_vec(&dispatch.event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Event encoding failed: {}", e);
                return;
            }
        };
        let (msg, report) = self
            .channel
            .broadcast(dispatch.event.message_kind(), payload)
            .await;
        debug!(
            sequence = msg.sequence,
            reached = report.reached(),
            unreachable = report.unreachable.len(),
            "Event broadcast"
        );
    }
}

/// Discards everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn dispatch(&self, _dispatch: Dispatch) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crisscross_core::{ActorId, Callback, SessionEvent, SessionId};
    use crisscross_transport::LocalNetwork;

    #[tokio::test]
    async fn test_direct_sink_expands_callbacks() {
        let network = LocalNetwork::new();
        let (_a, mut alice) = network.register(PeerId::new("alice"));
        let (_b, mut bob) = network.register(PeerId::new("bob"));
        let sink = DirectSink::new(Arc::new(network.sender(PeerId::new("coordinator"))));

        sink.dispatch(Dispatch::new(
            vec![ActorId::new("alice"), ActorId::new("bob")],
            SessionEvent::PlayerJoined {
                session: SessionId(7),
                player: ActorId::new("bob"),
                players: 2,
            },
        ))
        .await;

        let expected = Rpc::Callback(Callback::OnPlayerJoin {
            player: ActorId::new("bob"),
            players: 2,
        });
        assert_eq!(alice.recv().await.unwrap().rpc, expected);
        assert_eq!(bob.recv().await.unwrap().rpc, expected);
    }

    #[tokio::test]
    async fn test_direct_sink_survives_unreachable_recipient() {
        let network = LocalNetwork::new();
        let (_a, mut alice) = network.register(PeerId::new("alice"));
        let sink = DirectSink::new(Arc::new(network.sender(PeerId::new("coordinator"))));

        sink.dispatch(Dispatch::new(
            vec![ActorId::new("ghost"), ActorId::new("alice")],
            SessionEvent::GameStarted { session: SessionId(1) },
        ))
        .await;

        assert_eq!(alice.recv().await.unwrap().rpc, Rpc::Callback(Callback::OnGameStart));
    }

    #[tokio::test]
    async fn test_broadcast_sink_encodes_event() {
        let (channel, mut deliveries) = CausalChannel::new(PeerId::new("coordinator"));
        let sink = BroadcastSink::new(Arc::new(channel));
        let event = SessionEvent::GameStarted { session: SessionId(3) };

        sink.dispatch(Dispatch::new(vec![], event.clone())).await;

        let delivered = deliveries.recv().await.unwrap();
        assert_eq!(delivered.kind, crisscross_core::MessageKind::GameStart);
        let decoded: SessionEvent = serde_json::from_slice(&delivered.payload).unwrap();
        assert_eq!(decoded, event);
    }
}
