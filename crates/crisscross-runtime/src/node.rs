//! Coordinator node
//!
//! Two loops drive a [`SessionCoordinator`]:
//! 1. Serve: take inbound calls, record heartbeats, execute commands,
//!    answer sequence queries and send each answer back to the calling peer
//! 2. Scan: on every interval tick, grade heartbeats and apply the
//!    resulting transitions
//!
//! Both loops only hold coordinator locks inside coordinator calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crisscross_clock::TimeSource;
use crisscross_core::{Rpc, SequenceStatus};
use crisscross_session::SessionCoordinator;
use crisscross_transport::{Inbound, InboundSource, Transport};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub heartbeats: u64,
    pub commands: u64,
    pub queries: u64,
    pub replies_failed: u64,
    pub scans: u64,
    pub transitions: u64,
    pub dropped: u64,
}

/// Serves one coordinator over one transport
pub struct CoordinatorNode {
    coordinator: Arc<SessionCoordinator>,
    transport: Arc<dyn Transport>,
    stats: Mutex<NodeStats>,
}

impl CoordinatorNode {
    pub fn new(coordinator: Arc<SessionCoordinator>, transport: Arc<dyn Transport>) -> Self {
        CoordinatorNode {
            coordinator,
            transport,
            stats: Mutex::new(NodeStats::default()),
        }
    }

    pub fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }

    pub fn stats(&self) -> NodeStats {
        self.stats.lock().clone()
    }

    /// Handle one inbound call
    pub async fn handle(&self, inbound: Inbound) {
        let Inbound { from, rpc } = inbound;
        match rpc {
            Rpc::Heartbeat { session, actor } => {
                self.stats.lock().heartbeats += 1;
                if let Err(e) = self.coordinator.heartbeat(session, &actor) {
                    debug!(%session, %actor, "Heartbeat ignored: {}", e);
                }
            }
            Rpc::Command(envelope) => {
                self.stats.lock().commands += 1;
                let scope = envelope.scope;
                let sequence = envelope.sequence;
                let reply = self.coordinator.execute(envelope).await;
                let answer = Rpc::Reply {
                    scope,
                    sequence,
                    reply,
                };
                if let Err(e) = self.transport.call(&from, answer).await {
                    self.stats.lock().replies_failed += 1;
                    warn!(%from, sequence, "Reply failed: {}", e);
                }
            }
            Rpc::SequenceQuery {
                actor,
                scope,
                advance_to,
            } => {
                self.stats.lock().queries += 1;
                let sequence = match advance_to {
                    Some(to) => self.coordinator.advance_to(&actor, scope, to),
                    None => self.coordinator.current_sequence(&actor, scope),
                };
                let report = Rpc::SequenceReport {
                    scope,
                    status: SequenceStatus {
                        sequence,
                        session: self.coordinator.session_of(&actor),
                    },
                };
                if let Err(e) = self.transport.call(&from, report).await {
                    self.stats.lock().replies_failed += 1;
                    warn!(%from, %actor, "Sequence report failed: {}", e);
                }
            }
            other => {
                self.stats.lock().dropped += 1;
                debug!(%from, method = other.method(), "Unexpected call dropped");
            }
        }
    }

    /// Grade heartbeats once and apply every transition
    ///
    /// Returns the number of transitions applied.
    pub async fn scan_once(&self, now: Instant) -> usize {
        let transitions = self.coordinator.monitor().scan(now);
        let count = transitions.len();
        for transition in transitions {
            self.coordinator.apply_liveness(transition).await;
        }

        let mut stats = self.stats.lock();
        stats.scans += 1;
        stats.transitions += count as u64;
        count
    }

    /// Serve inbound calls until the source closes
    pub fn spawn_serve(self: &Arc<Self>, mut source: impl InboundSource + 'static) -> JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(inbound) = source.next_inbound().await {
                node.handle(inbound).await;
            }
            info!("Inbound source closed, coordinator node stopping");
        })
    }

    /// Run the liveness scan every `interval`
    pub fn spawn_scanner(
        self: &Arc<Self>,
        interval: Duration,
        time: Arc<dyn TimeSource>,
    ) -> JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                node.scan_once(time.now()).await;
            }
        })
    }
}
