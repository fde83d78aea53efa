//! Player-side helpers
//!
//! [`HeartbeatPump`] keeps a player alive in its session. [`PlayerClient`]
//! numbers commands, matches replies to them and turns callbacks into an
//! awaitable stream, so a player loop can simply wait for its next turn.
//! Every session operation, from creation to quitting, goes over the
//! transport as a command.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crisscross_core::{
    ActorId, BoardView, Callback, Command, CommandEnvelope, CoordError, CoordResult, PeerId, Reply,
    Rpc, Scope, SequenceStatus, SessionId, SessionSettings,
};
use crisscross_transport::{InboundSource, Transport};

/// Periodic heartbeat sender for one player
pub struct HeartbeatPump {
    session: SessionId,
    actor: ActorId,
    coordinator: PeerId,
    transport: Arc<dyn Transport>,
    interval: Duration,
}

impl HeartbeatPump {
    pub fn new(
        session: SessionId,
        actor: ActorId,
        coordinator: PeerId,
        transport: Arc<dyn Transport>,
        interval: Duration,
    ) -> Self {
        HeartbeatPump {
            session,
            actor,
            coordinator,
            transport,
            interval,
        }
    }

    /// Send one heartbeat now
    pub async fn beat(&self) -> CoordResult<()> {
        self.transport
            .call(
                &self.coordinator,
                Rpc::Heartbeat {
                    session: self.session,
                    actor: self.actor.clone(),
                },
            )
            .await
    }

    /// Start sending on every interval tick
    pub fn spawn(self) -> PumpHandle {
        let suppressed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&suppressed);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if flag.load(Ordering::Relaxed) {
                    continue;
                }
                if let Err(e) = self.beat().await {
                    warn!(session = %self.session, actor = %self.actor, "Heartbeat failed: {}", e);
                }
            }
        });
        PumpHandle { suppressed, task }
    }
}

/// Control over a running pump
pub struct PumpHandle {
    suppressed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl PumpHandle {
    /// Stop or resume sending without stopping the task; used to simulate
    /// a silent player
    pub fn suppress(&self, on: bool) {
        self.suppressed.store(on, Ordering::Relaxed);
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::Relaxed)
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for PumpHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// What a player waiting for its turn wakes up to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnWait {
    /// Our turn, with the current board
    YourTurn(BoardView),
    /// The game ended; carries `OnGameWin` or `OnGameLoss`
    Finished(Callback),
}

type PendingReplies = Arc<Mutex<HashMap<(Scope, u64), oneshot::Sender<Reply>>>>;
type PendingReports = Arc<Mutex<HashMap<Scope, Vec<oneshot::Sender<SequenceStatus>>>>>;

/// Command and callback endpoint of one player
pub struct PlayerClient {
    actor: ActorId,
    coordinator: PeerId,
    transport: Arc<dyn Transport>,
    sequences: Mutex<HashMap<Scope, u64>>,
    pending: PendingReplies,
    reports: PendingReports,
    callbacks: tokio::sync::Mutex<mpsc::UnboundedReceiver<Callback>>,
    router: JoinHandle<()>,
}

impl PlayerClient {
    /// Start routing `inbound`: replies complete pending commands, callbacks
    /// queue up for [`PlayerClient::next_callback`]
    pub fn new(
        actor: ActorId,
        coordinator: PeerId,
        transport: Arc<dyn Transport>,
        mut inbound: impl InboundSource + 'static,
    ) -> Self {
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let reports: PendingReports = Arc::new(Mutex::new(HashMap::new()));
        let (callback_tx, callback_rx) = mpsc::unbounded_channel();

        let routes = Arc::clone(&pending);
        let report_routes = Arc::clone(&reports);
        let name = actor.clone();
        let router = tokio::spawn(async move {
            while let Some(call) = inbound.next_inbound().await {
                match call.rpc {
                    Rpc::Reply {
                        scope,
                        sequence,
                        reply,
                    } => match routes.lock().remove(&(scope, sequence)) {
                        Some(waiter) => {
                            let _ = waiter.send(reply);
                        }
                        None => debug!(actor = %name, sequence, "Unmatched reply dropped"),
                    },
                    Rpc::SequenceReport { scope, status } => {
                        let waiters = report_routes.lock().remove(&scope).unwrap_or_default();
                        for waiter in waiters {
                            let _ = waiter.send(status);
                        }
                    }
                    Rpc::Callback(callback) => {
                        debug!(actor = %name, callback = callback.name(), "Callback");
                        if callback_tx.send(callback).is_err() {
                            break;
                        }
                    }
                    other => debug!(actor = %name, method = other.method(), "Unexpected call dropped"),
                }
            }
        });

        PlayerClient {
            actor,
            coordinator,
            transport,
            sequences: Mutex::new(HashMap::new()),
            pending,
            reports,
            callbacks: tokio::sync::Mutex::new(callback_rx),
            router,
        }
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    /// Last sequence issued in `scope`
    pub fn last_sequence(&self, scope: Scope) -> u64 {
        self.sequences.lock().get(&scope).copied().unwrap_or(0)
    }

    /// Continue numbering after `sequence`, e.g. after a restart; never
    /// moves backwards
    pub fn resume_from(&self, scope: Scope, sequence: u64) {
        let mut sequences = self.sequences.lock();
        let entry = sequences.entry(scope).or_insert(0);
        *entry = (*entry).max(sequence);
    }

    /// Fetch the coordinator's last accepted sequence in `scope`, after
    /// moving it to at least `advance_to`; local numbering resumes after it
    pub async fn sync_sequence(
        &self,
        scope: Scope,
        advance_to: Option<u64>,
    ) -> CoordResult<SequenceStatus> {
        let (tx, rx) = oneshot::channel();
        self.reports.lock().entry(scope).or_default().push(tx);
        self.transport
            .call(
                &self.coordinator,
                Rpc::SequenceQuery {
                    actor: self.actor.clone(),
                    scope,
                    advance_to,
                },
            )
            .await?;
        let status = rx
            .await
            .map_err(|_| CoordError::Transport("report channel closed".into()))?;
        self.resume_from(scope, status.sequence);
        Ok(status)
    }

    fn next_envelope(&self, scope: Scope, command: Command) -> CommandEnvelope {
        let mut sequences = self.sequences.lock();
        let entry = sequences.entry(scope).or_insert(0);
        *entry += 1;
        CommandEnvelope {
            actor: self.actor.clone(),
            scope,
            sequence: *entry,
            command,
        }
    }

    /// Send a command and wait for its reply
    pub async fn send(&self, scope: Scope, command: Command) -> CoordResult<Reply> {
        let envelope = self.next_envelope(scope, command);
        let rx = self.register(&envelope);
        self.transmit(&envelope).await?;
        rx.await
            .map_err(|_| CoordError::Transport("reply channel closed".into()))
    }

    /// Send a command, resending the same envelope until a reply arrives
    ///
    /// The coordinator applies the command at most once; later copies are
    /// answered with `Rejected(Duplicate)` if the first reply was lost.
    pub async fn send_with_retry(
        &self,
        scope: Scope,
        command: Command,
        attempts: u32,
        wait: Duration,
    ) -> CoordResult<Reply> {
        let envelope = self.next_envelope(scope, command);
        let key = (envelope.scope, envelope.sequence);
        let mut rx = self.register(&envelope);

        for attempt in 1..=attempts.max(1) {
            if let Err(e) = self.transmit(&envelope).await {
                debug!(actor = %self.actor, attempt, "Send failed: {}", e);
            }
            match tokio::time::timeout(wait, &mut rx).await {
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(_)) => break,
                Err(_) => debug!(actor = %self.actor, sequence = key.1, attempt, "No reply yet"),
            }
        }

        self.pending.lock().remove(&key);
        Err(CoordError::Transport(format!(
            "no reply to sequence {} after {} attempts",
            key.1, attempts
        )))
    }

    fn register(&self, envelope: &CommandEnvelope) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .insert((envelope.scope, envelope.sequence), tx);
        rx
    }

    async fn transmit(&self, envelope: &CommandEnvelope) -> CoordResult<()> {
        self.transport
            .call(&self.coordinator, Rpc::Command(envelope.clone()))
            .await
    }

    /// Open a session; an accepted reply carries its id
    pub async fn create_session(&self, settings: SessionSettings) -> CoordResult<Reply> {
        self.send(Scope::Global, Command::CreateSession { settings })
            .await
    }

    pub async fn join(&self, session: SessionId) -> CoordResult<Reply> {
        self.send(Scope::Session(session), Command::Join).await
    }

    pub async fn start(&self, session: SessionId) -> CoordResult<Reply> {
        self.send(Scope::Session(session), Command::Start).await
    }

    pub async fn quit(&self, session: SessionId) -> CoordResult<Reply> {
        self.send(Scope::Session(session), Command::Quit).await
    }

    pub async fn guess(&self, session: SessionId, guess: &str) -> CoordResult<Reply> {
        self.send(
            Scope::Session(session),
            Command::Guess {
                guess: guess.to_owned(),
            },
        )
        .await
    }

    pub async fn add_word(&self, word: &str) -> CoordResult<Reply> {
        self.send(Scope::Global, Command::AddWord { word: word.to_owned() })
            .await
    }

    pub async fn remove_word(&self, word: &str) -> CoordResult<Reply> {
        self.send(Scope::Global, Command::RemoveWord { word: word.to_owned() })
            .await
    }

    /// Next callback; `None` once the inbound stream has closed
    pub async fn next_callback(&self) -> Option<Callback> {
        self.callbacks.lock().await.recv().await
    }

    /// Wait until it is our turn or the game ends
    ///
    /// Other callbacks are consumed along the way.
    pub async fn wait_for_turn(&self) -> Option<TurnWait> {
        let mut callbacks = self.callbacks.lock().await;
        while let Some(callback) = callbacks.recv().await {
            match callback {
                Callback::OnYourTurn(board) => return Some(TurnWait::YourTurn(board)),
                terminal @ (Callback::OnGameWin { .. } | Callback::OnGameLoss { .. }) => {
                    return Some(TurnWait::Finished(terminal));
                }
                _ => {}
            }
        }
        None
    }
}

impl Drop for PlayerClient {
    fn drop(&mut self) {
        self.router.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crisscross_core::{CommandResult, Grid, Rejection};
    use crisscross_transport::{Inbound, InboundReceiver, LocalNetwork};

    fn board(remaining: u32) -> BoardView {
        BoardView {
            grid: Grid::from_lines(["-"]),
            guesses_remaining: remaining,
            words_solved: 0,
        }
    }

    fn client(network: &LocalNetwork) -> (PlayerClient, InboundReceiver) {
        let (transport, inbound) = network.register(PeerId::new("alice"));
        let (_server, server_inbound) = network.register(PeerId::new("server"));
        let client = PlayerClient::new(
            ActorId::new("alice"),
            PeerId::new("server"),
            Arc::new(transport),
            inbound,
        );
        (client, server_inbound)
    }

    /// Answer every command with `reply`, `drop_first` requests unanswered
    fn answer(
        network: &LocalNetwork,
        mut server_inbound: InboundReceiver,
        reply: Reply,
        drop_first: usize,
    ) -> JoinHandle<Vec<CommandEnvelope>> {
        let server = network.sender(PeerId::new("server"));
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(Inbound { from, rpc }) = server_inbound.recv().await {
                let Rpc::Command(envelope) = rpc else { continue };
                seen.push(envelope.clone());
                if seen.len() <= drop_first {
                    continue;
                }
                let answer = Rpc::Reply {
                    scope: envelope.scope,
                    sequence: envelope.sequence,
                    reply: reply.clone(),
                };
                let _ = server.call(&from, answer).await;
                return seen;
            }
            seen
        })
    }

    #[tokio::test]
    async fn test_sequences_per_scope() {
        let network = LocalNetwork::new();
        let (client, server_inbound) = client(&network);
        let accepted = Reply::Accepted(CommandResult::WordEdit { changed: true });
        let server = answer(&network, server_inbound, accepted.clone(), 0);

        assert_eq!(client.add_word("grid").await.unwrap(), accepted);
        let seen = server.await.unwrap();
        assert_eq!(seen[0].sequence, 1);
        assert_eq!(client.last_sequence(Scope::Global), 1);
        assert_eq!(client.last_sequence(Scope::Session(SessionId(7))), 0);

        client.resume_from(Scope::Session(SessionId(7)), 41);
        client.resume_from(Scope::Session(SessionId(7)), 3);
        let envelope = client.next_envelope(Scope::Session(SessionId(7)), Command::Guess { guess: "e".into() });
        assert_eq!(envelope.sequence, 42);
    }

    #[tokio::test]
    async fn test_retry_resends_same_sequence() {
        let network = LocalNetwork::new();
        let (client, server_inbound) = client(&network);
        let duplicate = Reply::Rejected(Rejection::Duplicate);
        let server = answer(&network, server_inbound, duplicate.clone(), 1);

        let reply = client
            .send_with_retry(
                Scope::Global,
                Command::AddWord { word: "grid".into() },
                3,
                Duration::from_millis(50),
            )
            .await
            .unwrap();

        assert_eq!(reply, duplicate);
        let seen = server.await.unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
    }

    #[tokio::test]
    async fn test_sync_sequence_resumes_numbering() {
        let network = LocalNetwork::new();
        let (client, mut server_inbound) = client(&network);
        let server = network.sender(PeerId::new("server"));
        let scope = Scope::Session(SessionId(3));

        let answering = tokio::spawn(async move {
            let Some(Inbound { from, rpc }) = server_inbound.recv().await else {
                return None;
            };
            let Rpc::SequenceQuery {
                scope, advance_to, ..
            } = rpc
            else {
                return None;
            };
            let status = SequenceStatus {
                sequence: advance_to.unwrap_or(0).max(17),
                session: Some(SessionId(3)),
            };
            server
                .call(&from, Rpc::SequenceReport { scope, status })
                .await
                .ok()?;
            Some(advance_to)
        });

        let status = client.sync_sequence(scope, None).await.unwrap();
        assert_eq!(status.sequence, 17);
        assert_eq!(status.session, Some(SessionId(3)));
        assert_eq!(answering.await.unwrap(), Some(None));

        assert_eq!(client.last_sequence(scope), 17);
        let envelope = client.next_envelope(scope, Command::Quit);
        assert_eq!(envelope.sequence, 18);
    }

    #[tokio::test]
    async fn test_lifecycle_commands_scoped_to_session() {
        let network = LocalNetwork::new();
        let (client, server_inbound) = client(&network);
        let server = answer(&network, server_inbound, Reply::Accepted(CommandResult::Started), 0);

        assert!(client.start(SessionId(4)).await.unwrap().is_accepted());
        let seen = server.await.unwrap();
        assert_eq!(
            seen[0],
            CommandEnvelope::in_session(ActorId::new("alice"), SessionId(4), 1, Command::Start)
        );
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let network = LocalNetwork::new();
        let (client, _server_inbound) = client(&network);

        let result = client
            .send_with_retry(
                Scope::Global,
                Command::RemoveWord { word: "grid".into() },
                2,
                Duration::from_millis(10),
            )
            .await;
        assert!(matches!(result, Err(CoordError::Transport(_))));
    }

    #[tokio::test]
    async fn test_wait_for_turn_skips_other_callbacks() {
        let network = LocalNetwork::new();
        let (client, _server_inbound) = client(&network);
        let server = network.sender(PeerId::new("server"));
        let alice = PeerId::new("alice");

        for callback in [
            Callback::OnGameStart,
            Callback::OnOpponentTurn(board(5)),
            Callback::OnYourTurn(board(4)),
            Callback::OnGameLoss {
                board: board(0),
                scores: Default::default(),
            },
        ] {
            server.call(&alice, Rpc::Callback(callback)).await.unwrap();
        }

        assert_eq!(client.wait_for_turn().await, Some(TurnWait::YourTurn(board(4))));
        assert!(matches!(
            client.wait_for_turn().await,
            Some(TurnWait::Finished(Callback::OnGameLoss { .. }))
        ));
    }

    #[tokio::test]
    async fn test_pump_sends_until_suppressed() {
        let network = LocalNetwork::new();
        let (transport, _inbound) = network.register(PeerId::new("alice"));
        let (_server, mut server_inbound) = network.register(PeerId::new("server"));

        let pump = HeartbeatPump::new(
            SessionId(7),
            ActorId::new("alice"),
            PeerId::new("server"),
            Arc::new(transport),
            Duration::from_millis(10),
        )
        .spawn();

        let first = server_inbound.recv().await.unwrap();
        assert_eq!(
            first.rpc,
            Rpc::Heartbeat {
                session: SessionId(7),
                actor: ActorId::new("alice"),
            }
        );

        pump.suppress(true);
        assert!(pump.is_suppressed());
        // Drain anything sent before the flag took effect
        tokio::time::sleep(Duration::from_millis(30)).await;
        while server_inbound.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(server_inbound.try_recv().is_err());

        pump.suppress(false);
        assert!(server_inbound.recv().await.is_some());
        pump.stop();
    }
}
