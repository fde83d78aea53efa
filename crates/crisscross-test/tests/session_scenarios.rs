//! Session scenarios against an in-memory coordinator

use std::sync::Arc;
use std::time::Duration;

use crisscross_core::{
    ActorId, CommandEnvelope, CommandResult, Lifecycle, Outcome, Reply, Scope, SessionEvent,
    SessionId,
};
use crisscross_session::{ParticipantStatus, SessionSettings, WordRepository};
use crisscross_test::Harness;

fn actor(name: &str) -> ActorId {
    ActorId::new(name)
}

fn budget(harness: &Harness, session: SessionId) -> u32 {
    harness.coordinator.guess_budget(session).unwrap()
}

#[tokio::test]
async fn test_end_to_end_session_seven() {
    let h = Harness::new();
    let c = &h.coordinator;

    let id = c
        .create_session_with_id(SessionId(7), actor("alice"), SessionSettings::new(2, 1, 1))
        .await
        .unwrap();
    assert_eq!(c.lifecycle(id), Ok(Lifecycle::Forming));

    c.join(id, actor("bob")).await.unwrap();
    assert_eq!(c.lifecycle(id), Ok(Lifecycle::Ready));

    c.start(id).await.unwrap();
    assert_eq!(c.lifecycle(id), Ok(Lifecycle::Running));
    assert_eq!(c.active_player(id), Ok(Some(actor("alice"))));

    let reply = c.submit_guess(&actor("alice"), id, "apple", 1).await;
    let Reply::Accepted(CommandResult::Guess(result)) = reply else {
        panic!("unexpected reply {:?}", reply);
    };
    assert!(result.solved);
    assert_eq!(result.outcome, Some(Outcome::Won));

    // Win reaches both players as onGameWin
    for player in ["alice", "bob"] {
        let events = h.sink.received_by(&actor(player));
        let last = events.last().unwrap();
        let callback = last.callback_for(&actor(player)).unwrap();
        assert_eq!(callback.name(), "onGameWin");
    }
    assert_eq!(h.scoreboard.calls(), vec![vec![actor("alice")]]);

    assert_eq!(c.session_count(), 0);
    assert!(c.lifecycle(id).is_err());
    assert_eq!(c.session_of(&actor("bob")), None);
}

#[tokio::test]
async fn test_duplicate_guess_leaves_state_unchanged() {
    let h = Harness::new();
    let c = &h.coordinator;
    let s = h
        .running_session(&["alice", "bob"], SessionSettings::new(2, 2, 1))
        .await
        .unwrap();

    assert!(c.submit_guess(&actor("alice"), s, "e", 5).await.is_accepted());
    let budget_after = budget(&h, s);
    let grid_after = c.snapshot(s).unwrap().grid;

    assert!(c.submit_guess(&actor("alice"), s, "e", 5).await.is_duplicate());
    assert_eq!(budget(&h, s), budget_after);
    assert_eq!(c.snapshot(s).unwrap().grid, grid_after);
    assert_eq!(c.current_sequence(&actor("alice"), Scope::Session(s)), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_retry_mutates_once() {
    let h = Harness::new();
    let s = h
        .running_session(&["alice", "bob"], SessionSettings::new(2, 2, 1))
        .await
        .unwrap();
    let before = budget(&h, s);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let c = Arc::clone(&h.coordinator);
            tokio::spawn(async move { c.submit_guess(&ActorId::new("alice"), s, "e", 1).await })
        })
        .collect();

    let mut accepted = 0;
    let mut duplicates = 0;
    for task in tasks {
        let reply = task.await.unwrap();
        if reply.is_accepted() {
            accepted += 1;
        } else if reply.is_duplicate() {
            duplicates += 1;
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(duplicates, 7);
    assert_eq!(budget(&h, s), before - 1);
    assert_eq!(h.coordinator.stats().guesses_applied, 1);
}

#[tokio::test]
async fn test_turn_rotation_under_departures() {
    let h = Harness::new();
    let c = &h.coordinator;
    let s = h
        .running_session(&["alice", "bob", "carol"], SessionSettings::new(3, 3, 1))
        .await
        .unwrap();

    assert!(c.submit_guess(&actor("alice"), s, "z", 1).await.is_accepted());
    assert_eq!(c.active_player(s), Ok(Some(actor("bob"))));

    c.quit(&actor("carol"), s).await.unwrap();
    assert_eq!(c.active_player(s), Ok(Some(actor("bob"))));

    assert!(c.submit_guess(&actor("bob"), s, "z", 1).await.is_accepted());
    assert_eq!(c.active_player(s), Ok(Some(actor("alice"))));

    // Alice holds the turn and goes silent
    let budget_before = budget(&h, s);
    h.step(Duration::from_millis(3500), s, &["bob"]).await;
    assert_eq!(c.active_player(s), Ok(Some(actor("bob"))));
    assert_eq!(budget(&h, s), budget_before);

    // Sole survivor keeps the turn
    assert!(c.submit_guess(&actor("bob"), s, "z", 2).await.is_accepted());
    assert_eq!(c.active_player(s), Ok(Some(actor("bob"))));
}

#[tokio::test]
async fn test_heartbeat_grading_notifies_once_per_edge() {
    let h = Harness::new();
    let c = &h.coordinator;
    let s = h
        .running_session(&["alice", "bob", "carol"], SessionSettings::new(3, 3, 1))
        .await
        .unwrap();
    h.sink.clear();
    let alive = ["alice", "bob"];

    assert_eq!(h.step(Duration::from_millis(500), s, &alive).await, 0);
    assert_eq!(h.step(Duration::from_millis(1000), s, &alive).await, 1);
    let carol = c.participants(s).unwrap()[2].clone();
    assert_eq!(carol.status, ParticipantStatus::Suspected);

    // Further scans while suspected stay quiet
    assert_eq!(h.step(Duration::from_millis(500), s, &alive).await, 0);
    assert_eq!(h.step(Duration::from_millis(1500), s, &alive).await, 1);
    assert_eq!(c.participants(s).unwrap().len(), 2);

    let timeouts: Vec<_> = h
        .sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::PlayerTimeout { .. }))
        .collect();
    assert_eq!(timeouts.len(), 2);
    assert!(matches!(timeouts[0], SessionEvent::PlayerTimeout { suspected: true, .. }));
    assert!(matches!(timeouts[1], SessionEvent::PlayerTimeout { failed: true, .. }));
}

#[tokio::test]
async fn test_heartbeat_after_suspicion_restores() {
    let h = Harness::new();
    let c = &h.coordinator;
    let s = h
        .running_session(&["alice", "bob"], SessionSettings::new(2, 2, 1))
        .await
        .unwrap();

    h.step(Duration::from_millis(1500), s, &["alice"]).await;
    h.step(Duration::ZERO, s, &["alice", "bob"]).await;
    h.sink.clear();

    assert_eq!(h.step(Duration::from_millis(900), s, &["alice", "bob"]).await, 0);
    assert!(c.participants(s).unwrap().iter().all(|p| p.is_active()));
    assert!(h.sink.events().is_empty());
    assert_eq!(c.stats().evictions, 0);
}

#[tokio::test]
async fn test_word_commands_share_global_counter() {
    let h = Harness::new();
    let c = &h.coordinator;
    let s = h
        .running_session(&["alice", "bob"], SessionSettings::new(2, 2, 1))
        .await
        .unwrap();

    // Session counter at 9 does not affect the global one
    assert!(c.submit_guess(&actor("alice"), s, "e", 9).await.is_accepted());

    let added = c
        .execute(CommandEnvelope::add_word(actor("alice"), 1, "Quince"))
        .await;
    assert_eq!(added, Reply::Accepted(CommandResult::WordEdit { changed: true }));
    assert!(h.words.check_word("quince"));
    assert!(c
        .execute(CommandEnvelope::remove_word(actor("alice"), 1, "quince"))
        .await
        .is_duplicate());
    assert!(c.check_word("QUINCE"));
}
