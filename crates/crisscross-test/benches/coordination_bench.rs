//! Benchmarks for the coordination hot paths

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use crisscross_broadcast::CausalChannel;
use crisscross_core::{ActorId, ClockedMessage, LogicalTime, MessageKind, PeerId, Scope, SessionId};
use crisscross_guard::SequenceGuard;
use crisscross_session::SessionSettings;
use crisscross_test::Harness;
use crisscross_wire::{decode_message, encode_message};

fn sample_message() -> ClockedMessage {
    ClockedMessage::new(
        LogicalTime(4242),
        PeerId::new("coordinator"),
        17,
        MessageKind::StateUpdate,
        vec![0x5A; 64],
    )
}

fn bench_message_encode(c: &mut Criterion) {
    let msg = sample_message();

    c.bench_function("message_encode", |b| {
        let mut buf = BytesMut::with_capacity(256);
        b.iter(|| {
            buf.clear();
            encode_message(black_box(&msg), &mut buf).unwrap();
        })
    });
}

fn bench_message_decode(c: &mut Criterion) {
    let mut buf = BytesMut::new();
    encode_message(&sample_message(), &mut buf).unwrap();
    let frame = buf.freeze();

    c.bench_function("message_decode", |b| {
        b.iter(|| {
            let mut bytes = black_box(frame.clone());
            black_box(decode_message(&mut bytes).unwrap())
        })
    });
}

fn bench_guard_admit(c: &mut Criterion) {
    let guard = SequenceGuard::new();
    let actor = ActorId::new("alice");
    let scope = Scope::Session(SessionId(1));
    let mut sequence = 0u64;

    c.bench_function("guard_admit", |b| {
        b.iter(|| {
            sequence += 1;
            black_box(guard.admit(&actor, scope, sequence))
        })
    });
}

fn bench_reversed_batch(c: &mut Criterion) {
    let batch: Vec<ClockedMessage> = (1..=64u64)
        .rev()
        .map(|seq| {
            ClockedMessage::new(
                LogicalTime(seq),
                PeerId::new("p1"),
                seq,
                MessageKind::Guess,
                Bytes::new(),
            )
        })
        .collect();

    c.bench_function("receive_batch_reversed_64", |b| {
        b.iter(|| {
            let (channel, _deliveries) = CausalChannel::new(PeerId::new("p0"));
            black_box(channel.receive_batch(batch.clone()).len())
        })
    });
}

fn bench_duplicate_guess(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let harness = Harness::new();
    let alice = ActorId::new("alice");
    let session = runtime
        .block_on(harness.running_session(&["alice", "bob"], SessionSettings::new(2, 2, 1)))
        .unwrap();
    runtime.block_on(harness.coordinator.submit_guess(&alice, session, "z", 1));

    c.bench_function("submit_guess_duplicate", |b| {
        b.iter(|| {
            runtime.block_on(harness.coordinator.submit_guess(
                black_box(&alice),
                session,
                "z",
                1,
            ))
        })
    });
}

criterion_group!(
    benches,
    bench_message_encode,
    bench_message_decode,
    bench_guard_admit,
    bench_reversed_batch,
    bench_duplicate_guess
);
criterion_main!(benches);
