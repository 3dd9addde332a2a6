//! Codec benchmarks for chatter-protocol.

use chatter_protocol::{codec, ChatMessage, OutboundEvent, Sender};
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn new_message(content_len: usize) -> OutboundEvent {
    OutboundEvent::NewMessage(ChatMessage {
        content: "x".repeat(content_len),
        sender: Sender {
            name: "Alice".into(),
            avatar: Some("alice.png".into()),
        },
        created_at: Utc::now(),
    })
}

fn bench_encode_json(c: &mut Criterion) {
    let event = new_message(64);

    let mut group = c.benchmark_group("encode_json");
    group.throughput(Throughput::Elements(1));
    group.bench_function("new_message_64B", |b| {
        b.iter(|| codec::encode_json(black_box(&event)))
    });
    group.finish();
}

fn bench_encode_msgpack(c: &mut Criterion) {
    let event = new_message(64);

    let mut group = c.benchmark_group("encode_msgpack");
    group.throughput(Throughput::Elements(1));
    group.bench_function("new_message_64B", |b| {
        b.iter(|| codec::encode(black_box(&event)))
    });
    group.finish();
}

fn bench_roster(c: &mut Criterion) {
    let roster = OutboundEvent::UpdateUsers((0..256).map(|i| format!("user-{i}")).collect());

    c.bench_function("encode_json_roster_256", |b| {
        b.iter(|| codec::encode_json(black_box(&roster)).unwrap())
    });
}

criterion_group!(benches, bench_encode_json, bench_encode_msgpack, bench_roster);
criterion_main!(benches);
