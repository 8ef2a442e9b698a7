//! Codec benchmarks for parley-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parley_protocol::{codec, ChatPayload, ClientEvent};

fn bench_codec(c: &mut Criterion) {
    let event = ClientEvent::ChatMessage(ChatPayload::text("x".repeat(256)).to_room("lobby"));
    let text = codec::encode_text(&event).unwrap();
    let binary = codec::encode(&event).unwrap();

    c.bench_function("encode_text_256B", |b| {
        b.iter(|| codec::encode_text(black_box(&event)).unwrap())
    });

    c.bench_function("decode_text_256B", |b| {
        b.iter(|| codec::decode_text::<ClientEvent>(black_box(&text)).unwrap())
    });

    c.bench_function("encode_binary_256B", |b| {
        b.iter(|| codec::encode(black_box(&event)).unwrap())
    });

    c.bench_function("decode_binary_256B", |b| {
        b.iter(|| codec::decode::<ClientEvent>(black_box(&binary)).unwrap())
    });
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
