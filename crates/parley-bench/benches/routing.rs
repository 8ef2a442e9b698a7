//! Routing benchmarks for Parley.
//!
//! These measure the registry's fan-out paths through the in-process hub.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parley_bench::Fixture;
use parley_core::{ChannelLayer, ConnectionId};
use parley_protocol::ChatPayload;

/// Benchmark broadcast routing to every connected client.
fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_broadcast");

    for users in [10, 100, 1000] {
        group.throughput(Throughput::Elements(users as u64));
        group.bench_with_input(BenchmarkId::from_parameter(users), &users, |b, &users| {
            let mut fixture = Fixture::populated(users);
            let sender = fixture.connections[0].clone();

            b.iter(|| {
                fixture
                    .registry
                    .route_message(black_box(&sender), ChatPayload::text("hello"));
                fixture.drain()
            });
        });
    }

    group.finish();
}

/// Benchmark direct messages addressed by connection ID.
fn bench_direct(c: &mut Criterion) {
    let mut fixture = Fixture::populated(1000);
    let sender = fixture.connections[0].clone();
    let target = fixture.connections[999].to_string();

    c.bench_function("route_direct_1000_users", |b| {
        b.iter(|| {
            fixture
                .registry
                .route_message(black_box(&sender), ChatPayload::text("hi").to_room(&target));
            fixture.drain()
        });
    });
}

/// Benchmark a register/deregister cycle against a populated registry.
fn bench_register_cycle(c: &mut Criterion) {
    let mut fixture = Fixture::populated(100);
    let id = ConnectionId::new("conn-bench");
    let inbox = fixture.hub.connect(id.clone());
    fixture.inboxes.push(inbox);

    c.bench_function("register_deregister_100_users", |b| {
        b.iter(|| {
            let _ = fixture.registry.register(black_box(&id), "newcomer");
            fixture.registry.deregister(black_box(&id));
            fixture.drain()
        });
    });
}

/// Benchmark joining many rooms from one connection.
fn bench_join(c: &mut Criterion) {
    let fixture = Fixture::populated(1);
    let id = fixture.connections[0].clone();

    c.bench_function("hub_join", |b| {
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            fixture.hub.join(black_box(&id), &format!("room-{}", n % 64));
        });
    });
}

criterion_group!(
    benches,
    bench_broadcast,
    bench_direct,
    bench_register_cycle,
    bench_join
);
criterion_main!(benches);
