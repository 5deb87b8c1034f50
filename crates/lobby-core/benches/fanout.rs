//! Hub fan-out benchmarks.
//!
//! Measures a broadcast round trip through the hub loop with N members whose
//! buffers are drained by background tasks.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lobby_core::{Hub, HubConfig, LobbyRegistry};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

/// Spawn a hub with `size` members that discard everything they receive.
async fn populated_hub(size: usize) -> Hub {
    let hub = Hub::spawn(
        "bench",
        HubConfig {
            command_queue: 4096,
            client_buffer: 4096,
        },
    );
    for _ in 0..size {
        let (client, mut rx) = hub.new_client();
        hub.register(client).await.expect("register");
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
    }
    hub
}

fn bench_fanout(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("fanout");
    let payload = Bytes::from(vec![0u8; 64]);

    for size in [10usize, 100, 1000].iter() {
        let hub = rt.block_on(populated_hub(*size));
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.to_async(&rt).iter(|| async {
                hub.broadcast(None, black_box(payload.clone()))
                    .await
                    .expect("broadcast");
                // Round trip through the loop so the broadcast has completed
                hub.members().await.expect("members");
            });
        });
        hub.close();
    }

    group.finish();
}

fn bench_registry(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("registry");

    group.bench_function("create_or_get_existing", |b| {
        let _guard = rt.enter();
        let registry = LobbyRegistry::new();
        registry.create_or_get("bench").expect("create");
        b.iter(|| registry.create_or_get(black_box("bench")));
    });

    group.bench_function("list_100", |b| {
        let _guard = rt.enter();
        let registry = LobbyRegistry::new();
        for i in 0..100 {
            registry.create_or_get(&format!("lobby-{}", i)).expect("create");
        }
        b.iter(|| registry.list());
    });

    group.finish();
}

criterion_group!(benches, bench_fanout, bench_registry);
criterion_main!(benches);
