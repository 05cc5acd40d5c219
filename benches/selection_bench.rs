use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use storehub::config::{EndpointOptions, StoreConfiguration};
use storehub::services::{
    ConnectionPool, LoadBalanceStrategy, MemoryConnector, PoolManager, RandomSelection, RoundRobin,
    SelectionStrategy,
};
use tokio::runtime::Runtime;

fn build_manager(rt: &Runtime, pool_size: usize, strategy: LoadBalanceStrategy) -> PoolManager {
    rt.block_on(async {
        let connector = MemoryConnector::new();
        let config = StoreConfiguration::new("bench", EndpointOptions::default())
            .as_default()
            .with_pool_size(pool_size)
            .with_load_balance(strategy);
        let pool = ConnectionPool::connect(config, &connector)
            .await
            .expect("memory pool connects");
        PoolManager::new(pool, None)
    })
}

/// Raw index computation of each strategy
fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategy_next_index");
    group.throughput(Throughput::Elements(1));

    let round_robin = RoundRobin::new();
    group.bench_function("round_robin", |b| {
        b.iter(|| black_box(round_robin.next_index(black_box(8))))
    });

    let random = RandomSelection;
    group.bench_function("random", |b| {
        b.iter(|| black_box(random.next_index(black_box(8))))
    });

    group.finish();
}

/// Full selection path: index, health read, handle clone
fn bench_get_connection(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("get_connection");
    group.throughput(Throughput::Elements(1));

    for pool_size in [1usize, 5, 32] {
        let manager = build_manager(&rt, pool_size, LoadBalanceStrategy::RoundRobin);
        group.bench_with_input(
            BenchmarkId::new("round_robin", pool_size),
            &manager,
            |b, manager| b.iter(|| black_box(manager.get_connection().map(|c| c.index()))),
        );
    }

    let manager = build_manager(&rt, 5, LoadBalanceStrategy::Random);
    group.bench_function("random/5", |b| {
        b.iter(|| black_box(manager.get_connection().map(|c| c.index())))
    });

    group.finish();
}

/// Selection under contention from several threads
fn bench_contended_selection(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let manager = Arc::new(build_manager(&rt, 5, LoadBalanceStrategy::RoundRobin));

    c.bench_function("get_connection_4_threads", |b| {
        b.iter(|| {
            let threads: Vec<_> = (0..4)
                .map(|_| {
                    let manager = manager.clone();
                    std::thread::spawn(move || {
                        for _ in 0..256 {
                            black_box(manager.get_connection().ok());
                        }
                    })
                })
                .collect();
            for thread in threads {
                thread.join().unwrap();
            }
        })
    });
}

criterion_group!(
    benches,
    bench_strategies,
    bench_get_connection,
    bench_contended_selection
);
criterion_main!(benches);
