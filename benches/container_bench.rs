//! Benchmarks for the resolution core.

use corewire::{Container, ScopeKind};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;

#[allow(dead_code)]
#[derive(Clone)]
struct SmallService {
    value: i32,
}

#[allow(dead_code)]
#[derive(Clone)]
struct MediumService {
    name: String,
    values: Vec<i32>,
}

#[allow(dead_code)]
#[derive(Clone)]
struct LargeService {
    data: Vec<u8>,
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration");

    group.bench_function("singleton_small", |b| {
        b.iter(|| {
            let container = Container::new();
            container.singleton(|| SmallService { value: 42 });
            black_box(container)
        })
    });

    group.bench_function("lazy", |b| {
        b.iter(|| {
            let container = Container::new();
            container.lazy(|| SmallService { value: 42 });
            black_box(container)
        })
    });

    group.bench_function("transient", |b| {
        b.iter(|| {
            let container = Container::new();
            container.transient(|| SmallService { value: 42 });
            black_box(container)
        })
    });

    group.bench_function("batch_4", |b| {
        b.iter(|| {
            let container = Container::new();
            container.batch()
                .singleton(|| SmallService { value: 1 })
                .singleton(|| MediumService {
                    name: "test".into(),
                    values: vec![1, 2, 3],
                })
                .transient(|| LargeService { data: vec![0; 64] })
                .transient(|| SmallService { value: 2 })
                .commit();
            black_box(container)
        })
    });

    group.finish();
}

/// Compares resolution latency with the snapshot layer disabled (default)
/// against enabled, for the same registered singleton. The two code paths
/// must return observably identical values; criterion shows whether the
/// snapshot path is actually faster on the running hardware.
fn bench_resolution_optimization_parity(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution_optimization_parity");
    group.throughput(Throughput::Elements(1));

    let unoptimized = Container::new();
    unoptimized.singleton(|| SmallService { value: 42 });

    let optimized = Container::new();
    optimized.singleton(|| SmallService { value: 42 });
    optimized.enable_optimization();
    // Warm the snapshot's singleton hole before measuring.
    let _ = optimized.resolve::<SmallService>().unwrap();

    group.bench_function("unoptimized_resolve", |b| {
        b.iter(|| black_box(unoptimized.resolve::<SmallService>().unwrap()))
    });

    group.bench_function("optimized_resolve", |b| {
        b.iter(|| black_box(optimized.resolve::<SmallService>().unwrap()))
    });

    group.finish();
}

fn bench_transient_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("transient");
    group.throughput(Throughput::Elements(1));

    let container = Container::new();
    container.transient(|| SmallService { value: 42 });

    group.bench_function("resolve_transient", |b| {
        b.iter(|| black_box(container.resolve::<SmallService>().unwrap()))
    });

    group.finish();
}

fn bench_scoped(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoped");

    group.bench_function("enter_resolve_leave", |b| {
        let container = Container::new();
        container.register_scoped(ScopeKind::Request, || SmallService { value: 42 });

        b.iter(|| {
            container.enter_scope(ScopeKind::Request, "bench");
            let service = container.resolve::<SmallService>().unwrap();
            container.leave_scope(ScopeKind::Request, "bench");
            black_box(service)
        })
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");

    group.bench_function("concurrent_reads_4", |b| {
        let container = Arc::new(Container::new());
        container.singleton(|| SmallService { value: 42 });

        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let c = Arc::clone(&container);
                    thread::spawn(move || {
                        for _ in 0..100 {
                            let _ = c.resolve::<SmallService>().unwrap();
                        }
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_registration,
    bench_resolution_optimization_parity,
    bench_transient_resolution,
    bench_scoped,
    bench_concurrent,
);

criterion_main!(benches);
