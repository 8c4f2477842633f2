use criterion::{criterion_group, criterion_main, Criterion};
use nirn_proxy::limiters::GlobalRateLimiter;
use std::hint::black_box;

fn benchmark_get_or_create_existing(c: &mut Criterion) {
    let gate = GlobalRateLimiter::new();
    for bot_hash in 0..1000 {
        gate.get_or_create(bot_hash, 50).unwrap();
    }

    c.bench_function("gate_get_or_create_existing", |b| {
        let mut counter = 0u64;
        b.iter(|| {
            counter += 1;
            black_box(gate.get_or_create(counter % 1000, 50).unwrap())
        })
    });
}

fn benchmark_get_or_create_new(c: &mut Criterion) {
    c.bench_function("gate_get_or_create_new", |b| {
        let gate = GlobalRateLimiter::new();
        let mut counter = 0u64;
        b.iter(|| {
            counter += 1;
            black_box(gate.get_or_create(counter, 50).unwrap())
        })
    });
}

fn benchmark_take_under_limit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    // High limit to avoid sleeping
    let gate = GlobalRateLimiter::new();

    c.bench_function("gate_take_under_limit", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(gate.take(1, u32::MAX).await.unwrap()) })
    });
}

criterion_group!(
    benches,
    benchmark_get_or_create_existing,
    benchmark_get_or_create_new,
    benchmark_take_under_limit
);
criterion_main!(benches);
