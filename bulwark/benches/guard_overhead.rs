use bulwark::{ConcurrencyThrottle, FnResolver, GuardChain, GuardExt, RateLimitingThrottle};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::convert::Infallible;
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

fn benchmark_single_guard(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("single_guard");
    group.throughput(Throughput::Elements(1));
    group.measurement_time(Duration::from_secs(10));

    // Baseline: the chain machinery with nothing to consult
    group.bench_function("empty_chain", |b| {
        let chain = GuardChain::empty();
        b.to_async(&rt).iter(|| async {
            let value = chain
                .execute(|| async { Ok::<_, Infallible>(black_box(1u64)) })
                .await
                .unwrap();
            black_box(value)
        });
    });

    group.bench_function("concurrency_admitted", |b| {
        let throttle = ConcurrencyThrottle::new("db", 1024).unwrap();
        b.to_async(&rt).iter(|| async {
            let value = throttle
                .call(|| async { Ok::<_, Infallible>(black_box(1u64)) })
                .await
                .unwrap();
            black_box(value)
        });
    });

    // Worst case for the rate limiter: every call is over the limit
    group.bench_function("rate_limit_denied", |b| {
        let limiter = RateLimitingThrottle::new("api", 1, FnResolver::new(|| Some(7u64))).unwrap();
        let _ = rt.block_on(limiter.call(|| async { Ok::<_, Infallible>(()) }));

        b.to_async(&rt).iter(|| async {
            let result = limiter.call(|| async { Ok::<_, Infallible>(()) }).await;
            black_box(result.is_err())
        });
    });

    group.finish();
}

fn benchmark_rate_limit_identities(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("rate_limit_identities");
    group.throughput(Throughput::Elements(1));

    // Test with growing number of distinct callers
    for identities in [1u64, 100, 10_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(identities),
            &identities,
            |b, &identities| {
                let next = Arc::new(AtomicU64::new(0));
                let resolver_next = next.clone();
                let limiter = RateLimitingThrottle::new(
                    "api",
                    i64::MAX,
                    FnResolver::new(move || {
                        Some(resolver_next.fetch_add(1, Ordering::Relaxed) % identities)
                    }),
                )
                .unwrap();

                b.to_async(&rt).iter(|| async {
                    let value = limiter
                        .call(|| async { Ok::<_, Infallible>(black_box(1u64)) })
                        .await
                        .unwrap();
                    black_box(value)
                });
            },
        );
    }

    group.finish();
}

fn benchmark_chain_depth(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("chain_depth");
    group.throughput(Throughput::Elements(1));

    for depth in [1usize, 2, 4, 8] {
        let mut builder = GuardChain::builder();
        for level in 0..depth {
            builder = if level % 2 == 0 {
                builder.guard(ConcurrencyThrottle::new(format!("c{level}"), 1024).unwrap())
            } else {
                builder.guard(
                    RateLimitingThrottle::new(
                        format!("r{level}"),
                        i64::MAX,
                        FnResolver::new(|| Some("bench")),
                    )
                    .unwrap(),
                )
            };
        }
        let chain = builder.build();

        group.bench_with_input(BenchmarkId::from_parameter(depth), &chain, |b, chain| {
            b.to_async(&rt).iter(|| async {
                let value = chain
                    .execute(|| async { Ok::<_, Infallible>(black_box(1u64)) })
                    .await
                    .unwrap();
                black_box(value)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_single_guard,
    benchmark_rate_limit_identities,
    benchmark_chain_depth
);
criterion_main!(benches);
