//! TTL cache benchmarks
//!
//! Set/get throughput on the sharded store, the coalesced `get_or_set` hit
//! path and contended reads from several threads.
//!
//! Run with: `cargo bench --bench cache_bench -p bulwark-common`

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bulwark_common::cache::{CacheConfig, TtlCache};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Session {
    user_id: u64,
    token: String,
    scopes: Vec<String>,
}

fn session(user_id: u64) -> Session {
    Session {
        user_id,
        token: format!("tok_{user_id:016x}"),
        scopes: vec!["read".to_string(), "write".to_string()],
    }
}

fn cache<T>() -> TtlCache<T>
where
    T: Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
{
    let config = CacheConfig::builder()
        .ttl(Duration::from_secs(3600))
        .build()
        .expect("valid cache config for benchmarks");
    TtlCache::new(config).expect("cache starts")
}

// ============================================================================
// Basic Operations Benchmarks
// ============================================================================

fn bench_cache_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("u64", |b| {
        let cache: TtlCache<u64> = cache();
        let mut counter = 0u64;
        b.iter(|| {
            cache.set(&format!("k{}", counter % 10_000), black_box(&counter)).unwrap();
            counter = counter.wrapping_add(1);
        });
    });

    group.bench_function("struct", |b| {
        let cache: TtlCache<Session> = cache();
        let value = session(7);
        let mut counter = 0u64;
        b.iter(|| {
            cache.set(&format!("session:{}", counter % 10_000), black_box(&value)).unwrap();
            counter = counter.wrapping_add(1);
        });
    });

    group.finish();
}

fn bench_cache_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_get_hit");

    for size in [100_u64, 10_000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("struct", size), &size, |b, &size| {
            let cache: TtlCache<Session> = cache();
            for i in 0..size {
                cache.set(&format!("session:{i}"), &session(i)).unwrap();
            }
            let mut counter = 0u64;
            b.iter(|| {
                let value = cache.get(&format!("session:{}", counter % size));
                black_box(value);
                counter = counter.wrapping_add(1);
            });
        });
    }

    group.bench_function("miss", |b| {
        let cache: TtlCache<Session> = cache();
        b.iter(|| black_box(cache.get("absent")));
    });

    group.finish();
}

fn bench_get_or_set_hit(c: &mut Criterion) {
    let cache: TtlCache<Session> = cache();
    cache.set("session:1", &session(1)).unwrap();

    c.bench_function("get_or_set_hit", |b| {
        b.iter(|| {
            let value = cache
                .get_or_set("session:1", || Ok::<_, String>(session(1)))
                .expect("cached value");
            black_box(value);
        });
    });
}

// ============================================================================
// Concurrent Access Benchmarks
// ============================================================================

fn bench_concurrent_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_concurrent_reads");

    for threads in [2_usize, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let cache: Arc<TtlCache<u64>> = Arc::new(cache());
            for i in 0..1_000u64 {
                cache.set(&format!("k{i}"), &i).unwrap();
            }

            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let cache = Arc::clone(&cache);
                        thread::spawn(move || {
                            for i in 0..1_000u64 {
                                black_box(cache.get(&format!("k{}", (i + t as u64 * 7) % 1_000)));
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cache_set,
    bench_cache_get,
    bench_get_or_set_hit,
    bench_concurrent_reads
);
criterion_main!(benches);
