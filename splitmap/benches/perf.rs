//! Benchmark: split-ordered map performance
//!
//! Measures single-threaded put/get, lookups in random order, and concurrent
//! mixed workloads across thread counts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use splitmap::SplitOrderedMap;
use std::sync::Arc;
use std::thread;

// Number of operations per benchmark
const SMALL_OPS: u32 = 1_000;
const MEDIUM_OPS: u32 = 10_000;
const LARGE_OPS: u32 = 100_000;

// Thread counts to test
const THREAD_COUNTS: &[u32] = &[1, 2, 4, 8];

fn filled(size: u32) -> SplitOrderedMap {
    let map = SplitOrderedMap::new(size as u64 * 2, 4);
    for i in 0..size {
        map.put(i, i * 2);
    }
    map
}

/// Benchmark: Single-threaded put, growing from one bucket
fn bench_single_thread_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_put");

    for &size in &[SMALL_OPS, MEDIUM_OPS, LARGE_OPS] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("splitmap", size), &size, |b, &size| {
            b.iter(|| {
                let map = SplitOrderedMap::new(size as u64 * 2, 4);
                for i in 0..size {
                    map.put(black_box(i), black_box(i * 2));
                }
                map
            });
        });
    }

    group.finish();
}

/// Benchmark: Single-threaded get in insertion order
fn bench_single_thread_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_get");

    for &size in &[SMALL_OPS, MEDIUM_OPS, LARGE_OPS] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("splitmap", size), &size, |b, &size| {
            let map = filled(size);
            b.iter(|| {
                let mut sum = 0u64;
                for i in 0..size {
                    if let Some(v) = map.get(black_box(i)) {
                        sum += v as u64;
                    }
                }
                sum
            });
        });
    }

    group.finish();
}

/// Benchmark: Single-threaded get in shuffled order
fn bench_random_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_get");

    for &size in &[MEDIUM_OPS, LARGE_OPS] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("splitmap", size), &size, |b, &size| {
            let map = filled(size);
            let mut keys: Vec<u32> = (0..size).collect();
            keys.shuffle(&mut StdRng::seed_from_u64(0x5eed));
            b.iter(|| {
                let mut hits = 0u32;
                for &k in &keys {
                    if map.get(black_box(k)).is_some() {
                        hits += 1;
                    }
                }
                hits
            });
        });
    }

    group.finish();
}

/// Benchmark: Concurrent disjoint puts
fn bench_concurrent_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_put");
    group.sample_size(20);

    for &threads in THREAD_COUNTS {
        let per_thread = MEDIUM_OPS;
        group.throughput(Throughput::Elements((per_thread * threads) as u64));
        group.bench_with_input(BenchmarkId::new("splitmap", threads), &threads, |b, &threads| {
            b.iter(|| {
                let map = Arc::new(SplitOrderedMap::new((per_thread * threads) as u64, 4));
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let map = map.clone();
                        thread::spawn(move || {
                            for i in 0..per_thread {
                                map.put(i * threads + t, i);
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
                map
            });
        });
    }

    group.finish();
}

/// Benchmark: Concurrent mixed workload (80% get, 10% put, 10% remove)
fn bench_concurrent_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_mixed");
    group.sample_size(20);

    for &threads in THREAD_COUNTS {
        let ops = MEDIUM_OPS;
        group.throughput(Throughput::Elements((ops * threads) as u64));
        group.bench_with_input(BenchmarkId::new("splitmap", threads), &threads, |b, &threads| {
            let map = Arc::new(filled(MEDIUM_OPS));
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let map = map.clone();
                        thread::spawn(move || {
                            for i in 0..ops {
                                let key = (i * 7 + t * 13) % (MEDIUM_OPS * 2);
                                match i % 10 {
                                    0 => {
                                        map.put(key, i);
                                    }
                                    1 => {
                                        map.remove(key);
                                    }
                                    _ => {
                                        black_box(map.get(key));
                                    }
                                }
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread_put,
    bench_single_thread_get,
    bench_random_get,
    bench_concurrent_put,
    bench_concurrent_mixed
);
criterion_main!(benches);
