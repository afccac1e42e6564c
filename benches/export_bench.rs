//! Benchmarks for union-find lookups and end-to-end export.
//!
//! `find` is measured on freshly built forests (it compresses as it goes);
//! `find_no_opt` on frozen structures, which is the export hot path.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use dss_export::{DisjointSetStruct, IdentityMapping, MemoryNodeStore, NodeId, ParallelExporter};
use std::hint::black_box;
use std::time::Duration;

/// Chains of `cluster_size` consecutive ids
fn clustered(count: u32, cluster_size: u32) -> DisjointSetStruct {
    let mut dsu = DisjointSetStruct::new(count as usize);
    for start in (0..count).step_by(cluster_size as usize) {
        for i in 1..cluster_size.min(count - start) {
            dsu.union(NodeId(start + i - 1), NodeId(start + i));
        }
    }
    dsu
}

// =============================================================================
// DSU BENCHMARKS
// =============================================================================

fn bench_dsu_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsu_find");
    group.sample_size(50);
    group.warm_up_time(Duration::from_millis(500));

    for &count in &[10_000u32, 100_000, 1_000_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("find", count), &count, |b, &count| {
            b.iter_batched(
                || clustered(count, 100),
                |mut dsu| {
                    for i in 0..count {
                        black_box(dsu.find(NodeId(i)));
                    }
                },
                BatchSize::LargeInput,
            );
        });

        let frozen = clustered(count, 100).freeze();
        group.bench_with_input(BenchmarkId::new("find_no_opt", count), &count, |b, &count| {
            b.iter(|| {
                for i in 0..count {
                    black_box(frozen.find_no_opt(NodeId(i)));
                }
            });
        });
    }
    group.finish();
}

// =============================================================================
// EXPORT BENCHMARKS
// =============================================================================

fn bench_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("export_components");
    group.sample_size(10);

    let count = 1_000_000u32;
    let frozen = clustered(count, 1_000).freeze();
    let mapping = IdentityMapping::new(count as usize);
    group.throughput(Throughput::Elements(count as u64));

    for &workers in &[1usize, 4, 8] {
        group.bench_with_input(BenchmarkId::new("memory_store", workers), &workers, |b, &workers| {
            b.iter_batched(
                MemoryNodeStore::new,
                |store| {
                    ParallelExporter::new(&mapping)
                        .with_concurrency(workers)
                        .with_progress_logging(false)
                        .export_components(&store, "component", &frozen)
                        .expect("export");
                    store
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dsu_find, bench_export);
criterion_main!(benches);
