//! Benchmarks for content-defined chunking.

use cairn_chunk::{ChunkingOptions, RollingChunker};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn bench_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = 0xC0FF_EE11;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

fn bench_split(c: &mut Criterion) {
    let variable = RollingChunker::new(ChunkingOptions::default()).unwrap();
    let fixed = RollingChunker::new(ChunkingOptions::fixed(64 * 1024)).unwrap();
    let sizes: &[usize] = &[
        256 * 1024,       // 256 KB
        1024 * 1024,      // 1 MB
        16 * 1024 * 1024, // 16 MB
    ];

    let mut group = c.benchmark_group("split");
    for &size in sizes {
        let data = bench_data(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("buzhash", size), &data, |b, data| {
            b.iter(|| variable.split(data));
        });
        group.bench_with_input(BenchmarkId::new("fixed", size), &data, |b, data| {
            b.iter(|| fixed.split(data));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_split);
criterion_main!(benches);
