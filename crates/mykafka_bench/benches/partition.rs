//! Partition write and read benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mykafka_bench::{filled_partition, random_data, random_words};
use mykafka_commitlog::{Partition, PartitionConfig};
use rand::Rng;
use tempfile::TempDir;

/// Benchmark appends of fixed-size payloads.
fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_write");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let partition = Partition::open(temp_dir.path(), PartitionConfig::default()).unwrap();
            let data = random_data(size);

            b.iter(|| {
                let offset = partition.write(black_box(&data)).unwrap();
                black_box(offset);
            });
        });
    }

    group.finish();
}

/// Benchmark appends that roll over to a new segment every few records.
fn bench_write_rollover(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_write_rollover");
    group.sample_size(20);

    for segment_size in [4 * 1024, 64 * 1024].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(segment_size),
            segment_size,
            |b, &segment_size| {
                let temp_dir = TempDir::new().unwrap();
                let config = PartitionConfig::new()
                    .max_segment_size(segment_size)
                    .max_index_size(64 * 1024);
                let partition = Partition::open(temp_dir.path(), config).unwrap();
                let data = random_data(256);

                b.iter(|| {
                    let offset = partition.write(black_box(&data)).unwrap();
                    black_box(offset);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark sequential and random reads over word-sized payloads.
fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_read");

    let count = 10_000;
    let temp_dir = TempDir::new().unwrap();
    let words = random_words(count, 3, 16);
    let config = PartitionConfig::new().max_segment_size(64 * 1024);
    let partition = filled_partition(temp_dir.path(), config, &words);

    group.bench_function("sequential", |b| {
        let mut offset = 0u64;
        b.iter(|| {
            let payload = partition.read_at(black_box(offset)).unwrap();
            black_box(payload);
            offset = (offset + 1) % count as u64;
        });
    });

    group.bench_function("random", |b| {
        let mut rng = rand::thread_rng();
        b.iter(|| {
            let offset = rng.gen_range(0..count as u64);
            let payload = partition.read_at(black_box(offset)).unwrap();
            black_box(payload);
        });
    });

    group.finish();
}

/// Benchmark reopening a partition, which rebuilds every index.
fn bench_reopen(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_reopen");
    group.sample_size(10);

    for count in [1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let temp_dir = TempDir::new().unwrap();
            let config = PartitionConfig::new().max_segment_size(64 * 1024);
            let words = random_words(count, 3, 16);
            filled_partition(temp_dir.path(), config.clone(), &words)
                .close()
                .unwrap();

            b.iter(|| {
                let partition = Partition::open(temp_dir.path(), config.clone()).unwrap();
                black_box(partition.newest_offset());
                partition.close().unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_write,
    bench_write_rollover,
    bench_read,
    bench_reopen
);
criterion_main!(benches);
