//! Benchmarks for StringDB generation and storage operations

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use stringdb::config::{Config, WalSyncStrategy};
use stringdb::{BatchFiller, FillOptions, RandomStringSource, RecordStore};
use tempfile::TempDir;

const LEN: usize = 100;

fn bench_config(dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 64 })
        .string_length(LEN)
        .build()
}

fn generation_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    group.throughput(Throughput::Elements(100));

    let mut source = RandomStringSource::os();
    group.bench_function("batch_of_100", |b| {
        b.iter(|| source.generate_batch(100, LEN).unwrap())
    });
    group.finish();
}

fn storage_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    group.throughput(Throughput::Elements(100));

    let temp = TempDir::new().unwrap();
    let store = RecordStore::open(bench_config(&temp)).unwrap();
    let mut source = RandomStringSource::os();

    group.bench_function("insert_batch_100", |b| {
        b.iter_batched(
            || source.generate_batch(100, LEN).unwrap(),
            |values| store.insert_and_wait(values).unwrap(),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn fill_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill");
    group.sample_size(10);
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("empty_to_10k", |b| {
        b.iter_batched(
            || {
                let temp = TempDir::new().unwrap();
                let config = bench_config(&temp);
                let store = RecordStore::open(config.clone()).unwrap();
                (temp, store, BatchFiller::os(FillOptions::from_config(&config)))
            },
            |(temp, store, mut filler)| {
                let report = filler.fill(&store, 10_000).unwrap();
                store.close();
                drop(temp);
                report
            },
            BatchSize::PerIteration,
        )
    });
    group.finish();
}

criterion_group!(benches, generation_benchmarks, storage_benchmarks, fill_benchmarks);
criterion_main!(benches);
