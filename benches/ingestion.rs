use std::fmt::Write as _;
use std::hint::black_box;
use std::path::Path;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use datachat_ingest::config::IngestConfig;
use datachat_ingest::ingestion::csv::{count_rows, load_sample};
use datachat_ingest::ingestion::sniff::{detect_delimiter, sniff};
use datachat_ingest::ingestion::{IngestionOptions, Ingestor};

fn synthetic_csv(rows: usize) -> String {
    let mut text = String::with_capacity(rows * 32);
    text.push_str("id,region,amount,flag\n");
    for i in 0..rows {
        writeln!(text, "{i},region{},{}.{:02},{}", i % 7, i % 1000, i % 100, i % 2 == 0).unwrap();
    }
    text
}

fn write_fixture(dir: &Path, rows: usize) -> std::path::PathBuf {
    let path = dir.join(format!("bench_{rows}.csv"));
    std::fs::write(&path, synthetic_csv(rows)).unwrap();
    path
}

fn bench_detect_delimiter(c: &mut Criterion) {
    let text = synthetic_csv(2_000);
    let prefix = &text[..text.len().min(50_000)];
    c.bench_function("detect_delimiter_50k", |b| {
        b.iter(|| detect_delimiter(black_box(prefix), true))
    });
}

fn bench_sample_and_count(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("sample_and_count");
    group.sample_size(10);

    for rows in [10_000usize, 200_000] {
        let path = write_fixture(dir.path(), rows);
        let hints = sniff(&path, "csv").unwrap();
        group.throughput(Throughput::Bytes(std::fs::metadata(&path).unwrap().len()));

        group.bench_with_input(BenchmarkId::new("load_sample_100", rows), &path, |b, path| {
            b.iter(|| load_sample(black_box(path), &hints, 100).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("count_rows", rows), &path, |b, path| {
            b.iter(|| count_rows(black_box(path), &hints, 100_000).unwrap())
        });
    }
    group.finish();
}

fn bench_ingest(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let ing = Ingestor::new(IngestConfig::with_data_dir(dir.path())).unwrap();
    let bytes = synthetic_csv(50_000).into_bytes();
    let options = IngestionOptions::default();

    let mut group = c.benchmark_group("ingest");
    group.sample_size(10);
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("ingest_50k_rows", |b| {
        b.iter(|| ing.ingest(black_box(&bytes), "bench.csv", &options).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_detect_delimiter, bench_sample_and_count, bench_ingest);
criterion_main!(benches);
