// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "Benchmark harness")]
#![allow(unused_results, reason = "Criterion builder returns are intentionally unused")]
#![allow(clippy::cast_possible_truncation, reason = "Intentional modular byte pattern")]

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use readbench::{BenchOptions, BenchmarkRunner, StrategyKind, inspect};

fn make_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

// ---------------------------------------------------------------------------
// A. Whole-file read, per strategy
// ---------------------------------------------------------------------------

fn bench_whole_file(c: &mut Criterion) {
    let sizes: &[(usize, &str)] = &[(1024, "1KB"), (64 * 1024, "64KB"), (1024 * 1024, "1MB")];

    let mut group = c.benchmark_group("whole_file");

    for &(size, label) in sizes {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("in.bin");
        std::fs::write(&path, make_data(size)).expect("setup write");
        group.throughput(Throughput::Bytes(size as u64));

        for kind in StrategyKind::ALL {
            group.bench_with_input(BenchmarkId::new(kind.name(), label), &path, |b, path| {
                let runner = BenchmarkRunner::new(BenchOptions::default().with_async_window(size));
                b.iter(|| {
                    let result = runner.run_kind(kind, path);
                    assert!(result.succeeded(), "{result:?}");
                    black_box(result.bytes_read())
                });
            });
        }
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// B. Async window size
// ---------------------------------------------------------------------------

fn bench_async_window(c: &mut Criterion) {
    let windows: &[(usize, &str)] = &[(1024, "1KB"), (16 * 1024, "16KB"), (256 * 1024, "256KB")];

    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("in.bin");
    std::fs::write(&path, make_data(256 * 1024)).expect("setup write");

    let mut group = c.benchmark_group("async_window");

    for &(window, label) in windows {
        group.throughput(Throughput::Bytes(window as u64));
        group.bench_with_input(BenchmarkId::new("async", label), &window, |b, &window| {
            let runner = BenchmarkRunner::new(BenchOptions::default().with_async_window(window));
            b.iter(|| black_box(runner.run_kind(StrategyKind::Async, &path).bytes_read()));
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// C. Metadata
// ---------------------------------------------------------------------------

fn bench_metadata(c: &mut Criterion) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("meta.bin");
    std::fs::write(&path, b"x").expect("setup write");

    c.bench_function("inspect", |b| {
        b.iter(|| black_box(inspect(&path).expect("inspect").size()));
    });
}

criterion_group!(benches, bench_whole_file, bench_async_window, bench_metadata);
criterion_main!(benches);
