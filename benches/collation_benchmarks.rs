//! Benchmarks for the hot paths of the collation engine

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use weblog_monitor::aggregation::{MovingWindow, SiteCounter};
use weblog_monitor::parser::{CommonLogParser, LineParser};

const LINE: &str =
    r#"127.0.0.1 - james [09/May/2018:16:00:39 +0000] "GET /report/q1?page=2 HTTP/1.0" 200 123"#;

/// Paths spread over `sections` site keys
fn create_paths(count: usize, sections: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("/section{}/page{}", i % sections, i))
        .collect()
}

fn benchmark_parse_line(c: &mut Criterion) {
    let parser = CommonLogParser;

    c.bench_function("parse_common_log_line", |b| {
        b.iter(|| black_box(parser.parse(black_box(LINE))))
    });

    c.bench_function("parse_malformed_line", |b| {
        b.iter(|| black_box(parser.parse(black_box("not a log line"))))
    });
}

fn benchmark_moving_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("moving_window");

    for capacity in [10, 120, 3600] {
        group.bench_with_input(BenchmarkId::new("push_average", capacity), &capacity, |b, &capacity| {
            let mut window = MovingWindow::new(capacity);
            let mut sample = 0u64;
            b.iter(|| {
                sample = sample.wrapping_add(7) % 1000;
                window.push(black_box(sample));
                black_box(window.average())
            });
        });
    }

    group.finish();
}

fn benchmark_site_counter(c: &mut Criterion) {
    let mut group = c.benchmark_group("site_counter");

    let paths = create_paths(10_000, 50);
    group.throughput(Throughput::Elements(paths.len() as u64));
    group.bench_function("record", |b| {
        b.iter(|| {
            let mut counter = SiteCounter::new();
            for path in &paths {
                counter.record(black_box(path));
            }
            black_box(counter.len())
        });
    });

    for sections in [10, 100, 1000] {
        let mut counter = SiteCounter::new();
        for path in create_paths(sections * 10, sections) {
            counter.record(&path);
        }
        group.bench_with_input(BenchmarkId::new("ranked", sections), &counter, |b, counter| {
            b.iter(|| black_box(counter.ranked()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_parse_line,
    benchmark_moving_window,
    benchmark_site_counter
);
criterion_main!(benches);
