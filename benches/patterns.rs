//! Benchmarks for pattern scanning, the grid simulator and the backtester.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use klinescope::prelude::*;

/// Deterministic pseudo-random walk of daily vendor records
fn generate_records(n: usize) -> Vec<RawBar> {
    let start = chrono::NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
    let mut records = Vec::with_capacity(n);
    let mut price: i64 = 100_000;

    for i in 0..n {
        let change = ((i * 7 + 13) % 100) as i64 * 60 - 3_000; // Deterministic "random"
        let spread = 500 + ((i * 3) % 10) as i64 * 200;

        let open = price;
        let close = (price + change).max(10_000);
        let day = start + chrono::Days::new(i as u64);
        records.push(RawBar {
            time: day.format("%Y%m%d").to_string().parse().unwrap(),
            open,
            high: open.max(close) + spread,
            low: open.min(close) - spread,
            close,
            prev_close: price,
            volume: 1_000,
            value: 10_000_000,
        });
        price = close;
    }

    records
}

fn generate_bars(n: usize) -> Vec<Bar> {
    build_bars(&generate_records(n))
}

fn bench_build_bars(c: &mut Criterion) {
    let records = generate_records(3500);

    c.bench_function("build_bars_3500_records", |b| {
        b.iter(|| {
            let _ = black_box(build_bars(black_box(&records)));
        })
    });
}

fn bench_single_pattern(c: &mut Criterion) {
    let bars = generate_bars(1000);

    let engine = EngineBuilder::new()
        .add(BuiltinDetector::MorningStar(MorningStarDetector::with_defaults()))
        .build()
        .unwrap();

    c.bench_function("scan_morning_star_1000_bars", |b| {
        b.iter(|| {
            let _ = black_box(engine.scan(black_box(&bars)));
        })
    });
}

fn bench_all_patterns(c: &mut Criterion) {
    let bars = generate_bars(1000);

    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

    c.bench_function("scan_all_patterns_1000_bars", |b| {
        b.iter(|| {
            let _ = black_box(engine.scan(black_box(&bars)));
        })
    });
}

fn bench_scaling(c: &mut Criterion) {
    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

    let mut group = c.benchmark_group("scaling");

    for size in [100, 500, 1000, 3500].iter() {
        let bars = generate_bars(*size);

        group.bench_with_input(BenchmarkId::new("scan", size), size, |b, _| {
            b.iter(|| {
                let _ = black_box(engine.scan(black_box(&bars)));
            })
        });
    }

    group.finish();
}

fn bench_parallel_scan(c: &mut Criterion) {
    let bars1 = generate_bars(1000);
    let bars2 = generate_bars(1000);
    let bars3 = generate_bars(1000);
    let bars4 = generate_bars(1000);

    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

    let instruments: Vec<(&str, &[Bar])> =
        vec![("SYM1", &bars1), ("SYM2", &bars2), ("SYM3", &bars3), ("SYM4", &bars4)];

    c.bench_function("parallel_scan_4_instruments", |b| {
        b.iter(|| {
            let _ = black_box(scan_parallel(black_box(&engine), black_box(instruments.clone())));
        })
    });
}

fn bench_grid(c: &mut Criterion) {
    let bars = generate_bars(250);
    let config = GridConfig::default();

    c.bench_function("grid_250_bars", |b| {
        b.iter(|| {
            let _ = black_box(simulate_grid(black_box(&bars), 0, bars.len(), &config));
        })
    });
}

fn bench_backtest(c: &mut Criterion) {
    let bars = generate_bars(3500);
    let backtester = Backtester::new(BacktestConfig {
        pattern: PatternKind::Hammer,
        ..BacktestConfig::default()
    })
    .unwrap();
    let windows = YearWindow::yearly(2010, 2019);

    c.bench_function("backtest_3500_bars_10_years", |b| {
        b.iter(|| {
            for &window in &windows {
                let _ = black_box(backtester.simulate(black_box(&bars), window));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_build_bars,
    bench_single_pattern,
    bench_all_patterns,
    bench_scaling,
    bench_parallel_scan,
    bench_grid,
    bench_backtest,
);

criterion_main!(benches);
