//! Benchmarks for the insightful engine
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use insightful::aggregation::{aggregate, Granularity};
use insightful::query::{
    Bucketing, ChartSpec, Criterion as Where, Filter, Interval, Operator, QueryExecutor,
    SplitMode, SplitSpec, TimeWindow, XSpec, YAggregation, YSpec,
};
use insightful::storage::{
    format_timestamp, parse_timestamp, Engine, LogSyncMode, StorageConfig, StoredEvent,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tempfile::tempdir;

const ACTIONS: [&str; 5] = ["signup", "login", "view", "purchase", "logout"];
const BROWSERS: [&str; 3] = ["firefox", "chrome", "safari"];

fn create_test_event(i: usize) -> Value {
    let start = parse_timestamp("2020-01-01").unwrap();
    let when = start + chrono::Duration::minutes(i as i64 * 7);
    json!({
        "event": {"action": ACTIONS[i % ACTIONS.len()], "when": format_timestamp(when)},
        "device": {"browser": BROWSERS[i % BROWSERS.len()]},
        "quote": {"seconds": (i % 97) as f64 / 3.0}
    })
}

fn bench_config(dir: &std::path::Path) -> StorageConfig {
    let mut config = StorageConfig::new(dir);
    config.log_sync = LogSyncMode::None;
    config.sync_snapshot = false;
    config
}

fn window() -> TimeWindow {
    TimeWindow::new(
        parse_timestamp("2020-01-01").unwrap(),
        parse_timestamp("2020-02-01").unwrap(),
    )
}

fn stored_events(count: usize) -> Vec<StoredEvent> {
    (0..count)
        .map(|i| {
            let body: Map<String, Value> = serde_json::from_value(create_test_event(i)).unwrap();
            StoredEvent::new(format!("id-{}", i), i, body)
        })
        .collect()
}

fn bench_insert(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("insert");
    group.throughput(Throughput::Elements(1));

    group.bench_function("insert_single", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let dir = tempdir().unwrap();
                let engine = Engine::open(bench_config(dir.path())).await.unwrap();

                let start = std::time::Instant::now();

                for i in 0..iters {
                    let event = create_test_event(i as usize);
                    engine.insert("events", black_box(event)).await.unwrap();
                }

                start.elapsed()
            })
        });
    });

    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempdir().unwrap();
    let engine = rt.block_on(async {
        let engine = Engine::open(bench_config(dir.path())).await.unwrap();
        for i in 0..10_000 {
            engine.insert("events", create_test_event(i)).await.unwrap();
        }
        engine
    });

    let mut group = c.benchmark_group("filter");

    let criteria = vec![
        Where::new("event.action", Operator::IsOneOf(vec!["login".into(), "view".into()])),
        Where::new("quote.seconds", Operator::IsBetween(5.0, 20.0)),
    ];

    group.bench_function("window_and_criteria_10k", |b| {
        b.iter(|| {
            rt.block_on(async {
                let collection = engine.read("events").await.unwrap();
                let filter = Filter::new(&collection);
                black_box(filter.positions(Some(&window()), black_box(&criteria)).len())
            })
        })
    });

    group.bench_function("does_not_exist_10k", |b| {
        let missing = vec![Where::new("user.email", Operator::DoesNotExist)];
        b.iter(|| {
            rt.block_on(async {
                let collection = engine.read("events").await.unwrap();
                let filter = Filter::new(&collection);
                black_box(filter.positions(None, black_box(&missing)).len())
            })
        })
    });

    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let events = stored_events(10_000);
    let records: Vec<&StoredEvent> = events.iter().collect();
    let window = window();

    let mut group = c.benchmark_group("aggregate");
    group.throughput(Throughput::Elements(records.len() as u64));

    let terms = ChartSpec {
        x: XSpec::new("event.action", Bucketing::terms()),
        y: YSpec::of(YAggregation::Median, "quote.seconds"),
    };
    group.bench_function("terms_median_10k", |b| {
        b.iter(|| aggregate(black_box(&records), &terms, &window, &[]).unwrap())
    });

    let histogram = ChartSpec {
        x: XSpec::new(
            "event.when",
            Bucketing::DateHistogram {
                interval: Interval::Fixed(Granularity::Day),
            },
        )
        .split(SplitSpec::new("device.browser", SplitMode::terms())),
        y: YSpec::count(),
    };
    group.bench_function("date_histogram_split_10k", |b| {
        b.iter(|| aggregate(black_box(&records), &histogram, &window, &[]).unwrap())
    });

    group.finish();
}

fn bench_significant_terms(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempdir().unwrap();
    let executor = rt.block_on(async {
        let engine = Engine::open(bench_config(dir.path())).await.unwrap();
        for i in 0..10_000 {
            engine.insert("events", create_test_event(i)).await.unwrap();
        }
        QueryExecutor::new(Arc::new(engine))
    });

    let chart = ChartSpec {
        x: XSpec::new("device.browser", Bucketing::SignificantTerms { size: Some(10) }),
        y: YSpec::count(),
    };

    c.bench_function("significant_terms_10k", |b| {
        b.iter(|| {
            rt.block_on(async {
                executor
                    .chart("events", &window(), &[], black_box(&chart))
                    .await
                    .unwrap()
            })
        })
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_filter,
    bench_aggregate,
    bench_significant_terms
);
criterion_main!(benches);
