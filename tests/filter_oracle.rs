//! Property tests: the index-backed filter agrees with a full scan, and an
//! incrementally maintained index equals one rebuilt from the store.

use chrono::{DateTime, Utc};
use insightful::index::FieldIndex;
use insightful::query::{Criterion, Filter, Operator, TimeWindow};
use insightful::storage::{
    index_key, parse_timestamp, resolve_path, CollectionSpec, Engine, LogSyncMode, Position,
    StorageConfig, StoredEvent,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tempfile::tempdir;

fn n_value() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        (-10i64..10).prop_map(|i| Some(json!(i))),
        (-20i64..20).prop_map(|i| Some(json!(i as f64 / 4.0))),
        (0u32..20).prop_map(|i| Some(json!(i.to_string()))),
        Just(Some(json!("x"))),
        Just(Some(json!(true))),
        Just(Some(Value::Null)),
    ]
}

fn event() -> impl Strategy<Value = Value> {
    (prop::sample::select(vec!["a", "b", "c"]), 1u32..=28, n_value()).prop_map(
        |(action, day, n)| {
            let when = format!("2020-02-{:02}T06:00:00.000Z", day);
            let mut event = json!({"event": {"action": action, "when": when}});
            if let Some(n) = n {
                event["n"] = n;
            }
            event
        },
    )
}

fn key() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d", "1", "2.5", "x", "true", "null"])
        .prop_map(String::from)
}

fn bound() -> impl Strategy<Value = f64> {
    (-12i64..12).prop_map(|i| i as f64 / 2.0)
}

fn operator() -> impl Strategy<Value = Operator> {
    prop_oneof![
        key().prop_map(Operator::Is),
        key().prop_map(Operator::IsNot),
        prop::collection::vec(key(), 1..4).prop_map(Operator::IsOneOf),
        prop::collection::vec(key(), 1..4).prop_map(Operator::IsNotOneOf),
        (bound(), bound()).prop_map(|(a, b)| Operator::IsBetween(a, b)),
        (bound(), bound()).prop_map(|(a, b)| Operator::IsNotBetween(a, b)),
        Just(Operator::Exists),
        Just(Operator::DoesNotExist),
        bound().prop_map(Operator::IsLessThan),
        bound().prop_map(Operator::IsGreaterThan),
    ]
}

fn criterion() -> impl Strategy<Value = Criterion> {
    (prop::sample::select(vec!["n", "event.action", "missing"]), operator())
        .prop_map(|(field, op)| Criterion::new(field, op))
}

fn window() -> impl Strategy<Value = Option<TimeWindow>> {
    prop::option::of((1u32..=28, 0u32..=10)).prop_map(|bounds| {
        bounds.map(|(start, length)| {
            let from = format!("2020-02-{:02}", start);
            let to = format!("2020-02-{:02}T06:00:00Z", (start + length).min(28));
            TimeWindow::new(day(&from), day(&to))
        })
    })
}

fn day(raw: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap()
}

fn numeric(key: &str) -> Option<f64> {
    key.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Full-scan reading of one criterion against one record
fn scan_matches(record: &Value, criterion: &Criterion) -> bool {
    let key = resolve_path(record, &criterion.field).and_then(index_key);
    let number = key.as_deref().and_then(numeric);

    match &criterion.op {
        Operator::Is(k) => key.as_deref() == Some(k.as_str()),
        Operator::IsNot(k) => key.as_deref().map_or(false, |key| key != k),
        Operator::IsOneOf(ks) => key.as_ref().map_or(false, |key| ks.contains(key)),
        Operator::IsNotOneOf(ks) => key.as_ref().map_or(false, |key| !ks.contains(key)),
        Operator::IsBetween(a, b) => number.map_or(false, |n| *a <= n && n <= *b),
        Operator::IsNotBetween(a, b) => number.map_or(false, |n| n < *a || n > *b),
        Operator::Exists => key.is_some(),
        Operator::DoesNotExist => key.is_none(),
        Operator::IsLessThan(b) => number.map_or(false, |n| n < *b),
        Operator::IsGreaterThan(b) => number.map_or(false, |n| n > *b),
    }
}

fn scan(
    events: &[StoredEvent],
    window: Option<&TimeWindow>,
    criteria: &[Criterion],
) -> BTreeSet<Position> {
    events
        .iter()
        .filter(|record| {
            window.map_or(true, |w| {
                let when = record
                    .field("event.when")
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp);
                when.map_or(false, |t| w.from <= t && t <= w.to)
            })
        })
        .filter(|record| criteria.iter().all(|c| scan_matches(&record.event, c)))
        .map(|record| record.position)
        .collect()
}

async fn open(dir: &std::path::Path) -> Engine {
    let mut config = StorageConfig::new(dir).with_collections(vec![CollectionSpec::new("events")]);
    config.log_sync = LogSyncMode::None;
    config.sync_snapshot = false;
    Engine::open(config).await.unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn filter_agrees_with_full_scan(
        events in prop::collection::vec(event(), 1..30),
        window in window(),
        criteria in prop::collection::vec(criterion(), 0..3),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let dir = tempdir().unwrap();

        let (indexed, scanned) = rt.block_on(async {
            let engine = open(dir.path()).await;
            for event in events {
                engine.insert("events", event).await.unwrap();
            }
            let collection = engine.read("events").await.unwrap();
            let filter = Filter::new(&collection);
            (
                filter.positions(window.as_ref(), &criteria),
                scan(collection.events(), window.as_ref(), &criteria),
            )
        });

        prop_assert_eq!(indexed, scanned);
    }

    #[test]
    fn incremental_index_equals_rebuild(events in prop::collection::vec(event(), 0..30)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let dir = tempdir().unwrap();

        let (incremental, rebuilt) = rt.block_on(async {
            let engine = open(dir.path()).await;
            for event in events {
                engine.insert("events", event).await.unwrap();
            }
            let collection = engine.read("events").await.unwrap();
            let rebuilt = FieldIndex::rebuild(
                dir.path().join("scratch.index.json"),
                std::iter::empty(),
                collection.events(),
            );
            (collection.index().snapshot().clone(), rebuilt.snapshot().clone())
        });

        prop_assert_eq!(incremental, rebuilt);
    }
}
