//! Record Filter
//!
//! Resolves a time window and AND-combined criteria purely through the
//! collection's field index, then materializes records in position order.
//!
//! ```text
//! window range walk ─┐
//! criterion 1 set ───┼─ intersect ─→ positions ─→ records
//! criterion n set ───┘
//! ```

use crate::query::ast::{Criterion, Operator, TimeWindow};
use crate::storage::{Collection, Position, StoredEvent};
use std::collections::BTreeSet;

/// Index-backed filter over one collection
pub struct Filter<'a> {
    collection: &'a Collection,
}

impl<'a> Filter<'a> {
    pub fn new(collection: &'a Collection) -> Self {
        Self { collection }
    }

    /// Matching positions, ascending
    ///
    /// Without a window every stored position is a candidate.
    pub fn positions(
        &self,
        window: Option<&TimeWindow>,
        criteria: &[Criterion],
    ) -> BTreeSet<Position> {
        let mut matched = match window {
            Some(window) => self.window_positions(window),
            None => (0..self.collection.len()).collect(),
        };

        for criterion in criteria {
            if matched.is_empty() {
                break;
            }
            let candidates = self.criterion_positions(criterion);
            matched.retain(|p| candidates.contains(p));
        }

        matched
    }

    /// Matching records in position order
    pub fn records(
        &self,
        window: Option<&TimeWindow>,
        criteria: &[Criterion],
    ) -> Vec<&'a StoredEvent> {
        let positions = self.positions(window, criteria);
        tracing::debug!(
            collection = self.collection.name(),
            criteria = criteria.len(),
            matched = positions.len(),
            "Filtered records"
        );
        positions
            .into_iter()
            .filter_map(|p| self.collection.get(p))
            .collect()
    }

    /// Positions whose timestamp key lies inside the window, bounds included
    pub fn window_positions(&self, window: &TimeWindow) -> BTreeSet<Position> {
        self.collection.index().range(
            self.collection.timestamp_field(),
            &window.from_key(),
            &window.to_key(),
        )
    }

    /// Candidate set for one criterion
    pub fn criterion_positions(&self, criterion: &Criterion) -> BTreeSet<Position> {
        let index = self.collection.index();
        let field = criterion.field.as_str();

        match &criterion.op {
            Operator::Is(key) => index.positions(field, key).iter().copied().collect(),
            Operator::IsNot(key) => self.keys_matching(field, |k| k != key),
            Operator::IsOneOf(keys) => keys
                .iter()
                .flat_map(|key| index.positions(field, key).iter().copied())
                .collect(),
            Operator::IsNotOneOf(keys) => {
                self.keys_matching(field, |k| !keys.iter().any(|x| x == k))
            }
            Operator::IsBetween(from, to) => {
                self.numeric_keys_matching(field, |n| *from <= n && n <= *to)
            }
            Operator::IsNotBetween(from, to) => {
                self.numeric_keys_matching(field, |n| n < *from || n > *to)
            }
            Operator::Exists => index.all_positions(field),
            Operator::DoesNotExist => {
                let present = index.all_positions(field);
                index
                    .fields()
                    .filter(|(path, _)| path.as_str() != field)
                    .flat_map(|(_, values)| values.values().flatten().copied())
                    .filter(|p| !present.contains(p))
                    .collect()
            }
            Operator::IsLessThan(bound) => self.numeric_keys_matching(field, |n| n < *bound),
            Operator::IsGreaterThan(bound) => self.numeric_keys_matching(field, |n| n > *bound),
        }
    }

    fn keys_matching(&self, field: &str, keep: impl Fn(&str) -> bool) -> BTreeSet<Position> {
        self.collection
            .index()
            .values(field)
            .into_iter()
            .flatten()
            .filter(|(key, _)| keep(key.as_str()))
            .flat_map(|(_, positions)| positions.iter().copied())
            .collect()
    }

    /// Keys parsed as numbers; keys that are not numbers never match
    fn numeric_keys_matching(
        &self,
        field: &str,
        keep: impl Fn(f64) -> bool,
    ) -> BTreeSet<Position> {
        self.keys_matching(field, |key| {
            key.parse::<f64>().ok().filter(|n| n.is_finite()).map_or(false, &keep)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CollectionSpec, Engine, StorageConfig};
    use serde_json::{json, Value};
    use tempfile::tempdir;

    async fn engine_with(events: Vec<Value>) -> (Engine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let spec = CollectionSpec::new("events")
            .skeleton(vec!["event.when".into(), "user.email".into()]);
        let config = StorageConfig::new(dir.path()).with_collections(vec![spec]);
        let engine = Engine::open(config).await.unwrap();
        for event in events {
            engine.insert("events", event).await.unwrap();
        }
        (engine, dir)
    }

    fn sample() -> Vec<Value> {
        vec![
            json!({"event": {"action": "a", "when": "2020-01-01T00:00:00.000Z"}, "n": 1}),
            json!({"event": {"action": "b", "when": "2020-01-02T00:00:00.000Z"}, "n": 5}),
            json!({"event": {"action": "c", "when": "2020-01-03T00:00:00.000Z"}, "n": "10"}),
            json!({"event": {"action": "a", "when": "2020-01-04T00:00:00.000Z"}, "n": "x"}),
            json!({"event": {"action": "b", "when": "2020-01-05T00:00:00.000Z"}}),
        ]
    }

    fn criterion(field: &str, op: Operator) -> Vec<Criterion> {
        vec![Criterion::new(field, op)]
    }

    fn window(from: &str, to: &str) -> TimeWindow {
        use crate::storage::parse_timestamp;
        TimeWindow::new(parse_timestamp(from).unwrap(), parse_timestamp(to).unwrap())
    }

    #[tokio::test]
    async fn test_window_inclusive() {
        let (engine, _dir) = engine_with(sample()).await;
        let collection = engine.read("events").await.unwrap();
        let filter = Filter::new(&collection);

        let w = window("2020-01-02T00:00:00.000Z", "2020-01-04T00:00:00.000Z");
        let got: Vec<Position> = filter.positions(Some(&w), &[]).into_iter().collect();
        assert_eq!(got, vec![1, 2, 3]);

        let w = window("2020-01-02T00:00:00.001Z", "2020-01-03T23:59:59.999Z");
        let got: Vec<Position> = filter.positions(Some(&w), &[]).into_iter().collect();
        assert_eq!(got, vec![2]);
    }

    #[tokio::test]
    async fn test_window_bounds_match_non_canonical_timestamps() {
        let dir = tempdir().unwrap();
        let config =
            StorageConfig::new(dir.path()).with_collections(vec![CollectionSpec::new("raw")]);
        let engine = Engine::open(config).await.unwrap();
        engine
            .insert("raw", json!({"event": {"when": "2020-01-01T00:00:00Z"}}))
            .await
            .unwrap();
        engine
            .insert("raw", json!({"event": {"when": "2020-01-01T02:00:00+01:00"}}))
            .await
            .unwrap();

        let collection = engine.read("raw").await.unwrap();
        let filter = Filter::new(&collection);

        let exact = window("2020-01-01T00:00:00Z", "2020-01-01T00:00:00Z");
        let got: Vec<Position> = filter.positions(Some(&exact), &[]).into_iter().collect();
        assert_eq!(got, vec![0]);

        let upto = window("2019-12-31T23:59:59Z", "2020-01-01T01:00:00Z");
        let got: Vec<Position> = filter.positions(Some(&upto), &[]).into_iter().collect();
        assert_eq!(got, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_equality_operators() {
        let (engine, _dir) = engine_with(sample()).await;
        let collection = engine.read("events").await.unwrap();
        let filter = Filter::new(&collection);
        let pos = |op: Operator| -> Vec<Position> {
            filter
                .positions(None, &criterion("event.action", op))
                .into_iter()
                .collect()
        };

        assert_eq!(pos(Operator::Is("a".into())), vec![0, 3]);
        assert_eq!(pos(Operator::IsNot("a".into())), vec![1, 2, 4]);
        assert_eq!(pos(Operator::IsOneOf(vec!["a".into(), "c".into()])), vec![0, 2, 3]);
        assert_eq!(pos(Operator::IsNotOneOf(vec!["a".into(), "c".into()])), vec![1, 4]);
        assert_eq!(pos(Operator::Is("zzz".into())), Vec::<Position>::new());
    }

    #[tokio::test]
    async fn test_numeric_operators_skip_non_numeric_keys() {
        let (engine, _dir) = engine_with(sample()).await;
        let collection = engine.read("events").await.unwrap();
        let filter = Filter::new(&collection);
        let pos = |op: Operator| -> Vec<Position> {
            filter.positions(None, &criterion("n", op)).into_iter().collect()
        };

        assert_eq!(pos(Operator::IsBetween(1.0, 5.0)), vec![0, 1]);
        assert_eq!(pos(Operator::IsNotBetween(1.0, 5.0)), vec![2]);
        assert_eq!(pos(Operator::IsLessThan(5.0)), vec![0]);
        assert_eq!(pos(Operator::IsGreaterThan(5.0)), vec![2]);
    }

    #[tokio::test]
    async fn test_existence_operators() {
        let (engine, _dir) = engine_with(sample()).await;
        let collection = engine.read("events").await.unwrap();
        let filter = Filter::new(&collection);

        let exists: Vec<Position> = filter
            .positions(None, &criterion("n", Operator::Exists))
            .into_iter()
            .collect();
        assert_eq!(exists, vec![0, 1, 2, 3]);

        let missing: Vec<Position> = filter
            .positions(None, &criterion("n", Operator::DoesNotExist))
            .into_iter()
            .collect();
        assert_eq!(missing, vec![4]);

        // declared but never written: nobody has it
        let missing: Vec<Position> = filter
            .positions(None, &criterion("user.email", Operator::DoesNotExist))
            .into_iter()
            .collect();
        assert_eq!(missing, vec![0, 1, 2, 3, 4]);

        // unknown path: empty for exists, everything for does not exist
        assert!(filter
            .positions(None, &criterion("nope", Operator::Exists))
            .is_empty());
        assert_eq!(
            filter
                .positions(None, &criterion("nope", Operator::DoesNotExist))
                .len(),
            5
        );
    }

    #[tokio::test]
    async fn test_criteria_and_window_intersect() {
        let (engine, _dir) = engine_with(sample()).await;
        let collection = engine.read("events").await.unwrap();
        let filter = Filter::new(&collection);

        let criteria = vec![
            Criterion::new("event.action", Operator::IsOneOf(vec!["a".into(), "b".into()])),
            Criterion::new("n", Operator::Exists),
        ];
        let w = window("2020-01-02", "2020-01-05");
        let records = filter.records(Some(&w), &criteria);
        let ids: Vec<Position> = records.iter().map(|r| r.position).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
