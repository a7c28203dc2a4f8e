//! Chart Aggregation
//!
//! Turns a filtered record set into chart output:
//!
//! - **bucket**: X strategies (histogram, terms, significant/threshold terms,
//!   date histogram)
//! - **split**: secondary dimension producing one series per split value
//! - **metric**: Y aggregations over each bucket
//! - **significance**: foreground/background scoring for significant terms
//! - **calendar**: date histogram granularities and span caps
//!
//! # Pipeline
//!
//! ```text
//! records → drop undefined X → stable sort by X → buckets → [split] → Y metric
//!         → [order + size cap] → {labels, series, scores?}
//! ```
//!
//! Aggregation runs on borrowed records while the caller holds the
//! collection's read lock; it never awaits.

mod bucket;
pub mod calendar;
pub mod metric;
pub mod significance;
mod split;

pub use calendar::Granularity;
pub use significance::score as significance_score;

use crate::query::{
    Bucketing, ChartSpec, QueryError, QueryResult, SortOrder, TimeWindow, YSpec,
};
use crate::storage::{as_number, index_key, StoredEvent};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Insertion-ordered buckets keyed by label
///
/// Terms and series output follow first-seen order, so lookups go through a
/// side map while iteration walks the key vector.
#[derive(Debug, Clone)]
pub struct OrderedBuckets<T> {
    keys: Vec<String>,
    members: Vec<Vec<T>>,
    lookup: HashMap<String, usize>,
}

impl<T> Default for OrderedBuckets<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedBuckets<T> {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            members: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Create an empty bucket unless it exists; returns its index
    pub fn ensure(&mut self, key: &str) -> usize {
        if let Some(&idx) = self.lookup.get(key) {
            return idx;
        }
        let idx = self.keys.len();
        self.keys.push(key.to_string());
        self.members.push(Vec::new());
        self.lookup.insert(key.to_string(), idx);
        idx
    }

    /// Append a member, creating its bucket on first sight
    pub fn push(&mut self, key: &str, item: T) {
        let idx = self.ensure(key);
        self.members[idx].push(item);
    }

    pub fn get(&self, key: &str) -> Option<&[T]> {
        self.lookup.get(key).map(|&idx| self.members[idx].as_slice())
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Vec<T>> {
        let idx = *self.lookup.get(key)?;
        self.members.get_mut(idx)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[T])> {
        self.keys
            .iter()
            .map(String::as_str)
            .zip(self.members.iter().map(Vec::as_slice))
    }

    /// Keep only buckets for which `keep` returns true, preserving order
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &[T]) -> bool) {
        let keys = std::mem::take(&mut self.keys);
        let members = std::mem::take(&mut self.members);
        self.lookup.clear();

        for (key, items) in keys.into_iter().zip(members) {
            if keep(&key, &items) {
                self.lookup.insert(key.clone(), self.keys.len());
                self.keys.push(key);
                self.members.push(items);
            }
        }
    }

    /// Keep the first `n` buckets
    pub fn truncate(&mut self, n: usize) {
        for key in self.keys.drain(n.min(self.keys.len())..) {
            self.lookup.remove(&key);
        }
        self.members.truncate(n);
    }
}

/// A record with its resolved X value
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    pub record: &'a StoredEvent,
    pub x: &'a Value,
}

/// One line of a chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// One value per label; `null` where a bucket has no data
    pub data: Vec<Value>,
}

/// Chart output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartResult {
    pub labels: Vec<String>,
    pub series: Vec<Series>,
    /// Significance score per label (significant terms only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<f64>>,
}

impl ChartResult {
    /// Label → value pairs of the first series
    pub fn pairs(&self) -> Vec<(&str, &Value)> {
        match self.series.first() {
            Some(series) => self
                .labels
                .iter()
                .map(String::as_str)
                .zip(series.data.iter())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Whether a chart needs the background (no time window) record set
pub fn needs_background(chart: &ChartSpec) -> bool {
    matches!(chart.x.bucketing, Bucketing::SignificantTerms { .. })
}

/// Aggregate filtered records into a chart
///
/// `background` is the same criteria evaluated without a time window; it is
/// only read for significant terms.
pub fn aggregate(
    records: &[&StoredEvent],
    chart: &ChartSpec,
    window: &TimeWindow,
    background: &[&StoredEvent],
) -> QueryResult<ChartResult> {
    if !chart.y.agg.is_supported() {
        return Err(QueryError::UnsupportedAggregation(chart.y.agg.to_string()));
    }

    let x = &chart.x;
    let rows = prepare(records, &x.field);
    let mut buckets = bucket::build(&rows, x, window)?;

    let scores = match x.bucketing {
        Bucketing::SignificantTerms { .. } => {
            let background_rows = prepare(background, &x.field);
            let scores = significance::score_terms(&buckets, rows.len(), &background_rows);
            buckets.retain(|key, _| scores.get(key).map_or(false, |s| *s > 0.0));
            Some(scores)
        }
        _ => None,
    };

    let cap = match x.bucketing {
        Bucketing::Terms { size, .. } | Bucketing::SignificantTerms { size } => size,
        _ => None,
    };

    tracing::debug!(
        strategy = x.bucketing.name(),
        records = records.len(),
        buckets = buckets.len(),
        "Aggregating chart"
    );

    match &x.split {
        None => {
            let order = x.order.filter(|_| x.bucketing.is_terms_like());
            Ok(unsplit(&buckets, &chart.y, order, cap, scores.as_ref()))
        }
        Some(spec) => {
            if let Some(n) = cap {
                buckets.truncate(n);
            }
            let series = split::partition(&buckets, spec)?
                .into_iter()
                .map(|s| Series {
                    label: Some(s.label),
                    data: s
                        .buckets
                        .iter()
                        .map(|members| evaluate(&chart.y, members))
                        .collect(),
                })
                .collect();

            Ok(ChartResult {
                scores: scores.map(|s| scores_for(buckets.keys(), &s)),
                labels: buckets.keys().to_vec(),
                series,
            })
        }
    }
}

struct Entry {
    label: String,
    value: Option<f64>,
}

fn unsplit(
    buckets: &OrderedBuckets<Row<'_>>,
    y: &YSpec,
    order: Option<SortOrder>,
    cap: Option<usize>,
    scores: Option<&HashMap<String, f64>>,
) -> ChartResult {
    let mut entries: Vec<Entry> = buckets
        .iter()
        .map(|(label, members)| Entry {
            label: label.to_string(),
            value: metric::evaluate(y.agg, members.len(), &y_values(members, y)),
        })
        .collect();

    if let Some(order) = order {
        entries.sort_by(|a, b| compare_metric(a.value, b.value, order));
    }
    if let Some(n) = cap {
        entries.truncate(n);
    }

    let labels: Vec<String> = entries.iter().map(|e| e.label.clone()).collect();
    ChartResult {
        scores: scores.map(|s| scores_for(&labels, s)),
        series: vec![Series {
            label: None,
            data: entries
                .into_iter()
                .map(|e| e.value.map_or(Value::Null, metric::number_value))
                .collect(),
        }],
        labels,
    }
}

fn scores_for(labels: &[String], scores: &HashMap<String, f64>) -> Vec<f64> {
    labels
        .iter()
        .map(|label| scores.get(label).copied().unwrap_or(0.0))
        .collect()
}

fn evaluate(y: &YSpec, members: &[Row<'_>]) -> Value {
    metric::evaluate(y.agg, members.len(), &y_values(members, y))
        .map_or(Value::Null, metric::number_value)
}

/// Parseable Y values of a bucket's members
fn y_values(members: &[Row<'_>], y: &YSpec) -> Vec<f64> {
    let Some(field) = y.field.as_deref() else {
        return Vec::new();
    };
    members
        .iter()
        .filter_map(|row| row.record.field(field).and_then(as_number))
        .collect()
}

/// Missing values sort last in either direction
fn compare_metric(a: Option<f64>, b: Option<f64>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => order.apply(a.partial_cmp(&b).unwrap_or(Ordering::Equal)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Resolve X, drop records without a scalar X, and stable-sort by X
pub(crate) fn prepare<'a>(records: &[&'a StoredEvent], field: &str) -> Vec<Row<'a>> {
    let mut rows: Vec<Row<'a>> = records
        .iter()
        .filter_map(|&record| {
            record
                .field(field)
                .filter(|x| !x.is_null() && index_key(x).is_some())
                .map(|x| Row { record, x })
        })
        .collect();
    rows.sort_by(|a, b| compare_values(a.x, b.x));
    rows
}

/// Total order over scalars: null < bool < number < string
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => rank(a).cmp(&rank(b)),
    }
}
