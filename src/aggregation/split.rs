//! Split series
//!
//! Partitions every X bucket's members along a second field. Each series
//! holds one member list per X bucket, in X bucket order.

use super::bucket::Bins;
use super::{OrderedBuckets, Row};
use crate::query::{QueryResult, SplitMode, SplitSpec, TermOrderBy};
use crate::storage::{as_number, format_number, index_key};
use serde_json::Value;
use std::collections::HashMap;

pub(crate) struct SplitSeries<'a> {
    pub label: String,
    /// Parallel to the X buckets
    pub buckets: Vec<Vec<Row<'a>>>,
}

enum Classifier {
    Terms(HashMap<String, usize>),
    EitherSide(f64),
    Boolean,
    Exists,
    Histogram(Bins),
}

impl Classifier {
    /// Series index for a split value; `None` drops the member
    fn classify(&self, value: Option<&Value>) -> Option<usize> {
        match self {
            Self::Terms(lookup) => {
                let key = value.filter(|v| !v.is_null()).and_then(index_key)?;
                lookup.get(&key).copied()
            }
            Self::EitherSide(threshold) => {
                let n = value.and_then(as_number)?;
                Some(if n <= *threshold { 0 } else { 1 })
            }
            Self::Boolean => match value {
                Some(Value::Bool(true)) => Some(0),
                Some(Value::Bool(false)) => Some(1),
                _ => None,
            },
            Self::Exists => match value {
                Some(v) if !v.is_null() => Some(0),
                _ => Some(1),
            },
            Self::Histogram(bins) => value.and_then(as_number).map(|n| bins.index_of(n)),
        }
    }
}

pub(crate) fn partition<'a>(
    buckets: &OrderedBuckets<Row<'a>>,
    spec: &SplitSpec,
) -> QueryResult<Vec<SplitSeries<'a>>> {
    let field = spec.field.as_str();
    let split_value = |row: &Row<'a>| row.record.field(field);
    let all_rows = || buckets.iter().flat_map(|(_, members)| members.iter());

    let (labels, classifier) = match &spec.mode {
        SplitMode::Terms {
            size,
            order_by,
            order,
        } => {
            let mut seen: OrderedBuckets<()> = OrderedBuckets::new();
            for row in all_rows() {
                if let Some(key) = split_value(row).filter(|v| !v.is_null()).and_then(index_key) {
                    seen.push(&key, ());
                }
            }

            let mut terms: Vec<(String, usize)> = seen
                .iter()
                .map(|(key, members)| (key.to_string(), members.len()))
                .collect();
            match order_by {
                Some(TermOrderBy::Count) => terms.sort_by(|a, b| order.apply(a.1.cmp(&b.1))),
                Some(TermOrderBy::Term) => terms.sort_by(|a, b| order.apply(a.0.cmp(&b.0))),
                None => {}
            }
            if let Some(n) = size {
                terms.truncate(*n);
            }

            let labels: Vec<String> = terms.into_iter().map(|(key, _)| key).collect();
            let lookup = labels
                .iter()
                .enumerate()
                .map(|(i, key)| (key.clone(), i))
                .collect();
            (labels, Classifier::Terms(lookup))
        }
        SplitMode::EitherSideOfNumber { value } => {
            let bound = format_number(*value);
            (
                vec![format!("<= {}", bound), format!("> {}", bound)],
                Classifier::EitherSide(*value),
            )
        }
        SplitMode::Boolean => (
            vec!["True".to_string(), "False".to_string()],
            Classifier::Boolean,
        ),
        SplitMode::Exists => (
            vec!["Exists".to_string(), "Doesn't exist".to_string()],
            Classifier::Exists,
        ),
        SplitMode::Histogram { minimum_interval } => {
            let values = all_rows().filter_map(|row| split_value(row).and_then(as_number));
            match Bins::over(values, *minimum_interval)? {
                Some(bins) => (bins.labels(), Classifier::Histogram(bins)),
                None => (Vec::new(), Classifier::Terms(HashMap::new())),
            }
        }
    };

    let mut series: Vec<SplitSeries<'a>> = labels
        .into_iter()
        .map(|label| SplitSeries {
            label,
            buckets: vec![Vec::new(); buckets.len()],
        })
        .collect();

    for (b, (_, members)) in buckets.iter().enumerate() {
        for row in members {
            if let Some(s) = classifier.classify(split_value(row)) {
                if let Some(target) = series.get_mut(s) {
                    target.buckets[b].push(*row);
                }
            }
        }
    }

    Ok(series)
}
