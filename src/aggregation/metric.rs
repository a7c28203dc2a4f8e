//! Y aggregations
//!
//! `count`, `sum` and `uniqueCount` are defined on an empty bucket (zero);
//! `average`, `min`, `max` and `median` have no data there and yield `None`.

use crate::query::YAggregation;
use serde_json::{Number, Value};
use std::collections::HashSet;

/// Evaluate an aggregation over one bucket
///
/// `members` is the bucket size; `values` are the members' Y values that
/// parsed as numbers.
pub fn evaluate(agg: YAggregation, members: usize, values: &[f64]) -> Option<f64> {
    match agg {
        YAggregation::Count => Some(members as f64),
        YAggregation::Sum => Some(values.iter().sum()),
        YAggregation::UniqueCount => Some(unique_count(values) as f64),
        YAggregation::Average => {
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        YAggregation::Min => values.iter().copied().reduce(f64::min),
        YAggregation::Max => values.iter().copied().reduce(f64::max),
        YAggregation::Median => median(values),
        YAggregation::PercentileRanks
        | YAggregation::Percentiles
        | YAggregation::StandardDeviation
        | YAggregation::TopHit => None,
    }
}

/// Mean of the lower-middle and upper-middle values
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let low = (sorted.len() - 1) / 2;
    let high = sorted.len() / 2;
    Some((sorted[low] + sorted[high]) / 2.0)
}

fn unique_count(values: &[f64]) -> usize {
    // +0.0 folds -0.0 into 0.0
    values
        .iter()
        .map(|v| (v + 0.0).to_bits())
        .collect::<HashSet<u64>>()
        .len()
}

/// JSON form of a metric: integral values become integers
pub fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}
