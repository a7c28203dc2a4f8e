//! X axis bucketing strategies

use super::{OrderedBuckets, Row};
use crate::aggregation::Granularity;
use crate::query::{Bucketing, Interval, QueryError, QueryResult, TimeWindow, XSpec};
use crate::storage::{as_number, format_number, format_timestamp, index_key, parse_timestamp};

/// Upper bound on numeric histogram bins
pub const MAX_HISTOGRAM_BUCKETS: u64 = 100_000;

/// Build the X buckets for already prepared (sorted, X-defined) rows
pub(crate) fn build<'a>(
    rows: &[Row<'a>],
    x: &XSpec,
    window: &TimeWindow,
) -> QueryResult<OrderedBuckets<Row<'a>>> {
    match &x.bucketing {
        Bucketing::Histogram { minimum_interval } => histogram(rows, *minimum_interval),
        Bucketing::Terms { placeholders, .. } => Ok(terms(rows, placeholders)),
        Bucketing::SignificantTerms { .. } => Ok(terms(rows, &[])),
        Bucketing::ThresholdTerms { size } => {
            let mut buckets = terms(rows, &[]);
            buckets.retain(|_, members| members.len() >= *size);
            Ok(buckets)
        }
        Bucketing::DateHistogram { interval } => date_histogram(rows, *interval, window),
    }
}

fn terms<'a>(rows: &[Row<'a>], placeholders: &[String]) -> OrderedBuckets<Row<'a>> {
    let mut buckets = OrderedBuckets::new();
    for placeholder in placeholders {
        buckets.ensure(placeholder);
    }
    for row in rows {
        if let Some(key) = index_key(row.x) {
            buckets.push(&key, *row);
        }
    }
    buckets
}

fn histogram<'a>(rows: &[Row<'a>], step: f64) -> QueryResult<OrderedBuckets<Row<'a>>> {
    let numeric: Vec<(f64, Row<'a>)> = rows
        .iter()
        .filter_map(|row| as_number(row.x).map(|v| (v, *row)))
        .collect();

    let mut buckets = OrderedBuckets::new();
    let Some(bins) = Bins::over(numeric.iter().map(|(v, _)| *v), step)? else {
        return Ok(buckets);
    };

    let labels = bins.labels();
    for label in &labels {
        buckets.ensure(label);
    }
    for (value, row) in numeric {
        buckets.push(&labels[bins.index_of(value)], row);
    }
    Ok(buckets)
}

fn date_histogram<'a>(
    rows: &[Row<'a>],
    interval: Interval,
    window: &TimeWindow,
) -> QueryResult<OrderedBuckets<Row<'a>>> {
    let granularity = match interval {
        Interval::Auto => Granularity::auto(window.from, window.to)?,
        Interval::Fixed(granularity) => {
            granularity.check_span(window.from, window.to)?;
            granularity
        }
    };

    let mut buckets = OrderedBuckets::new();
    for start in granularity.bucket_starts(window.from, window.to) {
        buckets.ensure(&format_timestamp(start));
    }

    for row in rows {
        let Some(when) = row.x.as_str().and_then(parse_timestamp) else {
            continue;
        };
        let key = format_timestamp(granularity.truncate(when));
        if let Some(members) = buckets.get_mut(&key) {
            members.push(*row);
        }
    }

    tracing::debug!(%granularity, buckets = buckets.len(), "Date histogram buckets");
    Ok(buckets)
}

/// Fixed-width numeric bins from the smallest value up to the largest
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Bins {
    min: f64,
    step: f64,
    count: usize,
}

impl Bins {
    /// Bins covering `values`; `None` when there are no values
    pub(crate) fn over(values: impl Iterator<Item = f64>, step: f64) -> QueryResult<Option<Self>> {
        let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if min > max {
            return Ok(None);
        }

        let requested = ((max - min) / step).floor() + 1.0;
        if !requested.is_finite() || requested > MAX_HISTOGRAM_BUCKETS as f64 {
            return Err(QueryError::TooManyBuckets {
                requested: if requested.is_finite() { requested as u64 } else { u64::MAX },
                limit: MAX_HISTOGRAM_BUCKETS,
            });
        }

        Ok(Some(Self {
            min,
            step,
            count: requested as usize,
        }))
    }

    pub(crate) fn lower_bound(&self, k: usize) -> f64 {
        self.min + k as f64 * self.step
    }

    /// The greatest bin whose lower bound is not above `value`
    pub(crate) fn index_of(&self, value: f64) -> usize {
        let last = self.count - 1;
        let mut k = (((value - self.min) / self.step).floor().max(0.0) as usize).min(last);
        while k > 0 && value < self.lower_bound(k) {
            k -= 1;
        }
        while k < last && value >= self.lower_bound(k + 1) {
            k += 1;
        }
        k
    }

    pub(crate) fn labels(&self) -> Vec<String> {
        (0..self.count)
            .map(|k| format_number(self.lower_bound(k)))
            .collect()
    }
}
