//! Query Executor
//!
//! Executes a decoded [`Query`] against the engine:
//!
//! 1. Take the collection's read lock
//! 2. Filter through the field index (window + criteria)
//! 3. List: order, page and return records; Chart: aggregate
//!
//! # Execution Pipeline
//!
//! ```text
//! Query → read lock → Filter → ┬─ list:  order → cursor → limit → {results, total}
//!                              └─ chart: [background filter] → aggregate → chart
//! ```
//!
//! The read guard is held until the output is built, so the background set of
//! a significant-terms chart comes from the same snapshot as the foreground.

use crate::aggregation::{self, compare_values, ChartResult};
use crate::query::ast::{ChartSpec, Criterion, ListOptions, Query, QueryKind, TimeWindow};
use crate::query::error::{QueryError, QueryResult};
use crate::query::filter::Filter;
use crate::storage::{Engine, StoredEvent};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// A page of raw records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListResult {
    /// Records of the page, `id` included
    pub results: Vec<Value>,
    /// Number of records matching the filter, before paging
    pub total: usize,
}

/// Output of any query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    List(ListResult),
    Chart(ChartResult),
}

/// Query executor
pub struct QueryExecutor {
    engine: Arc<Engine>,
}

impl QueryExecutor {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Execute a decoded query
    pub async fn execute(&self, query: Query) -> QueryResult<QueryOutput> {
        let start = Instant::now();
        let (kind, output) = match &query.kind {
            QueryKind::List(options) => {
                let list = self
                    .list(&query.collection, &query.window, &query.criteria, options)
                    .await?;
                ("list", QueryOutput::List(list))
            }
            QueryKind::Chart(chart) => {
                let chart = self
                    .chart(&query.collection, &query.window, &query.criteria, chart)
                    .await?;
                ("chart", QueryOutput::Chart(chart))
            }
        };

        tracing::debug!(
            collection = %query.collection,
            kind,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Executed query"
        );
        Ok(output)
    }

    /// Filtered records, paged
    ///
    /// `total` counts every match. With `order_by` the matches are stably
    /// sorted on that field first. A `from_record` cursor starts the page at
    /// that record; an unknown cursor leaves the set untouched.
    pub async fn list(
        &self,
        collection: &str,
        window: &TimeWindow,
        criteria: &[Criterion],
        options: &ListOptions,
    ) -> QueryResult<ListResult> {
        let guard = self.engine.read(collection).await?;
        let mut records = Filter::new(&guard).records(Some(window), criteria);
        let total = records.len();

        if let Some(field) = options.order_by.as_deref() {
            records.sort_by(|a, b| options.order.apply(compare_field(a, b, field)));
        }

        let start = match options.from_record.as_deref() {
            Some(cursor) => match records.iter().position(|r| r.id == cursor) {
                Some(index) => index,
                None => {
                    tracing::debug!(cursor, "Cursor not found, paging from the start");
                    0
                }
            },
            None => 0,
        };

        let results = records
            .into_iter()
            .skip(start)
            .take(options.limit)
            .map(|r| r.event.clone())
            .collect();

        Ok(ListResult { results, total })
    }

    /// Filtered records, aggregated into a chart
    pub async fn chart(
        &self,
        collection: &str,
        window: &TimeWindow,
        criteria: &[Criterion],
        chart: &ChartSpec,
    ) -> QueryResult<ChartResult> {
        if !chart.y.agg.is_supported() {
            return Err(QueryError::UnsupportedAggregation(chart.y.agg.to_string()));
        }

        let guard = self.engine.read(collection).await?;
        let filter = Filter::new(&guard);
        let records = filter.records(Some(window), criteria);
        let background = if aggregation::needs_background(chart) {
            filter.records(None, criteria)
        } else {
            Vec::new()
        };

        aggregation::aggregate(&records, chart, window, &background)
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

/// Missing values sort as `null`
fn compare_field(a: &StoredEvent, b: &StoredEvent, field: &str) -> std::cmp::Ordering {
    let null = Value::Null;
    compare_values(
        a.field(field).unwrap_or(&null),
        b.field(field).unwrap_or(&null),
    )
}
