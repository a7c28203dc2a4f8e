//! Insightful Query Engine
//!
//! Answers list and chart queries over a collection:
//!
//! - **AST**: Typed query, criteria and chart specs
//! - **Request**: Decode and validate a JSON query body into the AST
//! - **Filter**: Resolve a time window and criteria through the field index
//! - **Executor**: Run a query under the collection's read lock
//!
//! # Query Body
//!
//! ```text
//! {
//!   "collection": "events",
//!   "type": "chart",
//!   "from": "2020-01-01", "to": "2020-02-01",
//!   "where": [{"field": "event.action", "op": "is one of", "values": ["a", "b"]}],
//!   "x": {"type": "dateHistogram", "field": "event.when", "interval": "day"},
//!   "y": {"agg": "count"}
//! }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use insightful::query::{decode, QueryExecutor, DEFAULT_LIST_LIMIT};
//!
//! let query = decode(body, DEFAULT_LIST_LIMIT)?;
//! let output = executor.execute(query).await?;
//! ```

mod ast;
mod error;
mod executor;
pub mod filter;
pub mod request;

pub use ast::{
    Bucketing, ChartSpec, Criterion, Interval, ListOptions, Operator, Query, QueryKind,
    SortOrder, SplitMode, SplitSpec, TermOrderBy, TimeWindow, XSpec, YAggregation, YSpec,
};
pub use error::{QueryError, QueryResult};
pub use executor::{ListResult, QueryExecutor, QueryOutput};
pub use filter::Filter;
pub use request::{decode, QueryRequest, DEFAULT_LIST_LIMIT};
