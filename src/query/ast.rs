//! Query Abstract Syntax Tree
//!
//! Typed form of a decoded list or chart request. Requests arrive as JSON
//! (see [`crate::query::request`]) and are turned into these values before
//! anything touches the store.
//!
//! # Example Requests
//!
//! ```text
//! {"collection": "events", "type": "list", "from": "...", "to": "...", "limit": 10}
//! {"collection": "events", "type": "chart", "from": "...", "to": "...",
//!  "x": {"type": "terms", "field": "event.action"}, "y": {"agg": "count"}}
//! ```

use crate::aggregation::Granularity;
use crate::storage::format_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A decoded query ready for execution
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub window: TimeWindow,
    /// AND-combined where criteria
    pub criteria: Vec<Criterion>,
    pub kind: QueryKind,
}

/// What to do with the filtered records
#[derive(Debug, Clone, PartialEq)]
pub enum QueryKind {
    List(ListOptions),
    Chart(ChartSpec),
}

/// Inclusive time window over a collection's timestamp field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Lower bound as a canonical index key
    pub fn from_key(&self) -> String {
        format_timestamp(self.from)
    }

    /// Upper bound as a canonical index key
    pub fn to_key(&self) -> String {
        format_timestamp(self.to)
    }
}

/// Ascending or descending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    /// Apply this order to an ascending comparison
    pub fn apply(&self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

/// Options of a list query
#[derive(Debug, Clone, PartialEq)]
pub struct ListOptions {
    /// Maximum number of records returned
    pub limit: usize,
    /// Id of the record the page starts at
    pub from_record: Option<String>,
    /// Field path to sort by before paging
    pub order_by: Option<String>,
    pub order: SortOrder,
}

impl ListOptions {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            from_record: None,
            order_by: None,
            order: SortOrder::Asc,
        }
    }

    pub fn from_record(mut self, id: impl Into<String>) -> Self {
        self.from_record = Some(id.into());
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some(field.into());
        self.order = order;
        self
    }
}

/// One where criterion
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    /// Flattened field path
    pub field: String,
    pub op: Operator,
}

impl Criterion {
    pub fn new(field: impl Into<String>, op: Operator) -> Self {
        Self {
            field: field.into(),
            op,
        }
    }
}

/// Where operators, with their operands already reduced to index keys
/// or numbers
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Is(String),
    IsNot(String),
    IsOneOf(Vec<String>),
    IsNotOneOf(Vec<String>),
    IsBetween(f64, f64),
    IsNotBetween(f64, f64),
    Exists,
    DoesNotExist,
    IsLessThan(f64),
    IsGreaterThan(f64),
}

impl Operator {
    /// Operator names as they appear in requests
    pub const NAMES: [&'static str; 10] = [
        "is",
        "is not",
        "is one of",
        "is not one of",
        "is between",
        "is not between",
        "exists",
        "does not exist",
        "is less than",
        "is greater than",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Is(_) => "is",
            Self::IsNot(_) => "is not",
            Self::IsOneOf(_) => "is one of",
            Self::IsNotOneOf(_) => "is not one of",
            Self::IsBetween(..) => "is between",
            Self::IsNotBetween(..) => "is not between",
            Self::Exists => "exists",
            Self::DoesNotExist => "does not exist",
            Self::IsLessThan(_) => "is less than",
            Self::IsGreaterThan(_) => "is greater than",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Chart request: X bucketing plus Y aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub x: XSpec,
    pub y: YSpec,
}

/// X axis: field, bucketing strategy and optional split
#[derive(Debug, Clone, PartialEq)]
pub struct XSpec {
    pub field: String,
    pub bucketing: Bucketing,
    /// Re-sort an unsplit terms-style chart by Y value
    pub order: Option<SortOrder>,
    pub split: Option<SplitSpec>,
}

impl XSpec {
    pub fn new(field: impl Into<String>, bucketing: Bucketing) -> Self {
        Self {
            field: field.into(),
            bucketing,
            order: None,
            split: None,
        }
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn split(mut self, split: SplitSpec) -> Self {
        self.split = Some(split);
        self
    }
}

/// X bucketing strategies
#[derive(Debug, Clone, PartialEq)]
pub enum Bucketing {
    /// Fixed-width numeric bins starting at the smallest value
    Histogram { minimum_interval: f64 },
    /// One bucket per distinct value
    Terms {
        placeholders: Vec<String>,
        size: Option<usize>,
    },
    /// Terms scored against the whole collection
    SignificantTerms { size: Option<usize> },
    /// Terms with fewer than `size` members dropped
    ThresholdTerms { size: usize },
    /// Calendar-aligned buckets across the request window
    DateHistogram { interval: Interval },
}

impl Bucketing {
    pub fn terms() -> Self {
        Self::Terms {
            placeholders: Vec::new(),
            size: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Histogram { .. } => "histogram",
            Self::Terms { .. } => "terms",
            Self::SignificantTerms { .. } => "significantTerms",
            Self::ThresholdTerms { .. } => "thresholdTerms",
            Self::DateHistogram { .. } => "dateHistogram",
        }
    }

    /// Terms-style strategies can be re-sorted by value
    pub fn is_terms_like(&self) -> bool {
        matches!(
            self,
            Self::Terms { .. } | Self::SignificantTerms { .. } | Self::ThresholdTerms { .. }
        )
    }
}

/// Date histogram interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    /// Finest granularity the window allows
    Auto,
    Fixed(Granularity),
}

impl Interval {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            other => Granularity::from_name(other).map(Self::Fixed),
        }
    }
}

/// Secondary dimension splitting each X bucket into series
#[derive(Debug, Clone, PartialEq)]
pub struct SplitSpec {
    pub field: String,
    pub mode: SplitMode,
}

impl SplitSpec {
    pub fn new(field: impl Into<String>, mode: SplitMode) -> Self {
        Self {
            field: field.into(),
            mode,
        }
    }
}

/// Split strategies
#[derive(Debug, Clone, PartialEq)]
pub enum SplitMode {
    /// One series per distinct value
    Terms {
        size: Option<usize>,
        order_by: Option<TermOrderBy>,
        order: SortOrder,
    },
    /// `<= value` and `> value`
    EitherSideOfNumber { value: f64 },
    /// `True` and `False`
    Boolean,
    /// `Exists` and `Doesn't exist`
    Exists,
    /// One series per fixed-width bin of the split field
    Histogram { minimum_interval: f64 },
}

impl SplitMode {
    pub fn terms() -> Self {
        Self::Terms {
            size: None,
            order_by: None,
            order: SortOrder::Desc,
        }
    }
}

/// Series ordering for a terms split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermOrderBy {
    /// Total members of the series
    Count,
    /// Series label
    Term,
}

impl TermOrderBy {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "_count" => Some(Self::Count),
            "_term" => Some(Self::Term),
            _ => None,
        }
    }
}

/// Y axis: aggregation and the field it reads
#[derive(Debug, Clone, PartialEq)]
pub struct YSpec {
    pub agg: YAggregation,
    /// Absent for `count`
    pub field: Option<String>,
}

impl YSpec {
    pub fn count() -> Self {
        Self {
            agg: YAggregation::Count,
            field: None,
        }
    }

    pub fn of(agg: YAggregation, field: impl Into<String>) -> Self {
        Self {
            agg,
            field: Some(field.into()),
        }
    }
}

/// Y aggregations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum YAggregation {
    Average,
    Count,
    Max,
    Median,
    Min,
    PercentileRanks,
    Percentiles,
    StandardDeviation,
    Sum,
    TopHit,
    UniqueCount,
}

impl YAggregation {
    pub const NAMES: [&'static str; 11] = [
        "average",
        "count",
        "max",
        "median",
        "min",
        "percentileRanks",
        "percentiles",
        "standardDeviation",
        "sum",
        "topHit",
        "uniqueCount",
    ];

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "average" => Some(Self::Average),
            "count" => Some(Self::Count),
            "max" => Some(Self::Max),
            "median" => Some(Self::Median),
            "min" => Some(Self::Min),
            "percentileRanks" => Some(Self::PercentileRanks),
            "percentiles" => Some(Self::Percentiles),
            "standardDeviation" => Some(Self::StandardDeviation),
            "sum" => Some(Self::Sum),
            "topHit" => Some(Self::TopHit),
            "uniqueCount" => Some(Self::UniqueCount),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::Count => "count",
            Self::Max => "max",
            Self::Median => "median",
            Self::Min => "min",
            Self::PercentileRanks => "percentileRanks",
            Self::Percentiles => "percentiles",
            Self::StandardDeviation => "standardDeviation",
            Self::Sum => "sum",
            Self::TopHit => "topHit",
            Self::UniqueCount => "uniqueCount",
        }
    }

    /// Accepted by the decoder but never computed
    pub fn is_supported(&self) -> bool {
        !matches!(
            self,
            Self::PercentileRanks | Self::Percentiles | Self::StandardDeviation | Self::TopHit
        )
    }
}

impl std::fmt::Display for YAggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
