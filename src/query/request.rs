//! Query Request Decoder
//!
//! Decodes a JSON query body into a typed [`Query`]. Shape errors (unknown
//! keys, wrong JSON types) come from serde; everything else is checked here
//! and reported per path, all issues at once.
//!
//! # Grammar
//!
//! ```text
//! collection  string, required
//! type        "list" | "chart"
//! from, to    ISO-8601 date, required
//! where       [{field, op, value?, values?}]
//! limit, fromRecord, orderBy, order        list only
//! x, y                                     chart only, required
//! ```

use crate::aggregation::Granularity;
use crate::query::ast::{
    Bucketing, ChartSpec, Criterion, Interval, ListOptions, Operator, Query, QueryKind,
    SortOrder, SplitMode, SplitSpec, TermOrderBy, TimeWindow, XSpec, YAggregation, YSpec,
};
use crate::schema::{ValidationError, ValidationIssue};
use crate::storage::{as_number, index_key, parse_timestamp};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Default page size of a list query
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Raw query body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryRequest {
    pub collection: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(rename = "where")]
    pub criteria: Option<Vec<CriterionRequest>>,
    #[serde(default, deserialize_with = "present")]
    pub limit: Option<Value>,
    pub from_record: Option<String>,
    pub order_by: Option<String>,
    pub order: Option<String>,
    pub x: Option<XRequest>,
    pub y: Option<YRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CriterionRequest {
    pub field: Option<String>,
    pub op: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct XRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub field: Option<String>,
    pub placeholders: Option<Vec<String>>,
    pub interval: Option<String>,
    pub minimum_interval: Option<f64>,
    pub size: Option<f64>,
    pub order: Option<String>,
    pub split: Option<SplitRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SplitRequest {
    pub agg: Option<String>,
    pub field: Option<String>,
    pub order_by: Option<String>,
    pub order: Option<String>,
    pub size: Option<f64>,
    pub value: Option<f64>,
    pub minimum_interval: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct YRequest {
    pub agg: Option<String>,
    pub field: Option<String>,
}

/// Keep an explicit `null` as `Some(Value::Null)`
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

const BUCKETINGS: [&str; 5] = [
    "histogram",
    "terms",
    "significantTerms",
    "thresholdTerms",
    "dateHistogram",
];

const SPLITS: [&str; 5] = ["terms", "eitherSideOfNumber", "boolean", "exists", "histogram"];

/// Decode a JSON body into a query
pub fn decode(body: Value, default_limit: usize) -> Result<Query, ValidationError> {
    let request: QueryRequest =
        serde_json::from_value(body).map_err(|e| ValidationError::single("", e.to_string()))?;
    request.into_query(default_limit)
}

/// Issue collector
#[derive(Default)]
struct Issues(Vec<ValidationIssue>);

impl Issues {
    fn push(&mut self, path: &str, message: String) {
        self.0.push(ValidationIssue::new(path, message));
    }

    fn required<T>(&mut self, value: Option<T>, path: &str) -> Option<T> {
        if value.is_none() {
            self.push(path, format!("\"{}\" is required", path));
        }
        value
    }

    fn forbidden<T>(&mut self, value: &Option<T>, path: &str) {
        if value.is_some() {
            self.push(path, format!("\"{}\" is not allowed", path));
        }
    }

    fn one_of<'a>(
        &mut self,
        value: Option<&'a str>,
        allowed: &[&str],
        path: &str,
    ) -> Option<&'a str> {
        let value = self.required(value, path)?;
        if allowed.contains(&value) {
            Some(value)
        } else {
            self.push(
                path,
                format!("\"{}\" must be one of [{}]", path, allowed.join(", ")),
            );
            None
        }
    }

    fn date(&mut self, value: Option<&str>, path: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        let raw = self.required(value, path)?;
        let parsed = parse_timestamp(raw);
        if parsed.is_none() {
            self.push(path, format!("\"{}\" must be a valid ISO 8601 date", path));
        }
        parsed
    }

    fn order(&mut self, value: Option<&str>, path: &str) -> Option<SortOrder> {
        let raw = value?;
        let order = SortOrder::from_name(raw);
        if order.is_none() {
            self.push(path, format!("\"{}\" must be one of [asc, desc]", path));
        }
        order
    }

    /// A positive interval
    fn interval(&mut self, value: Option<f64>, path: &str) -> Option<f64> {
        let n = self.required(value, path)?;
        if n > 0.0 && n.is_finite() {
            Some(n)
        } else {
            self.push(path, format!("\"{}\" must be greater than 0", path));
            None
        }
    }

    /// A whole count of at least `min`
    fn count(&mut self, value: Option<f64>, min: usize, path: &str) -> Option<usize> {
        let n = value?;
        if n.is_finite() && n >= min as f64 {
            Some(n.floor() as usize)
        } else {
            self.push(
                path,
                format!("\"{}\" must be larger than or equal to {}", path, min),
            );
            None
        }
    }

    fn finish<T>(self, value: Option<T>) -> Result<T, ValidationError> {
        match value {
            Some(value) if self.0.is_empty() => Ok(value),
            _ if self.0.is_empty() => Err(ValidationError::single("", "invalid query")),
            _ => Err(ValidationError::new(self.0)),
        }
    }
}

impl QueryRequest {
    /// Check every rule and build the typed query
    pub fn into_query(self, default_limit: usize) -> Result<Query, ValidationError> {
        let mut issues = Issues::default();

        let collection = issues.required(self.collection.clone(), "collection");
        let kind = issues.one_of(self.kind.as_deref(), &["list", "chart"], "type");
        let from = issues.date(self.from.as_deref(), "from");
        let to = issues.date(self.to.as_deref(), "to");

        let criteria: Vec<Option<Criterion>> = self
            .criteria
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, c)| c.decode(&format!("where.{}", i), &mut issues))
            .collect();

        let kind = match kind {
            Some("list") => self.list_options(default_limit, &mut issues).map(QueryKind::List),
            Some(_) => self.chart_spec(&mut issues).map(QueryKind::Chart),
            None => None,
        };

        let query = match (collection, from, to, kind) {
            (Some(collection), Some(from), Some(to), Some(kind)) => Some(Query {
                collection,
                window: TimeWindow::new(from, to),
                criteria: criteria.into_iter().flatten().collect(),
                kind,
            }),
            _ => None,
        };
        issues.finish(query)
    }

    fn list_options(&self, default_limit: usize, issues: &mut Issues) -> Option<ListOptions> {
        issues.forbidden(&self.x, "x");
        issues.forbidden(&self.y, "y");

        let limit = match &self.limit {
            None => Some(default_limit),
            Some(raw) => match as_number(raw) {
                Some(n) => issues.count(Some(n), 1, "limit"),
                None => {
                    issues.push("limit", "\"limit\" must be a number".to_string());
                    None
                }
            },
        };
        let order = issues.order(self.order.as_deref(), "order");

        Some(ListOptions {
            limit: limit?,
            from_record: self.from_record.clone(),
            order_by: self.order_by.clone(),
            order: order.unwrap_or_default(),
        })
    }

    fn chart_spec(&self, issues: &mut Issues) -> Option<ChartSpec> {
        issues.forbidden(&self.limit, "limit");
        issues.forbidden(&self.from_record, "fromRecord");
        issues.forbidden(&self.order_by, "orderBy");
        issues.forbidden(&self.order, "order");

        let x = issues
            .required(self.x.as_ref(), "x")
            .and_then(|x| x.decode(issues));
        let y = issues
            .required(self.y.as_ref(), "y")
            .and_then(|y| y.decode(issues));

        Some(ChartSpec { x: x?, y: y? })
    }
}

impl CriterionRequest {
    fn decode(&self, prefix: &str, issues: &mut Issues) -> Option<Criterion> {
        let path = |key: &str| format!("{}.{}", prefix, key);

        let field = issues.required(self.field.clone(), &path("field"));
        let op = issues.one_of(self.op.as_deref(), &Operator::NAMES, &path("op"))?;

        let value_path = path("value");
        let values_path = path("values");

        let op = match op {
            "is" | "is not" => {
                issues.forbidden(&self.values, &values_path);
                let value = issues.required(self.value.as_ref(), &value_path)?;
                let key = scalar_key(value, &value_path, issues)?;
                if op == "is" {
                    Operator::Is(key)
                } else {
                    Operator::IsNot(key)
                }
            }
            "is less than" | "is greater than" => {
                issues.forbidden(&self.values, &values_path);
                let value = issues.required(self.value.as_ref(), &value_path)?;
                let bound = number(value, &value_path, issues)?;
                if op == "is less than" {
                    Operator::IsLessThan(bound)
                } else {
                    Operator::IsGreaterThan(bound)
                }
            }
            "is one of" | "is not one of" => {
                issues.forbidden(&self.value, &value_path);
                let values = issues.required(self.values.as_ref(), &values_path)?;
                if values.len() < 2 {
                    issues.push(
                        &values_path,
                        format!("\"{}\" must contain at least 2 items", values_path),
                    );
                    return None;
                }
                let keys: Vec<Option<String>> = values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| scalar_key(v, &format!("{}.{}", values_path, i), issues))
                    .collect();
                let keys: Option<Vec<String>> = keys.into_iter().collect();
                if op == "is one of" {
                    Operator::IsOneOf(keys?)
                } else {
                    Operator::IsNotOneOf(keys?)
                }
            }
            "is between" | "is not between" => {
                issues.forbidden(&self.value, &value_path);
                let values = issues.required(self.values.as_ref(), &values_path)?;
                if values.len() != 2 {
                    issues.push(
                        &values_path,
                        format!("\"{}\" must contain exactly 2 numbers", values_path),
                    );
                    return None;
                }
                let low = number(&values[0], &format!("{}.0", values_path), issues);
                let high = number(&values[1], &format!("{}.1", values_path), issues);
                if op == "is between" {
                    Operator::IsBetween(low?, high?)
                } else {
                    Operator::IsNotBetween(low?, high?)
                }
            }
            "exists" | "does not exist" => {
                issues.forbidden(&self.value, &value_path);
                issues.forbidden(&self.values, &values_path);
                if op == "exists" {
                    Operator::Exists
                } else {
                    Operator::DoesNotExist
                }
            }
            _ => return None,
        };

        Some(Criterion::new(field?, op))
    }
}

fn scalar_key(value: &Value, path: &str, issues: &mut Issues) -> Option<String> {
    match value {
        Value::Object(_) | Value::Array(_) => {
            issues.push(path, format!("\"{}\" must be a string, number or boolean", path));
            None
        }
        scalar => index_key(scalar),
    }
}

fn number(value: &Value, path: &str, issues: &mut Issues) -> Option<f64> {
    let n = as_number(value);
    if n.is_none() {
        issues.push(path, format!("\"{}\" must be a number", path));
    }
    n
}

impl XRequest {
    fn decode(&self, issues: &mut Issues) -> Option<XSpec> {
        let field = issues.required(self.field.clone(), "x.field");
        let kind = issues.one_of(self.kind.as_deref(), &BUCKETINGS, "x.type");

        if kind != Some("histogram") {
            issues.forbidden(&self.minimum_interval, "x.minimumInterval");
        }
        if kind != Some("dateHistogram") {
            issues.forbidden(&self.interval, "x.interval");
        }
        if kind != Some("terms") {
            issues.forbidden(&self.placeholders, "x.placeholders");
        }
        let terms_like = matches!(kind, Some("terms" | "significantTerms" | "thresholdTerms"));
        if !terms_like {
            issues.forbidden(&self.size, "x.size");
            issues.forbidden(&self.order, "x.order");
        }

        let bucketing = match kind? {
            "histogram" => Bucketing::Histogram {
                minimum_interval: issues.interval(self.minimum_interval, "x.minimumInterval")?,
            },
            "terms" => Bucketing::Terms {
                placeholders: self.placeholders.clone().unwrap_or_default(),
                size: issues.count(self.size, 1, "x.size"),
            },
            "significantTerms" => Bucketing::SignificantTerms {
                size: issues.count(self.size, 1, "x.size"),
            },
            "thresholdTerms" => {
                let size = issues.required(self.size, "x.size");
                Bucketing::ThresholdTerms {
                    size: issues.count(size, 1, "x.size")?,
                }
            }
            "dateHistogram" => {
                let interval = match self.interval.as_deref() {
                    None => Interval::Auto,
                    Some(raw) => match Interval::from_name(raw) {
                        Some(interval) => interval,
                        None => {
                            let mut allowed = vec!["auto".to_string()];
                            allowed.extend(Granularity::ALL.iter().map(|g| g.to_string()));
                            issues.push(
                                "x.interval",
                                format!("\"x.interval\" must be one of [{}]", allowed.join(", ")),
                            );
                            return None;
                        }
                    },
                };
                Bucketing::DateHistogram { interval }
            }
            _ => return None,
        };

        let order = issues.order(self.order.as_deref(), "x.order");
        let split = match &self.split {
            Some(split) => Some(split.decode(issues)?),
            None => None,
        };

        Some(XSpec {
            field: field?,
            bucketing,
            order,
            split,
        })
    }
}

impl SplitRequest {
    fn decode(&self, issues: &mut Issues) -> Option<SplitSpec> {
        let field = issues.required(self.field.clone(), "x.split.field");
        let agg = issues.one_of(self.agg.as_deref(), &SPLITS, "x.split.agg");

        if agg != Some("terms") {
            issues.forbidden(&self.order_by, "x.split.orderBy");
            issues.forbidden(&self.order, "x.split.order");
            issues.forbidden(&self.size, "x.split.size");
        }
        if agg != Some("eitherSideOfNumber") {
            issues.forbidden(&self.value, "x.split.value");
        }
        if agg != Some("histogram") {
            issues.forbidden(&self.minimum_interval, "x.split.minimumInterval");
        }

        let mode = match agg? {
            "terms" => {
                let order_by = match self.order_by.as_deref() {
                    None => None,
                    Some(raw) => {
                        let parsed = TermOrderBy::from_name(raw);
                        if parsed.is_none() {
                            issues.push(
                                "x.split.orderBy",
                                "\"x.split.orderBy\" must be one of [_count, _term]".to_string(),
                            );
                        }
                        Some(parsed?)
                    }
                };
                SplitMode::Terms {
                    size: issues.count(self.size, 0, "x.split.size"),
                    order_by,
                    order: issues
                        .order(self.order.as_deref(), "x.split.order")
                        .unwrap_or(SortOrder::Desc),
                }
            }
            "eitherSideOfNumber" => SplitMode::EitherSideOfNumber {
                value: issues.required(self.value, "x.split.value")?,
            },
            "boolean" => SplitMode::Boolean,
            "exists" => SplitMode::Exists,
            "histogram" => SplitMode::Histogram {
                minimum_interval: issues
                    .interval(self.minimum_interval, "x.split.minimumInterval")?,
            },
            _ => return None,
        };

        Some(SplitSpec::new(field?, mode))
    }
}

impl YRequest {
    fn decode(&self, issues: &mut Issues) -> Option<YSpec> {
        let agg = issues
            .one_of(self.agg.as_deref(), &YAggregation::NAMES, "y.agg")
            .and_then(YAggregation::from_name)?;

        if agg == YAggregation::Count {
            issues.forbidden(&self.field, "y.field");
            Some(YSpec::count())
        } else {
            let field = issues.required(self.field.clone(), "y.field")?;
            Some(YSpec::of(agg, field))
        }
    }
}
