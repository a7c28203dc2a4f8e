//! Core data types for the event store
//!
//! This module defines the fundamental types used throughout the storage layer:
//! - `StoredEvent`: An accepted event with its assigned id and position
//! - `flatten`: Dot-path flattening shared by the indexer and the schema skeleton
//! - `index_key`: Stringification of scalar leaves into index value keys
//! - Timestamp helpers for the canonical ISO-8601 form used in index keys

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 0-based insertion sequence number of a stored event
pub type Position = usize;

/// An event accepted into a collection
///
/// `event` is the full record as persisted, including the assigned `id`
/// field at the top level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredEvent {
    /// Assigned UUID v4
    pub id: String,
    /// Position in the collection's store
    pub position: Position,
    /// The event body, `id` included
    pub event: Value,
}

impl StoredEvent {
    /// Build a stored event from a body, injecting `id` into it
    pub fn new(id: impl Into<String>, position: Position, body: Map<String, Value>) -> Self {
        let id = id.into();
        let mut body = body;
        body.insert("id".to_string(), Value::String(id.clone()));
        Self {
            id,
            position,
            event: Value::Object(body),
        }
    }

    /// Rehydrate from a replayed log line
    ///
    /// Lines written by older builds may lack an `id`; those are given a
    /// fresh one so every stored record stays addressable by cursor.
    pub fn from_log(position: Position, event: Value) -> Option<Self> {
        let mut body = match event {
            Value::Object(map) => map,
            _ => return None,
        };
        let id = match body.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                body.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        Some(Self {
            id,
            position,
            event: Value::Object(body),
        })
    }

    /// Resolve a dotted field path against this event
    pub fn field(&self, path: &str) -> Option<&Value> {
        resolve_path(&self.event, path)
    }

    /// Flattened (path, value key) pairs of this event
    pub fn index_entries(&self) -> Vec<(String, String)> {
        flatten(&self.event)
            .into_iter()
            .filter_map(|(path, leaf)| index_key(leaf).map(|key| (path, key)))
            .collect()
    }
}

/// Flatten a nested JSON value into `(dot.path, leaf)` pairs
///
/// Objects recurse by key, arrays by element index. Scalars and `null` are
/// leaves. Empty objects and arrays contribute nothing.
pub fn flatten(value: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    flatten_into(value, None, &mut out);
    out
}

fn flatten_into<'a>(value: &'a Value, prefix: Option<&str>, out: &mut Vec<(String, &'a Value)>) {
    let join = |segment: &str| match prefix {
        Some(p) => format!("{}.{}", p, segment),
        None => segment.to_string(),
    };

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(child, Some(&join(key)), out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(child, Some(&join(&i.to_string())), out);
            }
        }
        leaf => {
            if let Some(path) = prefix {
                out.push((path.to_string(), leaf));
            }
        }
    }
}

/// Stringify a scalar leaf into its index value key
///
/// Returns `None` for objects and arrays, which are never leaves.
pub fn index_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Number(n) => Some(number_key(n)),
        Value::Object(_) | Value::Array(_) => None,
    }
}

/// Stringify a JSON number: integral values without a fraction, others in
/// shortest round-trip form.
pub fn number_key(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    format_number(n.as_f64().unwrap_or(f64::NAN))
}

/// Stringify a float the way it appears in index keys and chart labels
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else if value.is_finite() && value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Look up a dotted path inside a JSON value
///
/// Array elements are addressed by their numeric index segment.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Mutable counterpart of [`resolve_path`]
pub fn resolve_path_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    })
}

/// Interpret a JSON value as a finite number
///
/// Numbers are taken as-is and numeric strings are parsed; anything else is
/// not a number.
pub fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Parse an ISO-8601 instant or calendar date into UTC
///
/// Accepts RFC 3339 with any offset, a naive date-time (read as UTC), or a
/// bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Canonical `YYYY-MM-DDTHH:MM:SS.mmmZ` form
///
/// Lexicographic order of canonical strings equals chronological order,
/// which is what time-window range walks over the index rely on.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize any accepted ISO-8601 form into the canonical one
pub fn canonical_timestamp(raw: &str) -> Option<String> {
    parse_timestamp(raw).map(format_timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested() {
        let event = json!({
            "event": {"action": "click", "when": "2020-01-01T00:00:00.000Z"},
            "device": {"location": {"geo": {"lat": 51.5}}},
            "tags": ["a", "b"],
            "empty": {},
            "gone": null
        });

        let flat: Vec<(String, String)> = flatten(&event)
            .into_iter()
            .map(|(p, v)| (p, index_key(v).unwrap()))
            .collect();

        assert!(flat.contains(&("event.action".into(), "click".into())));
        assert!(flat.contains(&("device.location.geo.lat".into(), "51.5".into())));
        assert!(flat.contains(&("tags.0".into(), "a".into())));
        assert!(flat.contains(&("tags.1".into(), "b".into())));
        assert!(flat.contains(&("gone".into(), "null".into())));
        assert!(!flat.iter().any(|(p, _)| p.starts_with("empty")));
    }

    #[test]
    fn test_index_key_numbers() {
        assert_eq!(index_key(&json!(5)).unwrap(), "5");
        assert_eq!(index_key(&json!(5.0)).unwrap(), "5");
        assert_eq!(index_key(&json!(5.5)).unwrap(), "5.5");
        assert_eq!(index_key(&json!(-0.25)).unwrap(), "-0.25");
        assert_eq!(index_key(&json!(true)).unwrap(), "true");
        assert!(index_key(&json!({"a": 1})).is_none());
    }

    #[test]
    fn test_resolve_path() {
        let event = json!({"a": {"b": [10, {"c": "x"}]}});
        assert_eq!(resolve_path(&event, "a.b.0"), Some(&json!(10)));
        assert_eq!(resolve_path(&event, "a.b.1.c"), Some(&json!("x")));
        assert!(resolve_path(&event, "a.z").is_none());
        assert!(resolve_path(&event, "a.b.9").is_none());
    }

    #[test]
    fn test_resolve_path_mut() {
        let mut event = json!({"event": {"when": "2020-01-01"}, "list": [1, 2]});
        *resolve_path_mut(&mut event, "event.when").unwrap() = json!("x");
        *resolve_path_mut(&mut event, "list.1").unwrap() = json!(3);

        assert_eq!(event, json!({"event": {"when": "x"}, "list": [1, 3]}));
        assert!(resolve_path_mut(&mut event, "event.when.deeper").is_none());
    }

    #[test]
    fn test_as_number() {
        assert_eq!(as_number(&json!(3)), Some(3.0));
        assert_eq!(as_number(&json!("2.5")), Some(2.5));
        assert_eq!(as_number(&json!("abc")), None);
        assert_eq!(as_number(&json!(true)), None);
        assert_eq!(as_number(&Value::Null), None);
    }

    #[test]
    fn test_canonical_timestamp() {
        assert_eq!(
            canonical_timestamp("2020-01-01").unwrap(),
            "2020-01-01T00:00:00.000Z"
        );
        assert_eq!(
            canonical_timestamp("2020-01-01T02:30:00+02:00").unwrap(),
            "2020-01-01T00:30:00.000Z"
        );
        assert_eq!(
            canonical_timestamp("2020-06-15T10:11:12.5Z").unwrap(),
            "2020-06-15T10:11:12.500Z"
        );
        assert!(canonical_timestamp("not a date").is_none());
    }

    #[test]
    fn test_stored_event_injects_id() {
        let body = json!({"event": {"action": "a"}});
        let stored = StoredEvent::new("abc", 0, body.as_object().unwrap().clone());
        assert_eq!(stored.field("id"), Some(&json!("abc")));
        assert_eq!(stored.field("event.action"), Some(&json!("a")));
    }

    #[test]
    fn test_from_log_keeps_existing_id() {
        let stored = StoredEvent::from_log(3, json!({"id": "xyz", "k": 1})).unwrap();
        assert_eq!(stored.id, "xyz");
        assert_eq!(stored.position, 3);
        assert!(StoredEvent::from_log(0, json!([1, 2])).is_none());
    }
}
