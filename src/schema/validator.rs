//! Event Validator
//!
//! Checks a candidate event against a [`Schema`] and returns a normalized
//! copy ready for the store, or every issue found.
//!
//! Normalization:
//! - numeric strings in number fields become numbers
//! - `"true"` / `"false"` in boolean fields become booleans
//! - `isodate` strings become canonical UTC (`YYYY-MM-DDTHH:MM:SS.mmmZ`)

use crate::schema::error::{SchemaResult, ValidationError, ValidationIssue};
use crate::schema::parser::{FieldSpec, FieldType};
use crate::schema::{Schema, SchemaNode};
use crate::storage::canonical_timestamp;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Schema-driven event validator
#[derive(Debug, Clone)]
pub struct Validator {
    schema: Schema,
    email: Regex,
}

impl Validator {
    pub fn new(schema: Schema) -> SchemaResult<Self> {
        Ok(Self {
            schema,
            email: Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")?,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Validate and normalize one event
    pub fn validate(&self, event: &Value) -> Result<Value, ValidationError> {
        let mut issues = Vec::new();

        let normalized = match event {
            Value::Object(map) => {
                Value::Object(self.check_object(self.schema.fields(), map, "", &mut issues))
            }
            _ => {
                issues.push(ValidationIssue::new("", "\"value\" must be an object"));
                Value::Null
            }
        };

        if issues.is_empty() {
            Ok(normalized)
        } else {
            Err(ValidationError::new(issues))
        }
    }

    fn check_object(
        &self,
        fields: &BTreeMap<String, SchemaNode>,
        map: &Map<String, Value>,
        prefix: &str,
        issues: &mut Vec<ValidationIssue>,
    ) -> Map<String, Value> {
        let mut out = Map::new();

        for (key, value) in map {
            let path = join(prefix, key);
            match fields.get(key) {
                None => {
                    let message = format!("\"{}\" is not allowed", path);
                    issues.push(ValidationIssue::new(path, message));
                }
                Some(node) => {
                    if let Some(normalized) = self.check_node(node, value, &path, issues) {
                        out.insert(key.clone(), normalized);
                    }
                }
            }
        }

        for (key, node) in fields {
            if map.contains_key(key) {
                continue;
            }
            let required = match node {
                SchemaNode::Field(spec) => spec.required,
                SchemaNode::Object { required, .. } => *required,
            };
            if required {
                let path = join(prefix, key);
                issues.push(ValidationIssue::new(&path, format!("\"{}\" is required", path)));
            }
        }

        out
    }

    fn check_node(
        &self,
        node: &SchemaNode,
        value: &Value,
        path: &str,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<Value> {
        match (node, value) {
            (SchemaNode::Object { fields, .. }, Value::Object(map)) => {
                Some(Value::Object(self.check_object(fields, map, path, issues)))
            }
            (SchemaNode::Object { .. }, _) => {
                let message = format!("\"{}\" must be an object", path);
                issues.push(ValidationIssue::new(path, message));
                None
            }
            (SchemaNode::Field(spec), value) => match self.check_field(spec, value, path) {
                Ok(normalized) => Some(normalized),
                Err(message) => {
                    issues.push(ValidationIssue::new(path, message));
                    None
                }
            },
        }
    }

    fn check_field(&self, spec: &FieldSpec, value: &Value, path: &str) -> Result<Value, String> {
        if spec.forbidden {
            return Err(format!("\"{}\" is not allowed", path));
        }

        match spec.field_type {
            FieldType::String => self.check_string(spec, value, path),
            FieldType::Number => check_number(spec, value, path),
            FieldType::Boolean => check_boolean(value, path),
        }
    }

    fn check_string(&self, spec: &FieldSpec, value: &Value, path: &str) -> Result<Value, String> {
        let Value::String(s) = value else {
            return Err(format!("\"{}\" must be a string", path));
        };
        if s.is_empty() {
            return Err(format!("\"{}\" is not allowed to be empty", path));
        }

        let len = s.chars().count() as f64;
        if let Some(min) = spec.min {
            if len < min {
                return Err(format!(
                    "\"{}\" length must be at least {} characters long",
                    path, min
                ));
            }
        }
        if let Some(max) = spec.max {
            if len > max {
                return Err(format!(
                    "\"{}\" length must be less than or equal to {} characters long",
                    path, max
                ));
            }
        }

        if spec.email && !self.email.is_match(s) {
            return Err(format!("\"{}\" must be a valid email", path));
        }
        if spec.ip && !is_ip(s) {
            return Err(format!("\"{}\" must be a valid ip address", path));
        }
        if spec.isodate {
            return canonical_timestamp(s)
                .map(Value::String)
                .ok_or_else(|| format!("\"{}\" must be a valid ISO 8601 date", path));
        }

        Ok(Value::String(s.clone()))
    }
}

fn check_number(spec: &FieldSpec, value: &Value, path: &str) -> Result<Value, String> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
    .ok_or_else(|| format!("\"{}\" must be a number", path))?;

    if let Some(min) = spec.min {
        if n < min {
            return Err(format!("\"{}\" must be larger than or equal to {}", path, min));
        }
    }
    if let Some(max) = spec.max {
        if n > max {
            return Err(format!("\"{}\" must be less than or equal to {}", path, max));
        }
    }

    match value {
        Value::Number(original) => Ok(Value::Number(original.clone())),
        _ => to_json_number(n).ok_or_else(|| format!("\"{}\" must be a number", path)),
    }
}

fn to_json_number(n: f64) -> Option<Value> {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Some(Value::Number(Number::from(n as i64)))
    } else {
        Number::from_f64(n).map(Value::Number)
    }
}

fn check_boolean(value: &Value, path: &str) -> Result<Value, String> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
        _ => Err(format!("\"{}\" must be a boolean", path)),
    }
}

/// Plain address or CIDR notation
fn is_ip(s: &str) -> bool {
    match s.split_once('/') {
        Some((addr, prefix)) => match addr.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => prefix.parse::<u8>().map_or(false, |p| p <= 32),
            Ok(IpAddr::V6(_)) => prefix.parse::<u8>().map_or(false, |p| p <= 128),
            Err(_) => false,
        },
        None => s.parse::<IpAddr>().is_ok(),
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> Validator {
        let mut schema = Schema::events().unwrap();
        schema.require("event.when");
        Validator::new(schema).unwrap()
    }

    fn minimal() -> Value {
        json!({"event": {"action": "signup", "when": "2020-01-01T00:00:00Z"}})
    }

    #[test]
    fn test_accepts_and_normalizes_date() {
        let out = validator().validate(&minimal()).unwrap();
        assert_eq!(out["event"]["when"], json!("2020-01-01T00:00:00.000Z"));
        assert_eq!(out["event"]["action"], json!("signup"));
    }

    #[test]
    fn test_missing_required_timestamp_object() {
        let err = validator().validate(&json!({"user": {"id": "u1"}})).unwrap_err();
        assert_eq!(err.paths(), vec!["event"]);
    }

    #[test]
    fn test_missing_required_leaf() {
        let err = validator()
            .validate(&json!({"event": {"when": "2020-01-01"}}))
            .unwrap_err();
        assert_eq!(err.issues[0].message, "\"event.action\" is required");
    }

    #[test]
    fn test_optional_object_with_required_children() {
        // service holds required fields but may itself be omitted
        assert!(validator().validate(&minimal()).is_ok());

        let mut event = minimal();
        event["service"] = json!({"name": "api"});
        let err = validator().validate(&event).unwrap_err();
        assert_eq!(err.paths(), vec!["service.env", "service.type"]);
    }

    #[test]
    fn test_rejects_unknown_and_forbidden_keys() {
        let mut event = minimal();
        event["id"] = json!("abc");
        event["bogus"] = json!(1);
        let err = validator().validate(&event).unwrap_err();
        assert_eq!(err.paths(), vec!["bogus", "id"]);
    }

    #[test]
    fn test_collects_all_issues() {
        let event = json!({
            "event": {"action": "", "when": "yesterday"},
            "user": {"email": "nope"},
            "device": {"screenWidth": "wide", "location": {"ip": "300.1.1.1", "geo": {"lat": 91}}}
        });
        let err = validator().validate(&event).unwrap_err();
        let paths = err.paths();
        assert!(paths.contains(&"event.action"));
        assert!(paths.contains(&"event.when"));
        assert!(paths.contains(&"user.email"));
        assert!(paths.contains(&"device.screenWidth"));
        assert!(paths.contains(&"device.location.ip"));
        assert!(paths.contains(&"device.location.geo.lat"));
    }

    #[test]
    fn test_converts_numeric_and_boolean_strings() {
        let custom = Schema::from_json(&json!({
            "policy": {"autoRenew": "boolean", "price": "number:min=0.01"}
        }))
        .unwrap();
        let validator = Validator::new(Schema::events().unwrap().merge(custom)).unwrap();

        let mut event = minimal();
        event["policy"] = json!({"autoRenew": "true", "price": "12.5"});
        event["device"] = json!({"screenWidth": "1080"});

        let out = validator.validate(&event).unwrap();
        assert_eq!(out["policy"]["autoRenew"], json!(true));
        assert_eq!(out["policy"]["price"], json!(12.5));
        assert_eq!(out["device"]["screenWidth"], json!(1080));
    }

    #[test]
    fn test_string_length_bounds() {
        let mut event = minimal();
        event["user"] = json!({"phoneNumber": "123"});
        let err = validator().validate(&event).unwrap_err();
        assert!(err.issues[0].message.contains("at least 5"));
    }

    #[test]
    fn test_ip_forms() {
        assert!(is_ip("10.0.0.1"));
        assert!(is_ip("::1"));
        assert!(is_ip("10.0.0.0/8"));
        assert!(!is_ip("10.0.0.0/40"));
        assert!(!is_ip("localhost"));
    }

    #[test]
    fn test_non_object_payload() {
        let err = validator().validate(&json!("hello")).unwrap_err();
        assert_eq!(err.paths(), vec![""]);
    }
}
