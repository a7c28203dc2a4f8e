//! Event Schema
//!
//! A schema document is a nested JSON object whose leaves are type spec
//! strings (see [`parser`]). It serves two purposes:
//!
//! - **Validator**: accepted events are checked and normalized against it
//! - **Skeleton**: every declared leaf path gets an index bucket at startup
//!
//! The built-in `events` schema can be extended by a custom schema file,
//! merged on top of it.

pub mod error;
pub mod parser;
mod validator;

pub use error::{SchemaError, SchemaResult, ValidationError, ValidationIssue};
pub use parser::{parse_type_spec, Constraint, FieldSpec, FieldType};
pub use validator::Validator;

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

const EVENTS_SCHEMA: &str = include_str!("events.json");

/// A node of a parsed schema
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Field(FieldSpec),
    Object {
        fields: BTreeMap<String, SchemaNode>,
        /// The object must be present (it holds a field that must be)
        required: bool,
    },
}

/// A parsed schema document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    fields: BTreeMap<String, SchemaNode>,
}

impl Schema {
    /// The built-in schema for the `events` collection
    pub fn events() -> SchemaResult<Self> {
        Self::from_json(&serde_json::from_str(EVENTS_SCHEMA)?)
    }

    /// Parse a schema from its JSON form
    pub fn from_json(value: &Value) -> SchemaResult<Self> {
        match value {
            Value::Object(_) => match parse_node("", value)? {
                SchemaNode::Object { fields, .. } => Ok(Self { fields }),
                SchemaNode::Field(_) => Err(SchemaError::InvalidNode {
                    path: "<root>".into(),
                }),
            },
            _ => Err(SchemaError::InvalidNode {
                path: "<root>".into(),
            }),
        }
    }

    /// Load a schema document from a JSON file
    pub fn load(path: &Path) -> SchemaResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SchemaError::Io {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_json(&serde_json::from_str(&content)?)
    }

    /// Deep-merge `other` on top of this schema
    ///
    /// Objects merge key by key; any other collision is won by `other`.
    pub fn merge(mut self, other: Schema) -> Self {
        merge_fields(&mut self.fields, other.fields);
        self
    }

    /// Mark a leaf and every object above it as required
    ///
    /// Returns false if the path is not declared as a leaf.
    pub fn require(&mut self, path: &str) -> bool {
        let segments: Vec<&str> = path.split('.').collect();
        require_in(&mut self.fields, &segments)
    }

    /// Top-level nodes
    pub fn fields(&self) -> &BTreeMap<String, SchemaNode> {
        &self.fields
    }

    /// Resolve a dotted path to its leaf spec
    pub fn field(&self, path: &str) -> Option<&FieldSpec> {
        let mut fields = &self.fields;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            match (fields.get(segment)?, segments.peek()) {
                (SchemaNode::Field(spec), None) => return Some(spec),
                (SchemaNode::Object { fields: inner, .. }, Some(_)) => fields = inner,
                _ => return None,
            }
        }
        None
    }

    /// Every declared leaf path, dot-joined
    ///
    /// Forbidden leaves are left out: no stored event can hold them.
    pub fn skeleton(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_leaves(&self.fields, None, &mut out);
        out
    }
}

fn parse_node(path: &str, value: &Value) -> SchemaResult<SchemaNode> {
    match value {
        Value::String(spec) => Ok(SchemaNode::Field(parse_type_spec(path, spec)?)),
        Value::Object(map) => {
            let mut fields = BTreeMap::new();
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                fields.insert(key.clone(), parse_node(&child_path, child)?);
            }
            Ok(SchemaNode::Object {
                fields,
                required: false,
            })
        }
        _ => Err(SchemaError::InvalidNode {
            path: path.to_string(),
        }),
    }
}

fn merge_fields(base: &mut BTreeMap<String, SchemaNode>, overlay: BTreeMap<String, SchemaNode>) {
    for (key, node) in overlay {
        match (base.get_mut(&key), node) {
            (
                Some(SchemaNode::Object { fields, required }),
                SchemaNode::Object {
                    fields: overlay_fields,
                    required: overlay_required,
                },
            ) => {
                merge_fields(fields, overlay_fields);
                *required |= overlay_required;
            }
            (_, node) => {
                base.insert(key, node);
            }
        }
    }
}

fn require_in(fields: &mut BTreeMap<String, SchemaNode>, segments: &[&str]) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return false;
    };
    match (fields.get_mut(*head), rest.is_empty()) {
        (Some(SchemaNode::Field(spec)), true) => {
            spec.required = true;
            true
        }
        (Some(SchemaNode::Object { fields, required }), false) => {
            let found = require_in(fields, rest);
            if found {
                *required = true;
            }
            found
        }
        _ => false,
    }
}

fn collect_leaves(
    fields: &BTreeMap<String, SchemaNode>,
    prefix: Option<&str>,
    out: &mut Vec<String>,
) {
    for (key, node) in fields {
        let path = match prefix {
            Some(p) => format!("{}.{}", p, key),
            None => key.clone(),
        };
        match node {
            SchemaNode::Field(spec) if spec.forbidden => {}
            SchemaNode::Field(_) => out.push(path),
            SchemaNode::Object { fields, .. } => collect_leaves(fields, Some(&path), out),
        }
    }
}
