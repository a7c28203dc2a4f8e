//! Type Spec Parser
//!
//! Parses the leaf strings of a schema document into `FieldSpec`s.
//!
//! # Supported Syntax
//!
//! ```text
//! type[:constraint[,constraint...]]
//!
//! type       := string | number | boolean
//! constraint := required | forbidden | isodate | email | ip
//!             | min[=]NUMBER | max[=]NUMBER
//! ```
//!
//! # Examples
//!
//! ```text
//! string
//! string:min=1,max=100,required
//! string:isodate,required
//! number:min=-90,max=90
//! ```

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, opt, value},
    multi::separated_list1,
    number::complete::double,
    sequence::{delimited, preceded, tuple},
    IResult,
};

use crate::schema::error::{SchemaError, SchemaResult};

/// Scalar type of a schema leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
        }
    }
}

/// One constraint in a type spec
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    Required,
    Forbidden,
    IsoDate,
    Email,
    Ip,
    /// Minimum value (numbers) or minimum length (strings)
    Min(f64),
    /// Maximum value (numbers) or maximum length (strings)
    Max(f64),
}

/// A parsed schema leaf
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub required: bool,
    pub forbidden: bool,
    pub isodate: bool,
    pub email: bool,
    pub ip: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            forbidden: false,
            isodate: false,
            email: false,
            ip: false,
            min: None,
            max: None,
        }
    }

    fn apply(mut self, constraint: Constraint) -> Self {
        match constraint {
            Constraint::Required => self.required = true,
            Constraint::Forbidden => self.forbidden = true,
            Constraint::IsoDate => self.isodate = true,
            Constraint::Email => self.email = true,
            Constraint::Ip => self.ip = true,
            Constraint::Min(n) => self.min = Some(n),
            Constraint::Max(n) => self.max = Some(n),
        }
        self
    }
}

/// Parse a type spec string into a `FieldSpec`
///
/// `path` is only used to label errors.
pub fn parse_type_spec(path: &str, input: &str) -> SchemaResult<FieldSpec> {
    let invalid = |reason: String| SchemaError::InvalidSpec {
        path: path.to_string(),
        spec: input.to_string(),
        reason,
    };

    let (_, (field_type, constraints)) = all_consuming(type_spec)(input.trim())
        .map_err(|e| invalid(format!("{:?}", e)))?;

    let spec = constraints
        .into_iter()
        .fold(FieldSpec::new(field_type), FieldSpec::apply);

    if spec.required && spec.forbidden {
        return Err(invalid("a field cannot be both required and forbidden".into()));
    }
    if spec.field_type != FieldType::String && (spec.isodate || spec.email || spec.ip) {
        return Err(invalid(format!(
            "isodate, email and ip only apply to strings, not {}",
            spec.field_type
        )));
    }
    if let (Some(min), Some(max)) = (spec.min, spec.max) {
        if min > max {
            return Err(invalid(format!("min {} exceeds max {}", min, max)));
        }
    }

    Ok(spec)
}

fn type_spec(input: &str) -> IResult<&str, (FieldType, Vec<Constraint>)> {
    tuple((
        field_type,
        map(opt(preceded(char(':'), constraint_list)), Option::unwrap_or_default),
    ))(input)
}

fn field_type(input: &str) -> IResult<&str, FieldType> {
    alt((
        value(FieldType::String, tag("string")),
        value(FieldType::Number, tag("number")),
        value(FieldType::Boolean, tag("boolean")),
    ))(input)
}

fn constraint_list(input: &str) -> IResult<&str, Vec<Constraint>> {
    separated_list1(delimited(multispace0, char(','), multispace0), constraint)(input)
}

fn constraint(input: &str) -> IResult<&str, Constraint> {
    alt((
        value(Constraint::Required, tag("required")),
        value(Constraint::Forbidden, tag("forbidden")),
        value(Constraint::IsoDate, tag("isodate")),
        value(Constraint::Email, tag("email")),
        value(Constraint::Ip, tag("ip")),
        map(bound("min"), Constraint::Min),
        map(bound("max"), Constraint::Max),
    ))(input)
}

/// `min=5`, `max=0.01`, and the `min-180` shorthand for `min=-180`
fn bound<'a>(name: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, f64> {
    preceded(tuple((tag(name), opt(char('=')))), double)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_type() {
        let spec = parse_type_spec("user.id", "string").unwrap();
        assert_eq!(spec, FieldSpec::new(FieldType::String));
    }

    #[test]
    fn test_parse_constraints() {
        let spec = parse_type_spec("event.action", "string:min=1,max=100,required").unwrap();
        assert_eq!(spec.field_type, FieldType::String);
        assert!(spec.required);
        assert_eq!(spec.min, Some(1.0));
        assert_eq!(spec.max, Some(100.0));
    }

    #[test]
    fn test_parse_isodate_required() {
        let spec = parse_type_spec("event.when", "string:isodate,required").unwrap();
        assert!(spec.isodate);
        assert!(spec.required);
    }

    #[test]
    fn test_parse_negative_bounds() {
        let spec = parse_type_spec("geo.lat", "number:min=-90,max=90").unwrap();
        assert_eq!(spec.min, Some(-90.0));
        assert_eq!(spec.max, Some(90.0));

        let spec = parse_type_spec("geo.lng", "number:min-180,max=180").unwrap();
        assert_eq!(spec.min, Some(-180.0));
    }

    #[test]
    fn test_parse_fractional_bound() {
        let spec = parse_type_spec("policy.price", "number:min=0.01").unwrap();
        assert_eq!(spec.min, Some(0.01));
    }

    #[test]
    fn test_reject_unknown_type() {
        let err = parse_type_spec("x", "date").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidSpec { .. }));
    }

    #[test]
    fn test_reject_unknown_constraint() {
        assert!(parse_type_spec("x", "string:uppercase").is_err());
        assert!(parse_type_spec("x", "string:").is_err());
        assert!(parse_type_spec("x", "string:required,").is_err());
    }

    #[test]
    fn test_reject_contradictions() {
        assert!(parse_type_spec("x", "string:required,forbidden").is_err());
        assert!(parse_type_spec("x", "number:email").is_err());
        assert!(parse_type_spec("x", "number:min=5,max=1").is_err());
    }
}
