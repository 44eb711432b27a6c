//! Validation registry.
//!
//! Every expectation names a validation type. The type decides how a value
//! extracted from a response is coerced before it is compared with the
//! expected literal. The set of types is closed: each variant maps to one
//! pure coercion function in [`ValidationType::coercion`].

mod trapi;

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

pub use trapi::{
    Attribute, Edge, EdgeBinding, KnowledgeGraph, Node, NodeBinding, QEdge, QNode, QueryGraph,
    TrapiMessage, TrapiResult,
};

/// Integers above this magnitude cannot round-trip through an `f64`.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

type Coercion = fn(&Value) -> Result<Value, String>;

/// Type tag attached to an expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationType {
    Int,
    Float,
    String,
    Boolean,
    /// Pass-through, the raw value is compared as is
    Object,
    /// Translator Reasoner API message, checked against [`TrapiMessage`]
    Trapi,
}

/// Raised when a definition names a validation type that does not exist
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown validation type: {0:?}")]
pub struct UnknownValidationType(pub String);

/// Raised when a value cannot be coerced into the requested type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("value does not validate as {validation_type}: {reason}")]
pub struct ValidationError {
    pub validation_type: ValidationType,
    pub reason: String,
}

impl ValidationType {
    pub const ALL: [ValidationType; 6] = [
        ValidationType::Int,
        ValidationType::Float,
        ValidationType::String,
        ValidationType::Boolean,
        ValidationType::Object,
        ValidationType::Trapi,
    ];

    /// Canonical tag, as written in reports
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationType::Int => "int",
            ValidationType::Float => "float",
            ValidationType::String => "string",
            ValidationType::Boolean => "boolean",
            ValidationType::Object => "object",
            ValidationType::Trapi => "trapi",
        }
    }

    /// Whether values of this type are checked against a structured schema
    pub fn is_schema(self) -> bool {
        matches!(self, ValidationType::Trapi)
    }

    fn coercion(self) -> Coercion {
        match self {
            ValidationType::Int => coerce_int,
            ValidationType::Float => coerce_float,
            ValidationType::String => coerce_string,
            ValidationType::Boolean => coerce_boolean,
            ValidationType::Object => pass_through,
            ValidationType::Trapi => trapi::validate_message,
        }
    }

    /// Coerce `raw` into this type
    pub fn validate(self, raw: &Value) -> Result<Value, ValidationError> {
        (self.coercion())(raw)
            .map_err(|reason| ValidationError { validation_type: self, reason })
    }
}

impl ValidationType {
    /// Check a request payload without altering it.
    ///
    /// Schema types accept their request envelope (for TRAPI, a query with a
    /// `message` member). Scalar types only need to coerce.
    pub fn check_payload(self, raw: &Value) -> Result<(), ValidationError> {
        let checked = match self {
            ValidationType::Trapi => trapi::check_query(raw),
            _ => (self.coercion())(raw).map(drop),
        };
        checked.map_err(|reason| ValidationError { validation_type: self, reason })
    }
}

/// Coerce `raw` into the type denoted by `validation_type`
pub fn validate(raw: &Value, validation_type: ValidationType) -> Result<Value, ValidationError> {
    validation_type.validate(raw)
}

impl FromStr for ValidationType {
    type Err = UnknownValidationType;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(ValidationType::Int),
            "float" | "number" => Ok(ValidationType::Float),
            "str" | "string" => Ok(ValidationType::String),
            "bool" | "boolean" => Ok(ValidationType::Boolean),
            "object" | "any" => Ok(ValidationType::Object),
            "trapi" => Ok(ValidationType::Trapi),
            _ => Err(UnknownValidationType(tag.to_string())),
        }
    }
}

impl fmt::Display for ValidationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ValidationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Short name of a JSON value's kind, for error messages
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn coerce_int(raw: &Value) -> Result<Value, String> {
    match raw {
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                return Ok(raw.clone());
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => {
                    Ok(Value::from(f as i64))
                }
                _ => Err(format!("{n} is not an integer")),
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| format!("{s:?} is not an integer: {e}")),
        other => Err(format!("expected an integer, found {}", kind_of(other))),
    }
}

fn coerce_float(raw: &Value) -> Result<Value, String> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        other => return Err(format!("expected a number, found {}", kind_of(other))),
    };

    parsed
        .filter(|f| f.is_finite())
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("{raw} is not a finite number"))
}

fn coerce_string(raw: &Value) -> Result<Value, String> {
    match raw {
        Value::String(_) => Ok(raw.clone()),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        other => Err(format!("expected a string, found {}", kind_of(other))),
    }
}

fn coerce_boolean(raw: &Value) -> Result<Value, String> {
    match raw {
        Value::Bool(_) => Ok(raw.clone()),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
        other => Err(format!("expected a boolean, found {}", kind_of(other))),
    }
}

fn pass_through(raw: &Value) -> Result<Value, String> {
    Ok(raw.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_tags() {
        assert_eq!("int".parse::<ValidationType>(), Ok(ValidationType::Int));
        assert_eq!("Integer".parse::<ValidationType>(), Ok(ValidationType::Int));
        assert_eq!("str".parse::<ValidationType>(), Ok(ValidationType::String));
        assert_eq!("TRAPI".parse::<ValidationType>(), Ok(ValidationType::Trapi));

        for validation_type in ValidationType::ALL {
            assert_eq!(validation_type.as_str().parse::<ValidationType>(), Ok(validation_type));
        }
    }

    #[test]
    fn test_unknown_tag_carries_tag() {
        let err = "Exotic Type".parse::<ValidationType>().unwrap_err();
        assert_eq!(err, UnknownValidationType("Exotic Type".to_string()));
    }

    #[test]
    fn test_int_coercion() {
        assert_eq!(validate(&json!(42), ValidationType::Int), Ok(json!(42)));
        assert_eq!(validate(&json!(-3), ValidationType::Int), Ok(json!(-3)));
        assert_eq!(validate(&json!(7.0), ValidationType::Int), Ok(json!(7)));
        assert_eq!(validate(&json!(" 12 "), ValidationType::Int), Ok(json!(12)));

        assert!(validate(&json!(7.5), ValidationType::Int).is_err());
        assert!(validate(&json!("seven"), ValidationType::Int).is_err());
        assert!(validate(&json!(null), ValidationType::Int).is_err());
        assert!(validate(&json!([1]), ValidationType::Int).is_err());
    }

    #[test]
    fn test_float_coercion() {
        assert_eq!(validate(&json!(1.5), ValidationType::Float), Ok(json!(1.5)));
        assert_eq!(validate(&json!("2.25"), ValidationType::Float), Ok(json!(2.25)));
        assert_eq!(validate(&json!(3), ValidationType::Float), Ok(json!(3.0)));
        assert!(validate(&json!("NaN"), ValidationType::Float).is_err());
        assert!(validate(&json!(true), ValidationType::Float).is_err());
    }

    #[test]
    fn test_string_and_boolean_coercion() {
        assert_eq!(validate(&json!("abc"), ValidationType::String), Ok(json!("abc")));
        assert_eq!(validate(&json!(5), ValidationType::String), Ok(json!("5")));
        assert!(validate(&json!({"a": 1}), ValidationType::String).is_err());

        assert_eq!(validate(&json!(true), ValidationType::Boolean), Ok(json!(true)));
        assert_eq!(validate(&json!("FALSE"), ValidationType::Boolean), Ok(json!(false)));
        assert!(validate(&json!(1), ValidationType::Boolean).is_err());
    }

    #[test]
    fn test_object_passes_everything_through() {
        for value in [json!(null), json!({"nested": [1, 2]}), json!("x")] {
            assert_eq!(validate(&value, ValidationType::Object), Ok(value.clone()));
        }
    }

    #[test]
    fn test_error_names_the_type() {
        let err = validate(&json!("x"), ValidationType::Int).unwrap_err();
        assert_eq!(err.validation_type, ValidationType::Int);
        assert!(err.to_string().starts_with("value does not validate as int"));
    }
}
