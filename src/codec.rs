//! Conversions between field values and JSON trees.
//!
//! Every model field is read and written through [`JsonCodec`]. Primitive types,
//! ordered lists, string-keyed maps and raw [`serde_json::Value`]s are covered
//! here; object models implement the trait by delegating to
//! [`write_model`](crate::model::write_model) and
//! [`read_model`](crate::model::read_model).
//!
//! Conversions are strict: a JSON number is never accepted for a string field,
//! an integer field rejects fractional or out-of-range numbers, and `null` is
//! never a valid value for a concrete type.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// A value that converts to and from a JSON tree.
pub trait JsonCodec: Sized {
    /// Converts the value into JSON.
    fn to_json(&self) -> Value;

    /// Converts a JSON value, failing if its shape does not match.
    fn from_json(value: &Value) -> Result<Self, ParseError>;
}

/// A JSON value whose shape does not match the expected type.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The value has the wrong JSON type.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// What the conversion required.
        expected: &'static str,
        /// The JSON type that was present.
        found: &'static str,
    },

    /// A required object field is absent or `null`.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// An enum string that names no known variant.
    #[error("unknown variant `{0}`")]
    UnknownVariant(String),

    /// A failure inside a named field or list index.
    #[error("`{path}`: {source}")]
    At {
        /// Field name or `[index]`.
        path: String,
        /// The underlying failure.
        source: Box<ParseError>,
    },

    /// Several fields failed. Every field of an object is attempted before the
    /// object is rejected, so one parse can report more than one problem.
    #[error("{} fields failed to parse: {}", .0.len(), join(.0))]
    Multiple(Vec<ParseError>),

    /// The text is not JSON at all.
    #[error("invalid JSON: {0}")]
    Syntax(String),
}

impl ParseError {
    /// Wraps the error with the field or index it occurred at.
    pub fn at(self, path: impl Into<String>) -> Self {
        ParseError::At {
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// Collapses accumulated failures into one error, or `None` if there were none.
    pub fn collect(mut errors: Vec<ParseError>) -> Option<ParseError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ParseError::Multiple(errors)),
        }
    }

    fn mismatch(expected: &'static str, found: &Value) -> Self {
        ParseError::TypeMismatch {
            expected,
            found: json_type_name(found),
        }
    }
}

fn join(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Returns the JSON type name of a value, as used in error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parses JSON text into a value of `T`.
pub fn from_str<T: JsonCodec>(text: &str) -> Result<T, ParseError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ParseError::Syntax(e.to_string()))?;
    T::from_json(&value)
}

/// Serializes a value to compact JSON text.
pub fn to_string<T: JsonCodec>(value: &T) -> String {
    value.to_json().to_string()
}

impl JsonCodec for String {
    fn to_json(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_json(value: &Value) -> Result<Self, ParseError> {
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ParseError::mismatch("string", value))
    }
}

impl JsonCodec for bool {
    fn to_json(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_json(value: &Value) -> Result<Self, ParseError> {
        value
            .as_bool()
            .ok_or_else(|| ParseError::mismatch("boolean", value))
    }
}

impl JsonCodec for i64 {
    fn to_json(&self) -> Value {
        Value::from(*self)
    }

    fn from_json(value: &Value) -> Result<Self, ParseError> {
        value
            .as_i64()
            .ok_or_else(|| ParseError::mismatch("integer", value))
    }
}

impl JsonCodec for i32 {
    fn to_json(&self) -> Value {
        Value::from(*self)
    }

    fn from_json(value: &Value) -> Result<Self, ParseError> {
        value
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(|| ParseError::mismatch("32-bit integer", value))
    }
}

impl JsonCodec for f64 {
    fn to_json(&self) -> Value {
        // Non-finite numbers have no JSON representation.
        serde_json::Number::from_f64(*self)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }

    fn from_json(value: &Value) -> Result<Self, ParseError> {
        value
            .as_f64()
            .ok_or_else(|| ParseError::mismatch("number", value))
    }
}

impl JsonCodec for Value {
    fn to_json(&self) -> Value {
        self.clone()
    }

    fn from_json(value: &Value) -> Result<Self, ParseError> {
        Ok(value.clone())
    }
}

/// Endpoints without a response body parse unconditionally.
impl JsonCodec for () {
    fn to_json(&self) -> Value {
        Value::Null
    }

    fn from_json(_value: &Value) -> Result<Self, ParseError> {
        Ok(())
    }
}

impl<T: JsonCodec> JsonCodec for Vec<T> {
    fn to_json(&self) -> Value {
        Value::Array(self.iter().map(JsonCodec::to_json).collect())
    }

    fn from_json(value: &Value) -> Result<Self, ParseError> {
        let items = value
            .as_array()
            .ok_or_else(|| ParseError::mismatch("array", value))?;

        let mut parsed = Vec::with_capacity(items.len());
        let mut errors = Vec::new();
        for (index, item) in items.iter().enumerate() {
            match T::from_json(item) {
                Ok(v) => parsed.push(v),
                Err(e) => errors.push(e.at(format!("[{}]", index))),
            }
        }

        match ParseError::collect(errors) {
            Some(err) => Err(err),
            None => Ok(parsed),
        }
    }
}

impl<T: JsonCodec> JsonCodec for HashMap<String, T> {
    fn to_json(&self) -> Value {
        let object: Map<String, Value> = self
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect();
        Value::Object(object)
    }

    fn from_json(value: &Value) -> Result<Self, ParseError> {
        let object = value
            .as_object()
            .ok_or_else(|| ParseError::mismatch("object", value))?;

        let mut parsed = HashMap::with_capacity(object.len());
        let mut errors = Vec::new();
        for (key, item) in object {
            match T::from_json(item) {
                Ok(v) => {
                    parsed.insert(key.clone(), v);
                }
                Err(e) => errors.push(e.at(key.clone())),
            }
        }

        match ParseError::collect(errors) {
            Some(err) => Err(err),
            None => Ok(parsed),
        }
    }
}
