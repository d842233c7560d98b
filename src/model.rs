//! Declarative field tables for object models.
//!
//! A DTO describes its JSON shape once, as a static table of [`Field`]s, and
//! the generic [`write_model`] / [`read_model`] routines do the rest:
//!
//! - writing emits exactly the fields that are set (optional fields whose value
//!   is `None` are omitted);
//! - reading attempts every field's conversion, collects every failure, and only
//!   then decides. A type mismatch in one field never hides a failure in another,
//!   and a failed read never yields a partially populated object.
//!
//! ```
//! use ims_orchestration::codec::JsonCodec;
//! use ims_orchestration::model::{read_model, write_model, Field, Model};
//! use serde_json::json;
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Label {
//!     key: String,
//!     note: Option<String>,
//! }
//!
//! impl Model for Label {
//!     const FIELDS: &'static [Field<Self>] = &[
//!         Field::required("key", |m| m.key.to_json(), |m, v| {
//!             m.key = JsonCodec::from_json(v)?;
//!             Ok(())
//!         }),
//!         Field::optional("note", |m| m.note.as_ref().map(JsonCodec::to_json), |m, v| {
//!             m.note = Some(JsonCodec::from_json(v)?);
//!             Ok(())
//!         }),
//!     ];
//! }
//!
//! let label: Label = read_model(&json!({"key": "region"})).unwrap();
//! assert_eq!(label.note, None);
//! assert_eq!(write_model(&label), json!({"key": "region"}));
//! ```

use crate::codec::{json_type_name, ParseError};
use serde_json::{Map, Value};

/// How a field produces its JSON value.
pub enum Writer<M> {
    /// Required fields are always written.
    Always(fn(&M) -> Value),
    /// Optional fields are written only when set.
    WhenSet(fn(&M) -> Option<Value>),
}

/// Describes one JSON field of a model `M`.
pub struct Field<M> {
    /// The JSON key.
    pub name: &'static str,
    /// Produces the field's JSON value.
    pub write: Writer<M>,
    /// Converts a present, non-null JSON value into the field.
    pub read: fn(&mut M, &Value) -> Result<(), ParseError>,
}

impl<M> Field<M> {
    /// A field that is always written and must be present and non-null.
    pub const fn required(
        name: &'static str,
        write: fn(&M) -> Value,
        read: fn(&mut M, &Value) -> Result<(), ParseError>,
    ) -> Self {
        Field {
            name,
            write: Writer::Always(write),
            read,
        }
    }

    /// A field that is written only when set and may be absent.
    ///
    /// An explicit `null` is not the same as absence and fails to parse.
    pub const fn optional(
        name: &'static str,
        write: fn(&M) -> Option<Value>,
        read: fn(&mut M, &Value) -> Result<(), ParseError>,
    ) -> Self {
        Field {
            name,
            write: Writer::WhenSet(write),
            read,
        }
    }

    /// Returns `true` for required fields.
    pub fn is_required(&self) -> bool {
        matches!(self.write, Writer::Always(_))
    }
}

/// An object DTO described by a field table.
pub trait Model: Default + 'static {
    /// The model's fields, in serialization order.
    const FIELDS: &'static [Field<Self>];
}

/// Serializes a model into a JSON object holding exactly its set fields.
pub fn write_model<M: Model>(model: &M) -> Value {
    let mut object = Map::with_capacity(M::FIELDS.len());
    for field in M::FIELDS {
        let value = match &field.write {
            Writer::Always(write) => Some(write(model)),
            Writer::WhenSet(write) => write(model),
        };
        if let Some(value) = value {
            object.insert(field.name.to_string(), value);
        }
    }
    Value::Object(object)
}

/// Deserializes a model from a JSON object.
///
/// Every field is attempted; the result is an error if the value is not an
/// object, if any required field is missing, or if any present field fails to
/// convert. Unknown keys are ignored.
pub fn read_model<M: Model>(value: &Value) -> Result<M, ParseError> {
    let object = value.as_object().ok_or(ParseError::TypeMismatch {
        expected: "object",
        found: json_type_name(value),
    })?;

    let mut model = M::default();
    let mut errors = Vec::new();

    for field in M::FIELDS {
        match object.get(field.name) {
            None if field.is_required() => errors.push(ParseError::MissingField(field.name)),
            None => {}
            Some(Value::Null) if field.is_required() => {
                errors.push(ParseError::MissingField(field.name))
            }
            Some(Value::Null) => errors.push(
                ParseError::TypeMismatch {
                    expected: "a value",
                    found: "null",
                }
                .at(field.name),
            ),
            Some(present) => {
                if let Err(e) = (field.read)(&mut model, present) {
                    errors.push(e.at(field.name));
                }
            }
        }
    }

    match ParseError::collect(errors) {
        Some(err) => Err(err),
        None => Ok(model),
    }
}

/// Implements [`JsonCodec`](crate::codec::JsonCodec) for models by delegating
/// to their field tables.
macro_rules! impl_model_codec {
    ($($model:ty),+ $(,)?) => {$(
        impl $crate::codec::JsonCodec for $model {
            fn to_json(&self) -> serde_json::Value {
                $crate::model::write_model(self)
            }

            fn from_json(
                value: &serde_json::Value,
            ) -> ::std::result::Result<Self, $crate::codec::ParseError> {
                $crate::model::read_model(value)
            }
        }
    )+};
}

pub(crate) use impl_model_codec;
