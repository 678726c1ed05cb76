//! Conversion between native values and literals
//!
//! The native representation on the Rust side is `serde_json::Value`. The
//! converter uses the task interface's declared types to decide how each
//! value is encoded (a string may become a datetime, a blob reference or a
//! plain string depending on the declaration).

use std::collections::BTreeMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};

use crate::error::ConversionError;
use crate::literals::{Binary, Blob, Literal, LiteralMap, LiteralValue, Scalar};
use crate::types::{LiteralType, Variable};

/// Result type for conversions
pub type ConversionResult<T> = std::result::Result<T, ConversionError>;

/// Translates native values to and from the literal model
pub trait ValueConverter: Send + Sync {
    /// Convert a native value into a literal of the expected type
    fn to_literal(&self, value: &Value, expected: &LiteralType) -> ConversionResult<Literal>;

    /// Convert a literal back into a native value
    fn to_native(&self, literal: &Literal, expected: &LiteralType) -> ConversionResult<Value>;

    /// Convert a full set of named inputs against an interface
    fn to_literal_map(
        &self,
        values: &BTreeMap<String, Value>,
        declared: &BTreeMap<String, Variable>,
    ) -> ConversionResult<LiteralMap> {
        if let Some(unknown) = values.keys().find(|k| !declared.contains_key(*k)) {
            return Err(ConversionError::UnknownInput(unknown.clone()));
        }

        let mut map = LiteralMap::new();
        for (name, var) in declared {
            let value = match values.get(name) {
                Some(v) => v,
                None if var.literal_type == LiteralType::None => &Value::Null,
                None => return Err(ConversionError::MissingInput(name.clone())),
            };
            map.insert(name.clone(), self.to_literal(value, &var.literal_type)?);
        }
        Ok(map)
    }

    /// Convert a full set of named outputs back into native values
    fn to_native_map(
        &self,
        literals: &LiteralMap,
        declared: &BTreeMap<String, Variable>,
    ) -> ConversionResult<BTreeMap<String, Value>> {
        let mut values = BTreeMap::new();
        for (name, literal) in literals {
            let value = match declared.get(name) {
                Some(var) => self.to_native(literal, &var.literal_type)?,
                None => render(literal),
            };
            values.insert(name.clone(), value);
        }
        Ok(values)
    }
}

/// Default converter for JSON-shaped native values
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConverter;

impl ValueConverter for JsonConverter {
    fn to_literal(&self, value: &Value, expected: &LiteralType) -> ConversionResult<Literal> {
        let literal = match expected {
            LiteralType::None => match value {
                Value::Null => Literal::none(),
                other => return Err(ConversionError::mismatch("none", kind_of(other))),
            },
            LiteralType::Integer => value
                .as_i64()
                .map(Literal::from)
                .ok_or_else(|| ConversionError::mismatch("integer", kind_of(value)))?,
            LiteralType::Float => value
                .as_f64()
                .map(Literal::from)
                .ok_or_else(|| ConversionError::mismatch("float", kind_of(value)))?,
            LiteralType::String => value
                .as_str()
                .map(Literal::from)
                .ok_or_else(|| ConversionError::mismatch("string", kind_of(value)))?,
            LiteralType::Boolean => value
                .as_bool()
                .map(Literal::from)
                .ok_or_else(|| ConversionError::mismatch("boolean", kind_of(value)))?,
            LiteralType::Datetime => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| ConversionError::mismatch("datetime", kind_of(value)))?;
                let parsed = DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| ConversionError::invalid("datetime", e.to_string()))?;
                Literal::from(parsed.with_timezone(&Utc))
            }
            LiteralType::Duration => {
                let secs = value
                    .as_f64()
                    .ok_or_else(|| ConversionError::mismatch("duration", kind_of(value)))?;
                let duration = Duration::try_from_secs_f64(secs)
                    .map_err(|e| ConversionError::invalid("duration", e.to_string()))?;
                Literal::scalar(Scalar::Duration(duration))
            }
            LiteralType::Binary => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| ConversionError::mismatch("binary", kind_of(value)))?;
                let bytes = BASE64
                    .decode(raw)
                    .map_err(|e| ConversionError::invalid("binary", e.to_string()))?;
                Literal::scalar(Scalar::Binary(Binary {
                    value: bytes,
                    tag: String::new(),
                }))
            }
            LiteralType::Blob {
                format,
                dimensionality,
            } => {
                let uri = match value {
                    Value::String(s) => s.clone(),
                    Value::Object(obj) => obj
                        .get("uri")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| ConversionError::invalid("blob", "object has no 'uri'"))?,
                    other => return Err(ConversionError::mismatch("blob", kind_of(other))),
                };
                Literal::scalar(Scalar::Blob(Blob {
                    uri,
                    format: format.clone(),
                    dimensionality: *dimensionality,
                }))
            }
            LiteralType::Struct => match value {
                Value::Object(obj) => Literal::scalar(Scalar::Generic(obj.clone())),
                other => return Err(ConversionError::mismatch("struct", kind_of(other))),
            },
            LiteralType::Collection(inner) => match value {
                Value::Array(items) => Literal::collection(
                    items
                        .iter()
                        .map(|v| self.to_literal(v, inner))
                        .collect::<ConversionResult<Vec<_>>>()?,
                ),
                other => return Err(ConversionError::mismatch("list", kind_of(other))),
            },
            LiteralType::Map(inner) => match value {
                Value::Object(obj) => Literal::map(
                    obj.iter()
                        .map(|(k, v)| -> ConversionResult<(String, Literal)> {
                            Ok((k.clone(), self.to_literal(v, inner)?))
                        })
                        .collect::<ConversionResult<LiteralMap>>()?,
                ),
                other => return Err(ConversionError::mismatch("map", kind_of(other))),
            },
        };
        Ok(literal)
    }

    fn to_native(&self, literal: &Literal, expected: &LiteralType) -> ConversionResult<Value> {
        match (expected, &literal.value) {
            (LiteralType::Collection(inner), LiteralValue::Collection(items)) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.to_native(item, inner))
                    .collect::<ConversionResult<Vec<_>>>()?,
            )),
            (LiteralType::Map(inner), LiteralValue::Map(map)) => {
                let mut obj = Map::new();
                for (k, v) in map {
                    obj.insert(k.clone(), self.to_native(v, inner)?);
                }
                Ok(Value::Object(obj))
            }
            (LiteralType::Collection(_), _) => {
                Err(ConversionError::mismatch("list", literal_kind(literal)))
            }
            (LiteralType::Map(_), _) => Err(ConversionError::mismatch("map", literal_kind(literal))),
            (_, LiteralValue::Scalar(scalar)) => scalar_to_native(scalar, expected),
            (_, _) => Err(ConversionError::mismatch(
                expected.to_string(),
                literal_kind(literal),
            )),
        }
    }
}

fn scalar_to_native(scalar: &Scalar, expected: &LiteralType) -> ConversionResult<Value> {
    let value = match (expected, scalar) {
        (LiteralType::None, Scalar::None) => Value::Null,
        (LiteralType::Integer, Scalar::Integer(i)) => Value::from(*i),
        (LiteralType::Float, Scalar::Float(f)) => float_value(*f)?,
        // Integers widen into floats; the reverse loses information
        (LiteralType::Float, Scalar::Integer(i)) => float_value(*i as f64)?,
        (LiteralType::String, Scalar::String(s)) => Value::String(s.clone()),
        (LiteralType::Boolean, Scalar::Boolean(b)) => Value::Bool(*b),
        (LiteralType::Datetime, Scalar::Datetime(dt)) => Value::String(dt.to_rfc3339()),
        (LiteralType::Duration, Scalar::Duration(d)) => float_value(d.as_secs_f64())?,
        (LiteralType::Binary, Scalar::Binary(b)) => Value::String(BASE64.encode(&b.value)),
        (LiteralType::Blob { .. }, Scalar::Blob(b)) => Value::String(b.uri.clone()),
        (LiteralType::Struct, Scalar::Generic(obj)) => Value::Object(obj.clone()),
        (expected, other) => {
            return Err(ConversionError::mismatch(
                expected.to_string(),
                scalar_kind(other),
            ))
        }
    };
    Ok(value)
}

fn float_value(f: f64) -> ConversionResult<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ConversionError::invalid("float", format!("{} is not representable", f)))
}

/// Convert a native value into a literal without a declared type
///
/// Numbers become integers when they fit, objects become maps.
pub fn infer(value: &Value) -> Literal {
    match value {
        Value::Null => Literal::none(),
        Value::Bool(b) => Literal::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Literal::from(i),
            None => Literal::from(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Literal::from(s.as_str()),
        Value::Array(items) => Literal::collection(items.iter().map(infer)),
        Value::Object(obj) => Literal::map(
            obj.iter()
                .map(|(k, v)| (k.clone(), infer(v)))
                .collect(),
        ),
    }
}

/// Render a literal as JSON for display, without a declared type
pub fn render(literal: &Literal) -> Value {
    match &literal.value {
        LiteralValue::Scalar(scalar) => match scalar {
            Scalar::None => Value::Null,
            Scalar::Boolean(b) => Value::Bool(*b),
            Scalar::Integer(i) => Value::from(*i),
            Scalar::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            Scalar::String(s) => Value::String(s.clone()),
            Scalar::Datetime(dt) => Value::String(dt.to_rfc3339()),
            Scalar::Duration(d) => Value::String(format!("{:?}", d)),
            Scalar::Binary(b) => Value::String(BASE64.encode(&b.value)),
            Scalar::Blob(b) => serde_json::json!({ "uri": b.uri, "format": b.format }),
            Scalar::Generic(obj) => Value::Object(obj.clone()),
        },
        LiteralValue::Collection(items) => Value::Array(items.iter().map(render).collect()),
        LiteralValue::Map(map) => render_map(map),
    }
}

/// Render a literal map as a JSON object
pub fn render_map(map: &LiteralMap) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), render(v))).collect())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn literal_kind(literal: &Literal) -> &'static str {
    match &literal.value {
        LiteralValue::Scalar(s) => scalar_kind(s),
        LiteralValue::Collection(_) => "list",
        LiteralValue::Map(_) => "map",
    }
}

fn scalar_kind(scalar: &Scalar) -> &'static str {
    match scalar {
        Scalar::None => "none",
        Scalar::Boolean(_) => "boolean",
        Scalar::Integer(_) => "integer",
        Scalar::Float(_) => "float",
        Scalar::String(_) => "string",
        Scalar::Datetime(_) => "datetime",
        Scalar::Duration(_) => "duration",
        Scalar::Binary(_) => "binary",
        Scalar::Blob(_) => "blob",
        Scalar::Generic(_) => "struct",
    }
}
