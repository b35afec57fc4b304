//! # Parameter Coercion
//!
//! Path, query, header, and cookie values arrive as strings. Before schema
//! validation they are converted to JSON values according to the declared
//! primitive type, so `?limit=200` validates as the integer `200`.

use serde_json::{Number, Value};

use crate::compile::CompiledSchema;
use crate::operation::{Parameter, ParameterEncoding};

/// Convert raw occurrences of a parameter into a JSON value.
///
/// `raw` holds every occurrence in request order (repeated query keys,
/// repeated headers). Non-array schemas use the first occurrence.
pub fn coerce_parameter(param: &Parameter, raw: &[String]) -> Result<Value, String> {
    let first = raw.first().map(String::as_str).unwrap_or_default();
    match param.encoding {
        ParameterEncoding::Json => serde_json::from_str(first)
            .map_err(|_| format!("value {first}: an invalid JSON")),
        ParameterEncoding::Schema => match param.schema.as_ref() {
            Some(schema) if schema.primitive_type() == Some("array") => {
                coerce_array(schema, raw, param.explode)
            }
            schema => coerce_scalar(first, schema.and_then(CompiledSchema::primitive_type)),
        },
    }
}

/// Convert a single string according to a primitive type name.
pub fn coerce_scalar(raw: &str, primitive: Option<&str>) -> Result<Value, String> {
    match primitive {
        Some("integer") => raw
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| raw.parse::<u64>().map(Value::from))
            .map_err(|_| format!("value {raw}: an invalid integer: invalid syntax")),
        Some("number") => match raw.parse::<i64>() {
            Ok(i) => Ok(Value::from(i)),
            Err(_) => raw
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("value {raw}: an invalid number: invalid syntax")),
        },
        Some("boolean") => match raw {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(format!("value {raw}: an invalid boolean: invalid syntax")),
        },
        Some("object") if raw.trim_start().starts_with('{') => {
            serde_json::from_str(raw).map_err(|_| format!("value {raw}: an invalid object"))
        }
        _ => Ok(Value::String(raw.to_string())),
    }
}

fn coerce_array(schema: &CompiledSchema, raw: &[String], explode: bool) -> Result<Value, String> {
    let items: Vec<&str> = if explode && raw.len() > 1 {
        raw.iter().map(String::as_str).collect()
    } else {
        raw.iter().flat_map(|value| value.split(',')).collect()
    };
    items
        .into_iter()
        .filter(|item| !item.is_empty())
        .map(|item| coerce_scalar(item, schema.item_type()))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}
