//! Best-effort coercion of untyped input toward a schema.
//!
//! Nothing in here rejects. Every change is recorded as a warning; whatever
//! cannot be repaired is left for the structural check to report.

use serde_json::{Map, Number, Value};

use super::schema::{NumberSchema, Schema};

/// Trim strings and turn `"true"`/`"false"` (any case) into booleans,
/// recursing through sequences and maps.
pub fn preprocess(value: &Value, path: &str, warnings: &mut Vec<String>) -> Value {
    match value {
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.eq_ignore_ascii_case("true") {
                warnings.push(format!("{}: coerced string {:?} to boolean true", display_path(path), raw));
                Value::Bool(true)
            } else if trimmed.eq_ignore_ascii_case("false") {
                warnings.push(format!("{}: coerced string {:?} to boolean false", display_path(path), raw));
                Value::Bool(false)
            } else {
                Value::String(trimmed.to_string())
            }
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(index, item)| preprocess(item, &child_path(path, &index.to_string()), warnings))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), preprocess(item, &child_path(path, key), warnings)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Reshape `value` to match the declared kind of `schema`.
pub fn sanitize(value: &Value, schema: &Schema, path: &str, warnings: &mut Vec<String>) -> Value {
    match schema {
        Schema::Object(object) => match value {
            Value::Object(input) => {
                let mut output = Map::new();
                for field in &object.fields {
                    if let Some(item) = input.get(&field.name) {
                        let sanitized = sanitize(item, &field.schema, &child_path(path, &field.name), warnings);
                        output.insert(field.name.clone(), sanitized);
                    }
                }
                Value::Object(output)
            }
            other => other.clone(),
        },
        Schema::Sequence { items } => match value {
            Value::Array(elements) => Value::Array(
                elements
                    .iter()
                    .enumerate()
                    .map(|(index, element)| sanitize(element, items, &child_path(path, &index.to_string()), warnings))
                    .collect(),
            ),
            other => other.clone(),
        },
        Schema::Number(bounds) => sanitize_number(value, bounds, path, warnings),
        Schema::Enumeration { values } => sanitize_enum(value, values, path, warnings),
        Schema::String(_) | Schema::Boolean | Schema::Any => value.clone(),
    }
}

fn sanitize_number(value: &Value, bounds: &NumberSchema, path: &str, warnings: &mut Vec<String>) -> Value {
    let (number, mut output) = match value {
        Value::Number(n) => match n.as_f64() {
            Some(number) => (number, value.clone()),
            None => return value.clone(),
        },
        Value::String(raw) => match raw.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => {
                warnings.push(format!("{}: parsed numeric string {:?}", display_path(path), raw));
                (number, number_value(number))
            }
            _ => return value.clone(),
        },
        _ => return value.clone(),
    };

    if let Some(min) = bounds.min {
        if number < min {
            warnings.push(format!("{}: clamped {} to minimum {}", display_path(path), number, min));
            output = number_value(min);
        }
    }
    if let Some(max) = bounds.max {
        if number > max {
            warnings.push(format!("{}: clamped {} to maximum {}", display_path(path), number, max));
            output = number_value(max);
        }
    }

    output
}

// TODO: falling back to the first declared value hides bad input; surface it
// as an error once consumers can handle rejected enum fields.
fn sanitize_enum(value: &Value, values: &[String], path: &str, warnings: &mut Vec<String>) -> Value {
    let Some(first) = values.first() else {
        return value.clone();
    };

    if let Value::String(raw) = value {
        if values.iter().any(|allowed| allowed == raw) {
            return value.clone();
        }
        if let Some(matched) = values.iter().find(|allowed| allowed.eq_ignore_ascii_case(raw)) {
            warnings.push(format!("{}: normalized {:?} to {:?}", display_path(path), raw, matched));
            return Value::String(matched.clone());
        }
    }

    warnings.push(format!(
        "{}: {} is not one of {:?}, defaulted to {:?}",
        display_path(path),
        value,
        values,
        first
    ));
    Value::String(first.clone())
}

/// Keep whole numbers integral so `10` stays `10` and not `10.0`.
pub(crate) fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number >= i64::MIN as f64 && number <= i64::MAX as f64 {
        Value::from(number as i64)
    } else {
        Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null)
    }
}

pub(crate) fn child_path(parent: &str, segment: &str) -> String {
    format!("{}/{}", parent, segment)
}

pub(crate) fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}
