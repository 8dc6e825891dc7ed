//! Final structural check of a value against its schema.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::sanitize::{child_path, display_path};
use super::schema::Schema;

/// A single structural mismatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

impl Issue {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: display_path(path).to_string(),
            message: message.into(),
        }
    }
}

/// Check `value` against `schema`, collecting every mismatch.
///
/// Returns the checked value with undeclared object fields removed. The
/// returned value is only meaningful when `issues` stays empty.
pub fn check(value: &Value, schema: &Schema, path: &str, issues: &mut Vec<Issue>) -> Value {
    match schema {
        Schema::Object(object) => {
            let Value::Object(input) = value else {
                issues.push(Issue::new(path, format!("expected object, received {}", type_name(value))));
                return value.clone();
            };
            let mut output = Map::new();
            for field in &object.fields {
                let field_path = child_path(path, &field.name);
                match input.get(&field.name) {
                    Some(item) => {
                        output.insert(field.name.clone(), check(item, &field.schema, &field_path, issues));
                    }
                    None if field.optional => {}
                    None => issues.push(Issue::new(&field_path, "required field is missing")),
                }
            }
            Value::Object(output)
        }
        Schema::Sequence { items } => {
            let Value::Array(elements) = value else {
                issues.push(Issue::new(path, format!("expected sequence, received {}", type_name(value))));
                return value.clone();
            };
            Value::Array(
                elements
                    .iter()
                    .enumerate()
                    .map(|(index, element)| check(element, items, &child_path(path, &index.to_string()), issues))
                    .collect(),
            )
        }
        Schema::Number(bounds) => {
            match value.as_f64() {
                None => issues.push(Issue::new(path, format!("expected number, received {}", type_name(value)))),
                Some(number) => {
                    if bounds.integer && number.fract() != 0.0 {
                        issues.push(Issue::new(path, format!("expected integer, received {}", number)));
                    }
                    if let Some(min) = bounds.min {
                        if number < min {
                            issues.push(Issue::new(path, format!("{} is less than minimum {}", number, min)));
                        }
                    }
                    if let Some(max) = bounds.max {
                        if number > max {
                            issues.push(Issue::new(path, format!("{} is greater than maximum {}", number, max)));
                        }
                    }
                }
            }
            value.clone()
        }
        Schema::Enumeration { values } => {
            let matched = value
                .as_str()
                .map(|raw| values.iter().any(|allowed| allowed == raw))
                .unwrap_or(false);
            if !matched {
                issues.push(Issue::new(path, format!("expected one of {:?}, received {}", values, value)));
            }
            value.clone()
        }
        Schema::String(limits) => {
            match value.as_str() {
                None => issues.push(Issue::new(path, format!("expected string, received {}", type_name(value)))),
                Some(text) => {
                    let len = text.chars().count();
                    if let Some(min) = limits.min_length {
                        if len < min {
                            issues.push(Issue::new(path, format!("length {} is shorter than {}", len, min)));
                        }
                    }
                    if let Some(max) = limits.max_length {
                        if len > max {
                            issues.push(Issue::new(path, format!("length {} is longer than {}", len, max)));
                        }
                    }
                }
            }
            value.clone()
        }
        Schema::Boolean => {
            if !value.is_boolean() {
                issues.push(Issue::new(path, format!("expected boolean, received {}", type_name(value))));
            }
            value.clone()
        }
        Schema::Any => value.clone(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "object",
    }
}
