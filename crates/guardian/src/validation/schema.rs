//! Declarative schema nodes.
//!
//! A [`Schema`] is an explicit tagged union over the shapes the validator
//! understands. Schemas can be built in code or deserialized from JSON:
//!
//! ```
//! use guardian_core::validation::Schema;
//!
//! let schema: Schema = serde_json::from_value(serde_json::json!({
//!     "kind": "object",
//!     "fields": [
//!         { "name": "qty", "schema": { "kind": "number", "min": 0, "max": 10 } },
//!         { "name": "tier", "schema": { "kind": "enumeration", "values": ["a", "b"] }, "optional": true }
//!     ]
//! })).unwrap();
//! assert_eq!(schema.kind_name(), "object");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema node, dispatched by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Schema {
    /// Keyed map with declared fields; undeclared input fields are dropped.
    Object(ObjectSchema),
    /// Homogeneous sequence of `items`.
    Sequence { items: Box<Schema> },
    /// Number with optional inclusive bounds.
    Number(NumberSchema),
    /// One of a fixed set of string values.
    Enumeration { values: Vec<String> },
    String(StringSchema),
    Boolean,
    /// Accepts any value unchanged.
    Any,
}

impl Schema {
    pub fn object() -> ObjectSchema {
        ObjectSchema::default()
    }

    pub fn sequence(items: impl Into<Schema>) -> Schema {
        Schema::Sequence {
            items: Box::new(items.into()),
        }
    }

    pub fn number() -> NumberSchema {
        NumberSchema::default()
    }

    pub fn enumeration<I, S>(values: I) -> Schema
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Schema::Enumeration {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn string() -> StringSchema {
        StringSchema::default()
    }

    pub fn boolean() -> Schema {
        Schema::Boolean
    }

    pub fn any() -> Schema {
        Schema::Any
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Schema::Object(_) => "object",
            Schema::Sequence { .. } => "sequence",
            Schema::Number(_) => "number",
            Schema::Enumeration { .. } => "enumeration",
            Schema::String(_) => "string",
            Schema::Boolean => "boolean",
            Schema::Any => "any",
        }
    }

    /// JSON description of the schema, used as the `expected` side of errors.
    pub fn describe(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::String(self.kind_name().to_string()))
    }
}

/// Declared field of an [`ObjectSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl ObjectSchema {
    /// Declare a required field.
    pub fn field(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.fields.push(Field {
            name: name.into(),
            schema: schema.into(),
            optional: false,
        });
        self
    }

    /// Declare a field that may be absent.
    pub fn optional_field(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.fields.push(Field {
            name: name.into(),
            schema: schema.into(),
            optional: true,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Reject values with a fractional part.
    #[serde(default)]
    pub integer: bool,
}

impl NumberSchema {
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn integer(mut self) -> Self {
        self.integer = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl StringSchema {
    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(len);
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }
}

impl From<ObjectSchema> for Schema {
    fn from(schema: ObjectSchema) -> Self {
        Schema::Object(schema)
    }
}

impl From<NumberSchema> for Schema {
    fn from(schema: NumberSchema) -> Self {
        Schema::Number(schema)
    }
}

impl From<StringSchema> for Schema {
    fn from(schema: StringSchema) -> Self {
        Schema::String(schema)
    }
}
