use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::definition::Extra;

/// Built-in value transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransformationType {
    FormatDate,
    FormatNumber,
    StringUppercase,
    StringLowercase,
    StringTrim,
    MathAdd,
    MathSubtract,
    MathMultiply,
    MathDivide,
    CustomFunction,
}

/// Copies a context value into the output object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(default)]
    pub id: String,
    /// Context path to read.
    #[serde(default)]
    pub source: String,
    /// Output path to write.
    #[serde(default)]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<TransformationType>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl FieldMapping {
    /// Creates a mapping from `source` to `target`.
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            transformation: None,
            extra: Extra::new(),
        }
    }

    /// Applies a transformation to the copied value.
    #[must_use]
    pub fn with_transformation(mut self, transformation: TransformationType) -> Self {
        self.transformation = Some(transformation);
        self
    }
}

/// Transformation applied to a field of the output object after mapping.
///
/// `config.field` names the output path to rewrite; the remaining keys are
/// transformation arguments (`value`, `decimals`, `format`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub transformation_type: TransformationType,
    #[serde(default)]
    pub config: Extra,
}

impl Transformation {
    /// Creates a transformation of the given output field.
    pub fn new(
        id: impl Into<String>,
        transformation_type: TransformationType,
        field: impl Into<String>,
    ) -> Self {
        let mut config = Extra::new();
        config.insert("field".to_owned(), Value::String(field.into()));
        Self {
            id: id.into(),
            transformation_type,
            config,
        }
    }

    /// Sets a transformation argument.
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Returns the output path this transformation rewrites.
    pub fn field(&self) -> Option<&str> {
        ["field", "target"]
            .iter()
            .find_map(|key| self.config.get(*key).and_then(Value::as_str))
            .filter(|field| !field.is_empty())
    }
}

/// JSON type accepted by a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl SchemaType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Null => value.is_null(),
        }
    }
}

/// Minimal structural schema used to check transform input and output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Schema {
    /// Creates a schema accepting values of the given type.
    pub fn of(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Self::default()
        }
    }

    /// Adds a property schema.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Marks a property as required.
    #[must_use]
    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Checks a value against the schema, returning the first violation.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        self.check_at("$", value)
    }

    fn check_at(&self, at: &str, value: &Value) -> Result<(), String> {
        if let Some(expected) = self.schema_type
            && !expected.accepts(value)
        {
            return Err(format!("{at}: expected {expected}, found {}", kind_of(value)));
        }

        if let Value::Object(map) = value {
            if let Some(missing) = self.required.iter().find(|key| !map.contains_key(*key)) {
                return Err(format!("{at}: missing required property `{missing}`"));
            }
            for (key, schema) in &self.properties {
                if let Some(child) = map.get(key) {
                    schema.check_at(&format!("{at}.{key}"), child)?;
                }
            }
        }

        if let (Value::Array(items), Some(schema)) = (value, &self.items) {
            for (index, item) in items.iter().enumerate() {
                schema.check_at(&format!("{at}[{index}]"), item)?;
            }
        }

        Ok(())
    }
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

/// Payload of a `data_transform` node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformData {
    #[serde(default, alias = "input_schema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Schema>,
    #[serde(default, alias = "output_schema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Schema>,
    #[serde(default)]
    pub mappings: Vec<FieldMapping>,
    #[serde(default)]
    pub transformations: Vec<Transformation>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl TransformData {
    /// Creates an empty transform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mapping.
    #[must_use]
    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    /// Adds a transformation.
    #[must_use]
    pub fn with_transformation(mut self, transformation: Transformation) -> Self {
        self.transformations.push(transformation);
        self
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Schema) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Sets the output schema.
    #[must_use]
    pub fn with_output_schema(mut self, schema: Schema) -> Self {
        self.output_schema = Some(schema);
        self
    }
}
