use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Semantic kind of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    /// Structural kind check. Arrays are never objects.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a custom field validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    /// Failure with an optional message. `None` (or an empty message) is
    /// reported as "Validation failed".
    Invalid(Option<String>),
}

impl From<bool> for Verdict {
    fn from(ok: bool) -> Self {
        if ok {
            Verdict::Valid
        } else {
            Verdict::Invalid(None)
        }
    }
}

impl From<Result<(), String>> for Verdict {
    fn from(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Verdict::Valid,
            Err(msg) => Verdict::Invalid(Some(msg)),
        }
    }
}

pub type Validator = Arc<dyn Fn(&Value) -> Verdict + Send + Sync>;
pub type Producer = Arc<dyn Fn() -> Value + Send + Sync>;

/// Value used for an absent field.
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    Producer(Producer),
}

impl DefaultValue {
    pub fn produce(&self) -> Value {
        match self {
            DefaultValue::Literal(v) => v.clone(),
            DefaultValue::Producer(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            DefaultValue::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// Rules for one field.
#[derive(Clone)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<DefaultValue>,
    pub validator: Option<Validator>,
    /// Name of the model this field points at. A scalar ref holds one id,
    /// an `array` ref holds an ordered list of ids.
    pub reference: Option<String>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            default: None,
            validator: None,
            reference: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn array() -> Self {
        Self::new(FieldType::Array)
    }

    pub fn object() -> Self {
        Self::new(FieldType::Object)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(DefaultValue::Literal(value));
        self
    }

    pub fn default_with<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Producer(Arc::new(producer)));
        self
    }

    pub fn validate<F, R>(mut self, check: F) -> Self
    where
        F: Fn(&Value) -> R + Send + Sync + 'static,
        R: Into<Verdict>,
    {
        self.validator = Some(Arc::new(move |v| check(v).into()));
        self
    }

    pub fn references(mut self, model: impl Into<String>) -> Self {
        self.reference = Some(model.into());
        self
    }

    pub fn is_collection_ref(&self) -> bool {
        self.reference.is_some() && self.field_type == FieldType::Array
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("field_type", &self.field_type)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("validator", &self.validator.as_ref().map(|_| ".."))
            .field("reference", &self.reference)
            .finish()
    }
}

/// Ordered field declarations for one entity type. Declaration order is
/// the order validation errors are reported in.
#[derive(Debug, Clone, Default)]
pub struct SchemaDefinition {
    fields: IndexMap<String, FieldSpec>,
}

impl SchemaDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Fields carrying a `reference`, in declaration order.
    pub fn references(&self) -> impl Iterator<Item = (&str, &FieldSpec, &str)> {
        self.fields
            .iter()
            .filter_map(|(k, v)| v.reference.as_deref().map(|r| (k.as_str(), v, r)))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, FieldSpec)> for SchemaDefinition {
    fn from_iter<I: IntoIterator<Item = (String, FieldSpec)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
