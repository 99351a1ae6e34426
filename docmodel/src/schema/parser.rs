use super::types::{FieldSpec, FieldType, SchemaDefinition, Verdict};
use crate::error::{DocModelError, Result};
use crate::id::IdStrategy;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Top-level model declarations parsed from schema.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaFile {
    #[serde(default)]
    pub id: Option<IdConfig>,
    #[serde(default)]
    pub models: IndexMap<String, ModelDefinition>,
}

/// Configuration for document ID generation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdConfig {
    #[serde(default)]
    pub auto: Option<IdStrategy>,
}

/// Definition of a single model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default)]
    pub fields: IndexMap<String, FieldDefinition>,
}

/// Declarative form of a single field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

/// Parse a schema.yaml file into a SchemaFile
pub fn parse_schema(path: &Path) -> Result<SchemaFile> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content)
}

/// Parse a schema YAML string into a SchemaFile
pub fn parse_schema_str(content: &str) -> Result<SchemaFile> {
    let schema: SchemaFile = serde_yaml::from_str(content)?;
    schema.check()?;
    Ok(schema)
}

impl SchemaFile {
    pub fn id_strategy(&self) -> IdStrategy {
        self.id.as_ref().and_then(|c| c.auto).unwrap_or_default()
    }

    /// Compile the declarations of one model into a SchemaDefinition.
    pub fn definition(&self, model: &str) -> Result<SchemaDefinition> {
        let model_def = self
            .models
            .get(model)
            .ok_or_else(|| DocModelError::Schema(format!("Model '{model}' not declared")))?;

        model_def
            .fields
            .iter()
            .map(|(name, field)| Ok((name.clone(), field.to_spec(name)?)))
            .collect()
    }

    fn check(&self) -> Result<()> {
        for (model, model_def) in &self.models {
            for (name, field) in &model_def.fields {
                if let Some(target) = &field.reference {
                    if !self.models.contains_key(target) {
                        return Err(DocModelError::Schema(format!(
                            "Field '{model}.{name}' references undeclared model '{target}'"
                        )));
                    }
                }
                field.to_spec(name).map_err(|e| match e {
                    DocModelError::Schema(msg) => DocModelError::Schema(format!("{model}: {msg}")),
                    other => other,
                })?;
            }
        }
        Ok(())
    }
}

impl FieldDefinition {
    /// Build the runtime spec. `enum`, `pattern`, `min` and `max` become the
    /// field's custom validator; the first failing constraint is reported.
    pub fn to_spec(&self, name: &str) -> Result<FieldSpec> {
        let mut spec = FieldSpec::new(self.field_type);
        spec.required = self.required;
        if let Some(default) = &self.default {
            spec = spec.default_value(default.clone());
        }
        if let Some(target) = &self.reference {
            spec = spec.references(target.clone());
        }

        let string_rules = self.enum_values.is_some() || self.pattern.is_some();
        if string_rules && self.field_type != FieldType::String {
            return Err(DocModelError::Schema(format!(
                "Field '{name}': enum and pattern apply to string fields only"
            )));
        }
        let number_rules = self.min.is_some() || self.max.is_some();
        if number_rules && self.field_type != FieldType::Number {
            return Err(DocModelError::Schema(format!(
                "Field '{name}': min and max apply to number fields only"
            )));
        }
        if !string_rules && !number_rules {
            return Ok(spec);
        }

        let pattern = match &self.pattern {
            Some(p) => Some(Regex::new(p).map_err(|e| {
                DocModelError::Schema(format!("Field '{name}': invalid pattern: {e}"))
            })?),
            None => None,
        };
        let rules = Constraints {
            field: name.to_string(),
            enum_values: self.enum_values.clone(),
            pattern,
            min: self.min,
            max: self.max,
        };
        Ok(spec.validate(move |v| rules.check(v)))
    }
}

struct Constraints {
    field: String,
    enum_values: Option<Vec<String>>,
    pattern: Option<Regex>,
    min: Option<f64>,
    max: Option<f64>,
}

impl Constraints {
    fn check(&self, value: &Value) -> Verdict {
        let field = &self.field;
        if let Some(s) = value.as_str() {
            if let Some(allowed) = &self.enum_values {
                if !allowed.iter().any(|a| a == s) {
                    return Verdict::Invalid(Some(format!(
                        "Field \"{field}\" must be one of: {}",
                        allowed.join(", ")
                    )));
                }
            }
            if let Some(re) = &self.pattern {
                if !re.is_match(s) {
                    return Verdict::Invalid(Some(format!(
                        "Field \"{field}\" does not match pattern {}",
                        re.as_str()
                    )));
                }
            }
        }
        if let Some(n) = value.as_f64() {
            if let Some(min) = self.min {
                if n < min {
                    return Verdict::Invalid(Some(format!("Field \"{field}\" must be at least {min}")));
                }
            }
            if let Some(max) = self.max {
                if n > max {
                    return Verdict::Invalid(Some(format!("Field \"{field}\" must be at most {max}")));
                }
            }
        }
        Verdict::Valid
    }
}
