use crate::document::Document;
use crate::error::{DocModelError, Result};
use crate::schema::{FieldSpec, FieldType, SchemaDefinition, Verdict};
use serde_json::Value;

const FALLBACK_MESSAGE: &str = "Validation failed";

/// Result of validating a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.valid() {
            Ok(())
        } else {
            Err(DocModelError::ValidationFailed(self.errors))
        }
    }
}

/// Validate a document against a definition.
///
/// Every declared field is checked in declaration order and errors accumulate
/// across fields. Within one field a required or type failure ends that
/// field's checks; the reference-shape and custom checks both run otherwise.
pub fn validate_document(definition: &SchemaDefinition, data: &Document) -> ValidationResult {
    let mut result = ValidationResult::default();

    for (field_name, spec) in definition.iter() {
        let value = data.get(field_name).filter(|v| !v.is_null());

        if spec.required && is_blank(value) {
            result.errors.push(format!("Field \"{field_name}\" is required"));
            continue;
        }

        let Some(value) = value else {
            continue;
        };

        if !spec.field_type.matches(value) {
            result.errors.push(format!(
                "Field \"{field_name}\" must be of type {}",
                spec.field_type
            ));
            continue;
        }

        if spec.reference.is_some() {
            if let Some(message) = check_reference_shape(field_name, spec, value) {
                result.errors.push(message);
            }
        }

        if let Some(validator) = &spec.validator {
            if let Verdict::Invalid(message) = validator(value) {
                result.errors.push(
                    message
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string()),
                );
            }
        }
    }

    result
}

/// Fill absent fields from their declared defaults. Fields that already hold
/// a value are never touched, so applying twice changes nothing.
pub fn apply_defaults<'a>(definition: &SchemaDefinition, data: &'a mut Document) -> &'a mut Document {
    for (field_name, spec) in definition.iter() {
        if data.has(field_name) {
            continue;
        }
        if let Some(default) = &spec.default {
            data.insert(field_name, default.produce());
        }
    }
    data
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn check_reference_shape(field_name: &str, spec: &FieldSpec, value: &Value) -> Option<String> {
    if spec.field_type == FieldType::Array {
        let all_ids = value
            .as_array()
            .map(|items| items.iter().all(Value::is_string))
            .unwrap_or(false);
        (!all_ids).then(|| format!("Field \"{field_name}\" must be a list of document ids"))
    } else {
        (!value.is_string()).then(|| format!("Field \"{field_name}\" must be a document id"))
    }
}
