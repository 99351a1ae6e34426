mod parser;
mod types;

pub use parser::{parse_schema, parse_schema_str, FieldDefinition, IdConfig, ModelDefinition, SchemaFile};
pub use types::{
    DefaultValue, FieldSpec, FieldType, Producer, SchemaDefinition, Validator, Verdict,
};

use crate::document::Document;
use crate::validation::{self, ValidationResult};

/// Validation and default rules for one entity type. Immutable once built.
#[derive(Debug, Clone)]
pub struct Schema {
    definition: SchemaDefinition,
}

impl Schema {
    pub fn new(definition: SchemaDefinition) -> Self {
        Self { definition }
    }

    pub fn definition(&self) -> &SchemaDefinition {
        &self.definition
    }

    pub fn validate(&self, data: &Document) -> ValidationResult {
        validation::validate_document(&self.definition, data)
    }

    pub fn apply_defaults<'a>(&self, data: &'a mut Document) -> &'a mut Document {
        validation::apply_defaults(&self.definition, data)
    }
}

impl From<SchemaDefinition> for Schema {
    fn from(definition: SchemaDefinition) -> Self {
        Self::new(definition)
    }
}
