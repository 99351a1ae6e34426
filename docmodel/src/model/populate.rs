use super::Model;
use crate::document::Document;
use crate::error::{DocModelError, Result};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde_json::Value;
use std::sync::Arc;

/// The lookup populate needs from a referenced model.
#[async_trait]
pub trait RelatedModel: Send + Sync {
    async fn find_one(&self, id: &str) -> Result<Option<Document>>;
}

#[async_trait]
impl RelatedModel for Model {
    async fn find_one(&self, id: &str) -> Result<Option<Document>> {
        Model::find_one(self, id).await
    }
}

/// Maps the model names used in `reference` declarations to models.
pub trait RelationResolver: Send + Sync {
    fn related(&self, model: &str) -> Option<Arc<dyn RelatedModel>>;
}

impl Model {
    /// Replace reference ids on `doc` with the documents they point at.
    ///
    /// Scalar refs become the referenced document, or `null` when it does
    /// not exist. Id lists are resolved concurrently and keep their order
    /// and length, with `null` for dangling ids. Absent ref fields are left
    /// alone. Resolution is one level deep. A value whose shape does not
    /// match the declared field type is `InvalidReferenceField`.
    pub async fn populate(&self, doc: &Document, models: &dyn RelationResolver) -> Result<Document> {
        self.store()?;
        let mut populated = doc.clone();

        for (field, spec, target) in self.schema.definition().references() {
            let Some(value) = doc.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            let related = models
                .related(target)
                .ok_or_else(|| DocModelError::UnknownModel(target.to_string()))?;

            let resolved = match (spec.is_collection_ref(), value) {
                (true, Value::Array(items)) => {
                    let ids = items
                        .iter()
                        .map(|item| {
                            item.as_str()
                                .ok_or_else(|| DocModelError::InvalidReferenceField(field.to_string()))
                        })
                        .collect::<Result<Vec<&str>>>()?;
                    let found = try_join_all(ids.iter().map(|id| related.find_one(id))).await?;
                    Value::Array(
                        ids.iter()
                            .zip(found)
                            .map(|(id, doc)| self.resolved_value(field, id, doc))
                            .collect(),
                    )
                }
                (false, Value::String(id)) => {
                    let found = related.find_one(id).await?;
                    self.resolved_value(field, id, found)
                }
                _ => return Err(DocModelError::InvalidReferenceField(field.to_string())),
            };
            populated.insert(field, resolved);
        }

        Ok(populated)
    }

    fn resolved_value(&self, field: &str, id: &str, doc: Option<Document>) -> Value {
        match doc {
            Some(doc) => doc.into_value(),
            None => {
                log::warn!("{}.{}: dangling reference {}", self.name, field, id);
                Value::Null
            }
        }
    }
}
