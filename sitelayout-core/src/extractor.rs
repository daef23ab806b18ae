//! Field Value Extractor
//!
//! Turns an entity's fields into portable values that can be merged into
//! another entity. Empty fields are left out rather than emitted as null, so a
//! merge never overwrites existing data with nothing.

use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::model::{FieldValue, PortableBlock};
use crate::repository::{id_value, ContentEntity, ContentRepository, FieldDefinition, FieldItem, FieldItemList, RepositoryError};

pub const CONTENT_FIELD_PREFIX: &str = "field_";
pub const DEFAULT_MAX_DEPTH: usize = 16;
const DEFAULT_NESTED_TARGET: &str = "paragraph";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Formatted,
    Link,
    Scalar,
    Nested,
    Other,
}

impl FieldKind {
    pub fn of(field_type: &str) -> Self {
        match field_type {
            "text" | "text_long" | "text_with_summary" => FieldKind::Formatted,
            "link" => FieldKind::Link,
            "string" | "string_long" | "boolean" | "integer" | "decimal" | "float" | "email"
            | "telephone" | "list_string" | "list_integer" | "list_float" | "timestamp"
            | "datetime" => FieldKind::Scalar,
            "entity_reference_revisions" => FieldKind::Nested,
            _ => FieldKind::Other,
        }
    }
}

/// Whether a field belongs to the entity's authored surface.
pub fn is_extractable(name: &str, definition: &FieldDefinition) -> bool {
    definition.configurable || definition.display_configurable || name.starts_with(CONTENT_FIELD_PREFIX)
}

pub type ExtractedFields = BTreeMap<String, FieldValue>;

pub struct FieldValueExtractor<'a> {
    repository: &'a dyn ContentRepository,
    max_depth: usize,
}

impl<'a> FieldValueExtractor<'a> {
    pub fn new(repository: &'a dyn ContentRepository) -> Self {
        Self {
            repository,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Nesting levels followed below the entity passed to [`Self::extract`].
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn extract(&self, entity: &ContentEntity) -> Result<ExtractedFields, RepositoryError> {
        let mut ancestors = Vec::new();
        self.extract_fields(entity, 0, &mut ancestors)
    }

    pub fn extract_block(&self, entity: &ContentEntity) -> Result<PortableBlock, RepositoryError> {
        Ok(PortableBlock {
            block_type: entity.bundle.clone(),
            fields: self.extract(entity)?,
        })
    }

    fn extract_fields(
        &self,
        entity: &ContentEntity,
        depth: usize,
        ancestors: &mut Vec<(String, Uuid)>,
    ) -> Result<ExtractedFields, RepositoryError> {
        ancestors.push((entity.entity_type.clone(), entity.uuid));

        let mut extracted = ExtractedFields::new();
        for (name, list) in &entity.fields {
            if !is_extractable(name, &list.definition) {
                continue;
            }
            if let Some(value) = self.extract_field(list, depth, ancestors)? {
                extracted.insert(name.clone(), value);
            }
        }

        ancestors.pop();
        Ok(extracted)
    }

    fn extract_field(
        &self,
        list: &FieldItemList,
        depth: usize,
        ancestors: &mut Vec<(String, Uuid)>,
    ) -> Result<Option<FieldValue>, RepositoryError> {
        let Some(first) = list.first() else {
            return Ok(None);
        };

        let value = match FieldKind::of(&list.definition.field_type) {
            FieldKind::Formatted => text(first, "value").map(|value| FieldValue::Formatted {
                value,
                format: text(first, "format"),
            }),
            FieldKind::Link => text(first, "uri").map(|uri| FieldValue::Link {
                uri,
                title: text(first, "title"),
            }),
            FieldKind::Scalar => first
                .get("value")
                .filter(|v| !is_empty(v))
                .cloned()
                .map(FieldValue::Scalar),
            FieldKind::Nested => {
                let children = self.extract_children(list, depth, ancestors)?;
                (!children.is_empty()).then_some(FieldValue::Nested(children))
            }
            FieldKind::Other => {
                let mut values: Vec<Value> = list.items.iter().filter_map(main_property).collect();
                match values.len() {
                    0 => None,
                    1 if list.items.len() == 1 => values.pop().map(FieldValue::Scalar),
                    _ => Some(FieldValue::List(values)),
                }
            }
        };

        Ok(value)
    }

    fn extract_children(
        &self,
        list: &FieldItemList,
        depth: usize,
        ancestors: &mut Vec<(String, Uuid)>,
    ) -> Result<Vec<PortableBlock>, RepositoryError> {
        let target_type = list
            .definition
            .target_type
            .as_deref()
            .unwrap_or(DEFAULT_NESTED_TARGET);

        let mut children = Vec::new();
        for item in &list.items {
            let Some(child) = self.load_reference(target_type, item)? else {
                tracing::debug!(%target_type, ?item, "Skipping unloadable nested reference");
                continue;
            };

            if ancestors.contains(&(child.entity_type.clone(), child.uuid)) {
                tracing::warn!(
                    entity_type = %child.entity_type,
                    uuid = %child.uuid,
                    "Nested reference cycle; child not extracted"
                );
                continue;
            }
            if depth >= self.max_depth {
                tracing::warn!(
                    entity_type = %child.entity_type,
                    uuid = %child.uuid,
                    max_depth = self.max_depth,
                    "Nesting depth limit reached; child not extracted"
                );
                continue;
            }

            children.push(PortableBlock {
                block_type: child.bundle.clone(),
                fields: self.extract_fields(&child, depth + 1, ancestors)?,
            });
        }
        Ok(children)
    }

    // Pinned revision first; the live entity when the item carries only an id.
    fn load_reference(
        &self,
        target_type: &str,
        item: &FieldItem,
    ) -> Result<Option<ContentEntity>, RepositoryError> {
        if let Some(revision_id) = item.get("target_revision_id").and_then(id_value) {
            if let Some(entity) = self.repository.load_revision(target_type, revision_id)? {
                return Ok(Some(entity));
            }
        }
        match item.get("target_id").and_then(id_value) {
            Some(id) => self.repository.load(target_type, id),
            None => Ok(None),
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn text(item: &FieldItem, property: &str) -> Option<String> {
    item.get(property)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn main_property(item: &FieldItem) -> Option<Value> {
    item.get("value")
        .or_else(|| item.get("target_id"))
        .or_else(|| item.values().next())
        .filter(|v| !is_empty(v))
        .cloned()
}
