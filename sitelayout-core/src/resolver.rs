//! Block Resolver
//!
//! Finds or creates the content block behind one configured component.
//! `Ok(None)` means the block could not be resolved; storage failures are errors.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::config::{BlockSource, ComponentConfig, DEFAULT_TEXT_FORMAT};
use crate::id_map::MigrationMap;
use crate::repository::{
    ContentEntity, ContentRepository, FieldDefinition, FieldItem, FieldItemList, RepositoryError,
    BLOCK_CONTENT,
};

pub const BODY_FIELD: &str = "body";
pub const REUSABLE_FIELD: &str = "reusable";

/// The transformation unit being converted: its identifier and source row.
#[derive(Debug, Clone, Default)]
pub struct TransformContext {
    pub source_id: String,
    pub row: Map<String, Value>,
}

impl TransformContext {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            row: Map::new(),
        }
    }

    pub fn with_row(mut self, row: Map<String, Value>) -> Self {
        self.row = row;
        self
    }

    /// The unit identifier as a positive integer, if it is one.
    pub fn unit_id(&self) -> Option<u64> {
        self.source_id.trim().parse::<u64>().ok().filter(|id| *id > 0)
    }

    /// A row column as text; numbers are rendered, empty strings count as absent.
    pub fn row_text(&self, property: &str) -> Option<String> {
        match self.row.get(property)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

pub struct BlockResolver<'a> {
    repository: &'a dyn ContentRepository,
    map: &'a dyn MigrationMap,
}

impl<'a> BlockResolver<'a> {
    pub fn new(repository: &'a dyn ContentRepository, map: &'a dyn MigrationMap) -> Self {
        Self { repository, map }
    }

    pub fn resolve(
        &self,
        config: &ComponentConfig,
        context: &TransformContext,
    ) -> Result<Option<ContentEntity>, RepositoryError> {
        match &config.source {
            BlockSource::Migration {
                migration_id,
                source_id,
                source_property,
            } => {
                let key = match (source_id, source_property) {
                    (Some(key), _) => Some(key.to_string()),
                    (None, Some(property)) => context.row_text(property),
                    (None, None) => Some(context.source_id.clone()),
                };
                match key {
                    Some(key) => self.lookup(migration_id, &key),
                    None => {
                        tracing::debug!(?source_property, "Row has no value for the source property");
                        Ok(None)
                    }
                }
            }
            BlockSource::Existing { block_id } => self.repository.load(BLOCK_CONTENT, *block_id),
            BlockSource::Create {
                value,
                source_property,
                format,
                fields,
            } => {
                let text = value
                    .clone()
                    .or_else(|| source_property.as_deref().and_then(|p| context.row_text(p)));
                self.create(config, text, format.as_deref(), fields)
            }
        }
    }

    /// Destination block for a source id in an upstream migration's map.
    pub fn lookup(
        &self,
        migration_id: &str,
        source_id: &str,
    ) -> Result<Option<ContentEntity>, RepositoryError> {
        let Some(block_id) = self.map.lookup(migration_id, source_id)? else {
            tracing::debug!(%migration_id, %source_id, "No map entry");
            return Ok(None);
        };
        let block = self.repository.load(BLOCK_CONTENT, block_id)?;
        if block.is_none() {
            tracing::debug!(%migration_id, %source_id, block_id, "Mapped block no longer exists");
        }
        Ok(block)
    }

    // Each call creates and saves a new block; there is no dedup key.
    fn create(
        &self,
        config: &ComponentConfig,
        text: Option<String>,
        format: Option<&str>,
        literal: &Map<String, Value>,
    ) -> Result<Option<ContentEntity>, RepositoryError> {
        if text.is_none() && literal.is_empty() {
            tracing::debug!(block_type = %config.block_type, "Nothing to create the block from");
            return Ok(None);
        }

        let mut fields: BTreeMap<String, FieldItemList> = literal
            .iter()
            .map(|(name, value)| (name.clone(), literal_field(value)))
            .collect();

        if let Some(text) = text {
            let mut item = FieldItem::new();
            item.insert("value".to_string(), Value::String(text));
            item.insert(
                "format".to_string(),
                Value::String(format.unwrap_or(DEFAULT_TEXT_FORMAT).to_string()),
            );
            fields.insert(
                BODY_FIELD.to_string(),
                FieldItemList::new(FieldDefinition::new("text_with_summary"), vec![item]),
            );
        }

        let mut reusable = FieldItem::new();
        reusable.insert("value".to_string(), Value::Bool(false));
        fields.insert(
            REUSABLE_FIELD.to_string(),
            FieldItemList::new(FieldDefinition::base("boolean"), vec![reusable]),
        );

        let mut block = self.repository.create(BLOCK_CONTENT, &config.block_type, fields)?;
        block.label = Some(config.label.clone().unwrap_or_else(|| config.block_type.clone()));
        self.repository.save(&mut block)?;

        tracing::debug!(block_type = %config.block_type, id = ?block.id, "Created inline block");
        Ok(Some(block))
    }
}

/// Field items from a literal configuration value, typed by shape.
fn literal_field(value: &Value) -> FieldItemList {
    let items: Vec<FieldItem> = match value {
        Value::Array(values) => values.iter().map(literal_item).collect(),
        Value::Null => vec![],
        other => vec![literal_item(other)],
    };

    let field_type = match items.first() {
        Some(item) if item.contains_key("uri") => "link",
        Some(item) if item.contains_key("format") => "text_long",
        Some(item) if item.contains_key("target_id") => "entity_reference",
        _ => "string",
    };
    FieldItemList::new(FieldDefinition::new(field_type), items)
}

fn literal_item(value: &Value) -> FieldItem {
    match value {
        Value::Object(item) => item.clone(),
        scalar => {
            let mut item = FieldItem::new();
            item.insert("value".to_string(), scalar.clone());
            item
        }
    }
}
