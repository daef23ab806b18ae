//! Content Repository - Storage Boundary
//!
//! The engine never reaches into ambient storage. Every component receives a
//! `&dyn ContentRepository` and works only through these five operations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Entity type for content blocks placed into layouts.
pub const BLOCK_CONTENT: &str = "block_content";

/// A single field item: a property map (`value`, `format`, `uri`, `target_id`, ...).
pub type FieldItem = Map<String, Value>;

/// A row returned by [`ContentRepository::query`].
pub type Row = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("entity not found: {entity_type}/{id}")]
    NotFound { entity_type: String, id: u64 },

    #[error("invalid migration id: {0}")]
    InvalidMigrationId(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FieldDefinition {
    pub field_type: String,
    #[serde(default)]
    pub configurable: bool,
    #[serde(default)]
    pub display_configurable: bool,
    /// Referenced entity type for reference fields.
    #[serde(default)]
    pub target_type: Option<String>,
}

impl FieldDefinition {
    pub fn new(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            configurable: true,
            display_configurable: true,
            target_type: None,
        }
    }

    /// A base field that is neither configurable nor shown on displays.
    pub fn base(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            configurable: false,
            display_configurable: false,
            target_type: None,
        }
    }

    pub fn targeting(mut self, target_type: impl Into<String>) -> Self {
        self.target_type = Some(target_type.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FieldItemList {
    pub definition: FieldDefinition,
    #[serde(default)]
    pub items: Vec<FieldItem>,
}

impl FieldItemList {
    pub fn new(definition: FieldDefinition, items: Vec<FieldItem>) -> Self {
        Self { definition, items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&FieldItem> {
        self.items.first()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentEntity {
    pub entity_type: String,
    /// Assigned on first save.
    #[serde(default)]
    pub id: Option<u64>,
    /// Assigned on every save.
    #[serde(default)]
    pub revision_id: Option<u64>,
    pub uuid: Uuid,
    pub bundle: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldItemList>,
}

impl ContentEntity {
    /// An unsaved entity with a fresh UUID and no fields.
    pub fn new(entity_type: impl Into<String>, bundle: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: None,
            revision_id: None,
            uuid: Uuid::new_v4(),
            bundle: bundle.into(),
            label: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, list: FieldItemList) -> Self {
        self.fields.insert(name.into(), list);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldItemList> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, list: FieldItemList) {
        self.fields.insert(name.into(), list);
    }
}

/// Read an id stored as a number or numeric string.
pub fn id_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Equality condition for [`ContentRepository::query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub value: Value,
}

impl Condition {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match row.get(&self.field) {
            Some(v) => values_equal(v, &self.value),
            None => false,
        }
    }
}

// Map tables store ids as text or integers depending on the source plugin.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s == &n.to_string()
        }
        _ => a == b,
    }
}

/// Destination content store.
///
/// `create` builds an unsaved entity; nothing is persisted until `save`.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
pub trait ContentRepository {
    /// Load the current revision of an entity. `Ok(None)` when it does not exist.
    fn load(&self, entity_type: &str, id: u64) -> Result<Option<ContentEntity>, RepositoryError>;

    /// Load a specific historical revision. `Ok(None)` when it no longer exists.
    fn load_revision(
        &self,
        entity_type: &str,
        revision_id: u64,
    ) -> Result<Option<ContentEntity>, RepositoryError>;

    fn create(
        &self,
        entity_type: &str,
        bundle: &str,
        fields: BTreeMap<String, FieldItemList>,
    ) -> Result<ContentEntity, RepositoryError>;

    /// Persist the entity as a new revision, assigning ids as needed.
    fn save(&self, entity: &mut ContentEntity) -> Result<(), RepositoryError>;

    fn query(&self, table: &str, conditions: &[Condition]) -> Result<Vec<Row>, RepositoryError>;
}
