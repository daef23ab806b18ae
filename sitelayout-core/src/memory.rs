//! In-Memory Repository
//!
//! A complete [`ContentRepository`] kept in process memory, with a JSON
//! snapshot format so the CLI can work against a store file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::id_map::{map_table, DESTINATION_ID_COLUMN, SOURCE_ID_COLUMN};
use crate::repository::{
    Condition, ContentEntity, ContentRepository, FieldItemList, RepositoryError, Row,
};

/// Serialized form of an [`InMemoryRepository`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub entities: Vec<ContentEntity>,
    /// Historical revisions, including the current ones.
    #[serde(default)]
    pub revisions: Vec<ContentEntity>,
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<Row>>,
}

#[derive(Debug, Default)]
struct State {
    entities: BTreeMap<(String, u64), ContentEntity>,
    revisions: BTreeMap<(String, u64), ContentEntity>,
    tables: BTreeMap<String, Vec<Row>>,
    next_id: u64,
    next_revision: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut state = State {
            tables: snapshot.tables,
            ..State::default()
        };
        for entity in snapshot.revisions.into_iter().chain(snapshot.entities.iter().cloned()) {
            if let Some(revision_id) = entity.revision_id {
                state.next_revision = state.next_revision.max(revision_id);
                state.revisions.insert((entity.entity_type.clone(), revision_id), entity);
            }
        }
        for entity in snapshot.entities {
            if let Some(id) = entity.id {
                state.next_id = state.next_id.max(id);
                state.entities.insert((entity.entity_type.clone(), id), entity);
            }
        }
        Self { state: Mutex::new(state) }
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, RepositoryError> {
        let state = self.lock()?;
        Ok(StoreSnapshot {
            entities: state.entities.values().cloned().collect(),
            revisions: state.revisions.values().cloned().collect(),
            tables: state.tables.clone(),
        })
    }

    /// Load a store file; a missing file is an empty store.
    pub fn load_from_path(path: &Path) -> Result<Self, RepositoryError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&content)?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn persist(&self, path: &Path) -> Result<(), RepositoryError> {
        let snapshot = self.snapshot()?;
        fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        Ok(())
    }

    pub fn insert_row(&self, table: &str, row: Row) -> Result<(), RepositoryError> {
        self.lock()?.tables.entry(table.to_string()).or_default().push(row);
        Ok(())
    }

    /// Write one map entry the way an upstream migration would after a unit completes.
    pub fn record_mapping(
        &self,
        migration_id: &str,
        source_id: &str,
        destination_id: u64,
    ) -> Result<(), RepositoryError> {
        let mut row = Row::new();
        row.insert(SOURCE_ID_COLUMN.to_string(), source_id.into());
        row.insert(DESTINATION_ID_COLUMN.to_string(), destination_id.into());
        self.insert_row(&map_table(migration_id)?, row)
    }

    /// Delete the entity and all of its revisions.
    pub fn delete(&self, entity_type: &str, id: u64) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let removed = state
            .entities
            .remove(&(entity_type.to_string(), id))
            .ok_or_else(|| RepositoryError::NotFound {
                entity_type: entity_type.to_string(),
                id,
            })?;
        let uuid = removed.uuid;
        state
            .revisions
            .retain(|(kind, _), revision| !(kind == entity_type && revision.uuid == uuid));
        Ok(())
    }

    /// Number of stored entities of a type.
    pub fn count(&self, entity_type: &str) -> Result<usize, RepositoryError> {
        Ok(self
            .lock()?
            .entities
            .keys()
            .filter(|(kind, _)| kind == entity_type)
            .count())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Backend("repository lock poisoned".to_string()))
    }
}

impl ContentRepository for InMemoryRepository {
    fn load(&self, entity_type: &str, id: u64) -> Result<Option<ContentEntity>, RepositoryError> {
        Ok(self.lock()?.entities.get(&(entity_type.to_string(), id)).cloned())
    }

    fn load_revision(
        &self,
        entity_type: &str,
        revision_id: u64,
    ) -> Result<Option<ContentEntity>, RepositoryError> {
        Ok(self
            .lock()?
            .revisions
            .get(&(entity_type.to_string(), revision_id))
            .cloned())
    }

    fn create(
        &self,
        entity_type: &str,
        bundle: &str,
        fields: BTreeMap<String, FieldItemList>,
    ) -> Result<ContentEntity, RepositoryError> {
        let mut entity = ContentEntity::new(entity_type, bundle);
        entity.fields = fields;
        Ok(entity)
    }

    fn save(&self, entity: &mut ContentEntity) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let id = match entity.id {
            Some(id) => {
                state.next_id = state.next_id.max(id);
                id
            }
            None => {
                state.next_id += 1;
                state.next_id
            }
        };
        state.next_revision += 1;
        let revision_id = state.next_revision;
        entity.id = Some(id);
        entity.revision_id = Some(revision_id);

        state
            .revisions
            .insert((entity.entity_type.clone(), revision_id), entity.clone());
        state.entities.insert((entity.entity_type.clone(), id), entity.clone());
        Ok(())
    }

    fn query(&self, table: &str, conditions: &[Condition]) -> Result<Vec<Row>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| conditions.iter().all(|c| c.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
