//! Migration-Map Index
//!
//! Read-only view of the per-migration id maps written by the owning pipeline.
//! A miss is `Ok(None)`: no destination object exists yet for that source row.

use crate::repository::{id_value, Condition, ContentRepository, RepositoryError};

pub const MAP_TABLE_PREFIX: &str = "migrate_map_";
pub const SOURCE_ID_COLUMN: &str = "sourceid1";
pub const DESTINATION_ID_COLUMN: &str = "destid1";

#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
pub trait MigrationMap {
    fn lookup(&self, migration_id: &str, source_id: &str) -> Result<Option<u64>, RepositoryError>;
}

/// Map table name for a migration. Only `[A-Za-z0-9_]` ids are accepted.
pub fn map_table(migration_id: &str) -> Result<String, RepositoryError> {
    let valid = !migration_id.is_empty()
        && migration_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(RepositoryError::InvalidMigrationId(migration_id.to_string()));
    }
    Ok(format!("{MAP_TABLE_PREFIX}{migration_id}"))
}

/// Index backed by the repository's map tables. Every lookup is one query.
pub struct TableMigrationMap<'a> {
    repository: &'a dyn ContentRepository,
}

impl<'a> TableMigrationMap<'a> {
    pub fn new(repository: &'a dyn ContentRepository) -> Self {
        Self { repository }
    }
}

impl MigrationMap for TableMigrationMap<'_> {
    fn lookup(&self, migration_id: &str, source_id: &str) -> Result<Option<u64>, RepositoryError> {
        let table = map_table(migration_id)?;
        let rows = self
            .repository
            .query(&table, &[Condition::eq(SOURCE_ID_COLUMN, source_id)])?;

        // Rows written before a destination exists carry a null destid1.
        let destination = rows
            .first()
            .and_then(|row| row.get(DESTINATION_ID_COLUMN))
            .and_then(id_value);

        tracing::trace!(%migration_id, %source_id, ?destination, "Migration map lookup");
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockContentRepository;
    use serde_json::{json, Value};

    fn row(value: Value) -> crate::repository::Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_lookup_queries_migration_table() {
        let mut repository = MockContentRepository::new();
        repository
            .expect_query()
            .withf(|table, conditions| {
                table == "migrate_map_page_body"
                    && conditions == [Condition::eq("sourceid1", "17")].as_slice()
            })
            .times(1)
            .returning(|_, _| Ok(vec![row(json!({"sourceid1": "17", "destid1": "40"}))]));

        let map = TableMigrationMap::new(&repository);
        assert_eq!(map.lookup("page_body", "17").unwrap(), Some(40));
    }

    #[test]
    fn test_lookup_miss_is_none() {
        let mut repository = MockContentRepository::new();
        repository.expect_query().returning(|_, _| Ok(vec![]));

        let map = TableMigrationMap::new(&repository);
        assert_eq!(map.lookup("page_body", "1").unwrap(), None);
    }

    #[test]
    fn test_null_destination_is_none() {
        let mut repository = MockContentRepository::new();
        repository
            .expect_query()
            .returning(|_, _| Ok(vec![row(json!({"sourceid1": 1, "destid1": null}))]));

        let map = TableMigrationMap::new(&repository);
        assert_eq!(map.lookup("page_body", "1").unwrap(), None);
    }

    #[test]
    fn test_invalid_migration_id_never_queries() {
        let mut repository = MockContentRepository::new();
        repository.expect_query().times(0);

        let map = TableMigrationMap::new(&repository);
        let err = map.lookup("page; DROP TABLE", "1").unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidMigrationId(_)));
    }

    #[test]
    fn test_storage_failure_propagates() {
        let mut repository = MockContentRepository::new();
        repository
            .expect_query()
            .returning(|_, _| Err(RepositoryError::Backend("connection reset".into())));

        let map = TableMigrationMap::new(&repository);
        assert!(matches!(map.lookup("page_body", "1"), Err(RepositoryError::Backend(_))));
    }
}
