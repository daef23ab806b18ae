//! Layout Extraction Source
//!
//! Reads the inline blocks out of one labelled section of an existing layout
//! so a later migration can re-ingest them. Each extracted component becomes
//! one source row, keyed by its component UUID.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assembler::LayoutError;
use crate::extractor::{ExtractedFields, FieldValueExtractor};
use crate::model::read_layout;
use crate::repository::{ContentEntity, ContentRepository, BLOCK_CONTENT};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedComponent {
    /// Block id.
    pub id: u64,
    /// Block UUID.
    pub stable_identifier: Uuid,
    pub block_type: String,
    pub label: String,
    pub extracted_fields: ExtractedFields,
    pub component_identifier: Uuid,
    pub region: String,
    pub weight: i32,
    pub section_delta: usize,
    /// Id of the entity carrying the layout.
    pub host_id: Option<u64>,
}

impl ExtractedComponent {
    /// Source key for the migration map of the consuming migration.
    pub fn source_key(&self) -> String {
        self.component_identifier.to_string()
    }
}

pub struct LayoutExtractionSource<'a> {
    repository: &'a dyn ContentRepository,
    extractor: FieldValueExtractor<'a>,
}

impl<'a> LayoutExtractionSource<'a> {
    pub fn new(repository: &'a dyn ContentRepository) -> Self {
        Self {
            repository,
            extractor: FieldValueExtractor::new(repository),
        }
    }

    pub fn with_extractor(repository: &'a dyn ContentRepository, extractor: FieldValueExtractor<'a>) -> Self {
        Self { repository, extractor }
    }

    pub fn extract(
        &self,
        entity: &ContentEntity,
        target_section_label: &str,
    ) -> Result<Vec<ExtractedComponent>, LayoutError> {
        let sections = read_layout(entity)?;
        let mut extracted = Vec::new();

        for (section_delta, section) in sections.iter().enumerate() {
            if section.label() != Some(target_section_label) {
                continue;
            }

            for component in section.components.iter().filter(|c| c.is_inline_block()) {
                let Some(revision_id) = component.block_revision_id else {
                    tracing::debug!(component = %component.uuid, "Inline block without a pinned revision");
                    continue;
                };
                let Some(block) = self.repository.load_revision(BLOCK_CONTENT, revision_id)? else {
                    tracing::debug!(
                        component = %component.uuid,
                        revision_id,
                        "Pinned block revision no longer exists"
                    );
                    continue;
                };
                let Some(id) = block.id else {
                    tracing::debug!(component = %component.uuid, revision_id, "Block revision has no entity id");
                    continue;
                };

                extracted.push(ExtractedComponent {
                    id,
                    stable_identifier: block.uuid,
                    block_type: block.bundle.clone(),
                    label: component.label.clone(),
                    extracted_fields: self.extractor.extract(&block)?,
                    component_identifier: component.uuid,
                    region: component.region.clone(),
                    weight: component.weight,
                    section_delta,
                    host_id: entity.id,
                });
            }
        }

        tracing::debug!(
            host_id = ?entity.id,
            section = %target_section_label,
            components = extracted.len(),
            "Extracted layout components"
        );
        Ok(extracted)
    }
}
