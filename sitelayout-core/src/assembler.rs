//! Layout Assembler - Single Entry Point
//!
//! assemble MUST validate the configuration first. A configuration error
//! stops the batch; a bad unit id or an unresolved block only costs that unit
//! or that component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use thiserror::Error;

use crate::config::{ComponentConfig, DefaultSectionConfig, LayoutConfig, SectionConfig};
use crate::hashing::layout_fingerprint;
use crate::id_map::MigrationMap;
use crate::model::{Component, Section, DEFAULT_LAYOUT, DEFAULT_REGION};
use crate::repository::{ContentEntity, ContentRepository, RepositoryError};
use crate::resolver::{BlockResolver, TransformContext};
use crate::validation::{ValidationResult, Validator};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Invalid layout configuration: {0}")]
    InvalidConfiguration(String),

    #[error("No section configuration and no body migration to fall back on")]
    MissingSectionConfiguration,

    #[error("Layout not found: {0}")]
    LayoutNotFound(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How a unit's sections are produced, chosen once per assembly.
#[derive(Debug, Clone, Copy)]
pub enum AssemblyPlan<'c> {
    /// One body block looked up by unit id, in one one-column section.
    Legacy { body_migration: &'c str },
    /// Optional default section followed by the configured sections.
    Declarative {
        default_section: Option<&'c DefaultSectionConfig>,
        sections: &'c [SectionConfig],
    },
}

impl<'c> AssemblyPlan<'c> {
    pub fn legacy(body_migration: &'c str) -> Self {
        AssemblyPlan::Legacy { body_migration }
    }

    pub fn declarative(config: &'c LayoutConfig, sections: &'c [SectionConfig]) -> Self {
        AssemblyPlan::Declarative {
            default_section: config
                .create_default_section
                .then_some(&config.default_section),
            sections,
        }
    }

    pub fn from_config(config: &'c LayoutConfig) -> Result<Self, LayoutError> {
        match (&config.sections, config.body_migration.as_deref()) {
            (Some(sections), _) => Ok(Self::declarative(config, sections)),
            (None, Some(body)) if !body.trim().is_empty() => Ok(Self::legacy(body)),
            (None, _) => Err(LayoutError::MissingSectionConfiguration),
        }
    }
}

/// A produced layout with the data needed to audit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutManifest {
    pub layout: String,
    pub source_id: String,
    pub engine_version: String,
    pub assembled_at: DateTime<Utc>,
    /// Structural hash; equal for two runs that placed the same blocks the same way.
    pub fingerprint: String,
    pub sections: Vec<Section>,
}

/// The layout assembler - single entry point for building section lists
pub struct LayoutAssembler<'a> {
    resolver: BlockResolver<'a>,
    validator: Validator,
}

impl<'a> LayoutAssembler<'a> {
    pub fn new(repository: &'a dyn ContentRepository, map: &'a dyn MigrationMap) -> Self {
        Self {
            resolver: BlockResolver::new(repository, map),
            validator: Validator::new(),
        }
    }

    /// This is the ONLY validation entry point.
    pub fn validate_config(&self, config: &LayoutConfig) -> ValidationResult {
        self.validator.validate(config)
    }

    /// Build the ordered section list for one transformation unit.
    pub fn assemble(
        &self,
        config: &LayoutConfig,
        context: &TransformContext,
    ) -> Result<Vec<Section>, LayoutError> {
        let validation = self.validate_config(config);
        if validation.has_errors() {
            let messages: Vec<_> = validation
                .errors()
                .map(|v| match &v.path {
                    Some(path) => format!("{} at {}: {}", v.rule, path, v.message),
                    None => format!("{}: {}", v.rule, v.message),
                })
                .collect();
            return Err(LayoutError::InvalidConfiguration(messages.join("; ")));
        }

        let plan = AssemblyPlan::from_config(config)?;

        let Some(unit_id) = context.unit_id() else {
            tracing::error!(
                source_id = %context.source_id,
                "Invalid transformation unit id; no layout produced"
            );
            return Ok(vec![]);
        };

        let sections = match plan {
            AssemblyPlan::Legacy { body_migration } => self.build_legacy(body_migration, unit_id)?,
            AssemblyPlan::Declarative { default_section, sections } => {
                self.build_declarative(default_section, sections, context)?
            }
        };

        tracing::info!(
            source_id = %context.source_id,
            sections = sections.len(),
            components = sections.iter().map(|s| s.components.len()).sum::<usize>(),
            "Assembled layout"
        );
        Ok(sections)
    }

    /// Assemble and wrap the result for reporting.
    pub fn assemble_manifest(
        &self,
        layout: &str,
        config: &LayoutConfig,
        context: &TransformContext,
    ) -> Result<LayoutManifest, LayoutError> {
        let sections = self.assemble(config, context)?;
        Ok(LayoutManifest {
            layout: layout.to_string(),
            source_id: context.source_id.clone(),
            engine_version: ENGINE_VERSION.to_string(),
            assembled_at: Utc::now(),
            fingerprint: layout_fingerprint(&sections)?,
            sections,
        })
    }

    fn build_legacy(&self, body_migration: &str, unit_id: u64) -> Result<Vec<Section>, LayoutError> {
        let source_id = unit_id.to_string();
        let Some(block) = self.resolver.lookup(body_migration, &source_id)? else {
            tracing::warn!(
                migration_id = %body_migration,
                %source_id,
                "No body block for legacy layout; no layout produced"
            );
            return Ok(vec![]);
        };
        let Some(revision_id) = block.revision_id else {
            tracing::warn!(migration_id = %body_migration, %source_id, "Body block has no revision");
            return Ok(vec![]);
        };

        let label = block.label.clone().unwrap_or_else(|| block.bundle.clone());
        let mut section = Section::new(DEFAULT_LAYOUT, Map::new());
        section.place(DEFAULT_REGION, Component::inline_block(&block.bundle, label, revision_id));
        Ok(vec![section])
    }

    fn build_declarative(
        &self,
        default_section: Option<&DefaultSectionConfig>,
        sections: &[SectionConfig],
        context: &TransformContext,
    ) -> Result<Vec<Section>, LayoutError> {
        let mut built = Vec::with_capacity(sections.len() + 1);

        if let Some(config) = default_section {
            built.push(build_default_section(config));
        }

        for (index, config) in sections.iter().enumerate() {
            built.push(self.build_section(index, config, context)?);
        }

        Ok(built)
    }

    // Sections are kept even when every component fails to resolve.
    fn build_section(
        &self,
        index: usize,
        config: &SectionConfig,
        context: &TransformContext,
    ) -> Result<Section, LayoutError> {
        let mut section = Section::new(config.layout_id.clone(), config.layout_settings.clone());

        for (region, components) in config.regions.iter() {
            for component_config in components {
                match self.resolver.resolve(component_config, context)? {
                    Some(block) => match component_for(component_config, &block) {
                        Some(component) => section.place(region, component),
                        None => tracing::warn!(
                            section = index,
                            %region,
                            block_type = %component_config.block_type,
                            "Resolved block has no revision; component omitted"
                        ),
                    },
                    None => tracing::warn!(
                        section = index,
                        %region,
                        block_type = %component_config.block_type,
                        source = component_config.source.name(),
                        source_id = %context.source_id,
                        config = ?component_config.source,
                        "Unresolved component; omitted"
                    ),
                }
            }
        }

        Ok(section)
    }
}

/// Header section of fixed platform display components, always placed first.
pub fn build_default_section(config: &DefaultSectionConfig) -> Section {
    let mut section = Section::new(config.layout_id.clone(), config.layout_settings.clone());
    for fixed in &config.components {
        let mut component = Component::plugin(fixed.plugin_id.clone(), fixed.label.clone());
        component.label_display = fixed.label_display;
        component.view_mode = fixed.view_mode.clone();
        component.context_mapping = fixed.context_mapping.clone();
        component.settings = fixed.settings.clone();
        section.place(&config.region, component);
    }
    section
}

fn component_for(config: &ComponentConfig, block: &ContentEntity) -> Option<Component> {
    let revision_id = block.revision_id?;
    let label = config
        .label
        .clone()
        .or_else(|| block.label.clone())
        .unwrap_or_else(|| config.block_type.clone());

    let mut component = Component::inline_block(&block.bundle, label, revision_id);
    component.label_display = config.label_display;
    component.view_mode = config.view_mode.clone();
    component.settings = config.component_settings.clone();
    Some(component)
}
