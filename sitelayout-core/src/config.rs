//! Layout Configuration - Declarative Contracts
//!
//! A layout definition describes how one migration turns a source row into a
//! section list. Definitions live as JSON files and are loaded into a
//! [`LayoutRegistry`].

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::model::{DEFAULT_LAYOUT, DEFAULT_REGION, DEFAULT_VIEW_MODE};

pub type LayoutId = String;

pub const DEFAULT_TEXT_FORMAT: &str = "basic_html";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutDefinition {
    pub id: LayoutId,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(flatten)]
    pub layout: LayoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_true")]
    pub create_default_section: bool,
    #[serde(default)]
    pub default_section: DefaultSectionConfig,
    /// Absent selects the single-section legacy path.
    #[serde(default)]
    pub sections: Option<Vec<SectionConfig>>,
    /// Upstream migration holding the body block for the legacy path.
    #[serde(default)]
    pub body_migration: Option<String>,
}

fn default_true() -> bool { true }

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            create_default_section: true,
            default_section: DefaultSectionConfig::default(),
            sections: None,
            body_migration: None,
        }
    }
}

/// Header section synthesized ahead of the configured sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultSectionConfig {
    #[serde(default = "default_layout")]
    pub layout_id: String,
    #[serde(default)]
    pub layout_settings: Map<String, Value>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub components: Vec<FixedComponentConfig>,
}

fn default_layout() -> String { DEFAULT_LAYOUT.to_string() }
fn default_region() -> String { DEFAULT_REGION.to_string() }
fn default_view_mode() -> String { DEFAULT_VIEW_MODE.to_string() }

impl Default for DefaultSectionConfig {
    fn default() -> Self {
        Self {
            layout_id: default_layout(),
            layout_settings: Map::new(),
            region: default_region(),
            components: vec![],
        }
    }
}

/// A platform display component placed verbatim (metadata, moderation controls).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedComponentConfig {
    pub plugin_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub label_display: bool,
    #[serde(default = "default_view_mode")]
    pub view_mode: String,
    #[serde(default)]
    pub context_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionConfig {
    #[serde(rename = "id", default = "default_layout")]
    pub layout_id: String,
    #[serde(default)]
    pub layout_settings: Map<String, Value>,
    #[serde(default)]
    pub regions: Regions,
}

/// Regions in declared order. JSON objects are read key by key; `serde_json::Value`
/// input keeps its order through the `preserve_order` feature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Regions(pub Vec<(String, Vec<ComponentConfig>)>);

impl Regions {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ComponentConfig])> {
        self.0.iter().map(|(name, components)| (name.as_str(), components.as_slice()))
    }
}

impl Serialize for Regions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, components) in &self.0 {
            map.serialize_entry(name, components)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Regions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RegionsVisitor;

        impl<'de> Visitor<'de> for RegionsVisitor {
            type Value = Regions;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of region name to component list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Regions, A::Error> {
                let mut regions = Vec::new();
                while let Some((name, components)) = access.next_entry::<String, Vec<ComponentConfig>>()? {
                    regions.push((name, components));
                }
                Ok(Regions(regions))
            }
        }

        deserializer.deserialize_map(RegionsVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentConfig {
    /// Block bundle, e.g. `text`.
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(flatten)]
    pub source: BlockSource,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub label_display: bool,
    #[serde(default = "default_view_mode")]
    pub view_mode: String,
    #[serde(default)]
    pub component_settings: Map<String, Value>,
}

/// How the block behind a component is obtained.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum BlockSource {
    /// Look the block up through an upstream migration's map.
    Migration {
        migration_id: String,
        #[serde(default)]
        source_id: Option<SourceKey>,
        #[serde(default)]
        source_property: Option<String>,
    },
    /// Reference a block that already exists in the destination.
    Existing { block_id: u64 },
    /// Build a new inline block from literal configuration or a row value.
    Create {
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        source_property: Option<String>,
        #[serde(default)]
        format: Option<String>,
        #[serde(default)]
        fields: Map<String, Value>,
    },
}

impl BlockSource {
    pub fn name(&self) -> &'static str {
        match self {
            BlockSource::Migration { .. } => "migration",
            BlockSource::Existing { .. } => "existing",
            BlockSource::Create { .. } => "create",
        }
    }
}

/// A source identifier as written in configuration: number or text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SourceKey {
    Number(u64),
    Text(String),
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKey::Number(n) => write!(f, "{n}"),
            SourceKey::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("io error reading layouts: {0}")]
    Io(#[from] std::io::Error),
}

/// Layout registry - loads and caches layout definitions
pub struct LayoutRegistry {
    layouts: HashMap<LayoutId, LayoutDefinition>,
}

impl LayoutRegistry {
    pub fn new() -> Self {
        Self { layouts: HashMap::new() }
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        if !dir.exists() {
            tracing::warn!(dir = %dir.display(), "Layout directory does not exist");
            return Ok(registry);
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str::<LayoutDefinition>(&content) {
                Ok(definition) => {
                    tracing::debug!(id = %definition.id, path = %path.display(), "Loaded layout definition");
                    registry.register(definition);
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "Skipping unparseable layout definition");
                }
            }
        }
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<&LayoutDefinition> {
        self.layouts.get(id)
    }

    /// Definitions sorted by id.
    pub fn list(&self) -> Vec<&LayoutDefinition> {
        let mut layouts: Vec<_> = self.layouts.values().collect();
        layouts.sort_by(|a, b| a.id.cmp(&b.id));
        layouts
    }

    pub fn register(&mut self, definition: LayoutDefinition) {
        self.layouts.insert(definition.id.clone(), definition);
    }
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_regions_keep_declared_order() {
        let section: SectionConfig = serde_json::from_value(json!({
            "id": "layout_twocol",
            "regions": {
                "second": [{"type": "text", "source": "existing", "block_id": 1}],
                "first": [{"type": "text", "source": "existing", "block_id": 2}]
            }
        }))
        .unwrap();

        let names: Vec<_> = section.regions.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn test_regions_keep_file_order() {
        let section: SectionConfig = serde_json::from_str(
            r#"{"id": "layout_threecol", "regions": {"third": [], "first": [], "second": []}}"#,
        )
        .unwrap();

        let names: Vec<_> = section.regions.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["third", "first", "second"]);
    }

    #[test]
    fn test_component_source_variants() {
        let migration: ComponentConfig = serde_json::from_value(json!({
            "type": "text", "source": "migration", "migration_id": "page_body", "source_id": "abc"
        }))
        .unwrap();
        assert_eq!(
            migration.source,
            BlockSource::Migration {
                migration_id: "page_body".into(),
                source_id: Some(SourceKey::Text("abc".into())),
                source_property: None,
            }
        );
        assert_eq!(migration.view_mode, "full");
        assert!(!migration.label_display);

        let existing: ComponentConfig = serde_json::from_value(json!({
            "type": "text", "source": "existing", "block_id": 12
        }))
        .unwrap();
        assert_eq!(existing.source, BlockSource::Existing { block_id: 12 });

        let create: ComponentConfig = serde_json::from_value(json!({
            "type": "text", "source": "create", "source_property": "summary"
        }))
        .unwrap();
        assert_eq!(create.source.name(), "create");
    }

    #[test]
    fn test_unknown_source_rejected() {
        let result = serde_json::from_value::<ComponentConfig>(json!({"type": "text", "source": "guess"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_layout_defaults() {
        let config: LayoutConfig = serde_json::from_value(json!({})).unwrap();
        assert!(config.create_default_section);
        assert!(config.sections.is_none());
        assert_eq!(config.default_section.layout_id, "layout_onecol");
        assert_eq!(config.default_section.region, "content");
    }

    #[test]
    fn test_registry_loads_json_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("event.json"),
            r#"{"id": "event", "sections": [], "create_default_section": false}"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = LayoutRegistry::load_from_dir(dir.path()).unwrap();
        assert_eq!(registry.list().len(), 1);
        let event = registry.get("event").unwrap();
        assert!(!event.layout.create_default_section);
        assert_eq!(event.layout.sections.as_ref().map(Vec::len), Some(0));
    }
}
