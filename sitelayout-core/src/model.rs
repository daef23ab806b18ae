//! Layout Model - Sections, Components, Portable Blocks

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::repository::{ContentEntity, FieldDefinition, FieldItem, FieldItemList};

/// Field holding an entity's layout, one item per section.
pub const LAYOUT_FIELD: &str = "layout_builder__layout";
pub const LAYOUT_FIELD_TYPE: &str = "layout_section";

pub const INLINE_BLOCK_PREFIX: &str = "inline_block:";
pub const DEFAULT_LAYOUT: &str = "layout_onecol";
pub const DEFAULT_REGION: &str = "content";
pub const DEFAULT_VIEW_MODE: &str = "full";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub layout_id: String,
    #[serde(default)]
    pub layout_settings: Map<String, Value>,
    #[serde(default)]
    pub components: Vec<Component>,
}

impl Section {
    pub fn new(layout_id: impl Into<String>, layout_settings: Map<String, Value>) -> Self {
        Self {
            layout_id: layout_id.into(),
            layout_settings,
            components: vec![],
        }
    }

    /// Human label from the layout settings.
    pub fn label(&self) -> Option<&str> {
        self.layout_settings.get("label").and_then(Value::as_str)
    }

    pub fn components_in<'a>(&'a self, region: &'a str) -> impl Iterator<Item = &'a Component> + 'a {
        self.components.iter().filter(move |c| c.region == region)
    }

    /// Append a component to a region; its weight is its position in that region.
    pub fn place(&mut self, region: &str, mut component: Component) {
        component.region = region.to_string();
        component.weight = self.components_in(region).count() as i32;
        self.components.push(component);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Component {
    pub uuid: Uuid,
    pub region: String,
    #[serde(default)]
    pub weight: i32,
    /// Block plugin id, e.g. `inline_block:text`.
    pub plugin_id: String,
    pub label: String,
    #[serde(default)]
    pub label_display: bool,
    pub view_mode: String,
    #[serde(default)]
    pub block_revision_id: Option<u64>,
    #[serde(default)]
    pub context_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl Component {
    /// A component placing an inline content block.
    pub fn inline_block(block_type: &str, label: impl Into<String>, block_revision_id: u64) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            region: DEFAULT_REGION.to_string(),
            weight: 0,
            plugin_id: format!("{INLINE_BLOCK_PREFIX}{block_type}"),
            label: label.into(),
            label_display: false,
            view_mode: DEFAULT_VIEW_MODE.to_string(),
            block_revision_id: Some(block_revision_id),
            context_mapping: BTreeMap::new(),
            settings: Map::new(),
        }
    }

    /// A component placing a platform display plugin (no content block behind it).
    pub fn plugin(plugin_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            region: DEFAULT_REGION.to_string(),
            weight: 0,
            plugin_id: plugin_id.into(),
            label: label.into(),
            label_display: false,
            view_mode: DEFAULT_VIEW_MODE.to_string(),
            block_revision_id: None,
            context_mapping: BTreeMap::new(),
            settings: Map::new(),
        }
    }

    pub fn is_inline_block(&self) -> bool {
        self.plugin_id.starts_with(INLINE_BLOCK_PREFIX)
    }

    /// Block bundle for inline blocks.
    pub fn block_type(&self) -> Option<&str> {
        self.plugin_id.strip_prefix(INLINE_BLOCK_PREFIX)
    }
}

/// Transport-safe value of one extracted field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Formatted { value: String, format: Option<String> },
    Link { uri: String, title: Option<String> },
    Nested(Vec<PortableBlock>),
    List(Vec<Value>),
    Scalar(Value),
}

/// A block reduced to its type and extracted field values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortableBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub fields: BTreeMap<String, FieldValue>,
}

/// Read the section list stored on an entity. Items that fail to decode are an error.
pub fn read_layout(entity: &ContentEntity) -> Result<Vec<Section>, serde_json::Error> {
    let Some(list) = entity.field(LAYOUT_FIELD) else {
        return Ok(vec![]);
    };
    list.items
        .iter()
        .filter_map(|item| item.get("section"))
        .map(|section| serde_json::from_value(section.clone()))
        .collect()
}

/// Replace the entity's layout field with the given sections. Does not save.
pub fn apply_layout(entity: &mut ContentEntity, sections: &[Section]) -> Result<(), serde_json::Error> {
    let items = sections
        .iter()
        .map(|section| {
            let mut item = FieldItem::new();
            item.insert("section".to_string(), serde_json::to_value(section)?);
            Ok(item)
        })
        .collect::<Result<Vec<_>, serde_json::Error>>()?;

    entity.set_field(
        LAYOUT_FIELD,
        FieldItemList::new(FieldDefinition::base(LAYOUT_FIELD_TYPE), items),
    );
    Ok(())
}
