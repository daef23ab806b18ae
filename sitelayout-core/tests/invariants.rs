//! Contract Invariant Tests
//!
//! These tests verify the layout engine's guarantees end to end against the
//! in-memory repository.

use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

use sitelayout_core::{
    apply_layout, read_layout, ContentEntity, ContentRepository, FieldDefinition, FieldItemList,
    FieldValue, InMemoryRepository, LayoutAssembler, LayoutConfig, LayoutError,
    LayoutExtractionSource, TableMigrationMap, TransformContext,
};
use sitelayout_core::repository::BLOCK_CONTENT;

/// Collects `(level, message-ish debug)` for every event.
struct EventCollector {
    events: Arc<Mutex<Vec<(tracing::Level, String)>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        self.events.lock().unwrap().push((level, format!("{:?}", event)));
    }
}

fn capture_events<T>(f: impl FnOnce() -> T) -> (T, Vec<(tracing::Level, String)>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = Registry::default().with(EventCollector { events: events.clone() });
    let result = tracing::subscriber::with_default(subscriber, f);
    let collected = events.lock().unwrap().clone();
    (result, collected)
}

fn layout(value: Value) -> LayoutConfig {
    serde_json::from_value(value).unwrap()
}

fn text_block(repository: &InMemoryRepository, label: &str, body: &str) -> ContentEntity {
    let mut item = Map::new();
    item.insert("value".into(), json!(body));
    item.insert("format".into(), json!("basic_html"));
    let mut block = ContentEntity::new(BLOCK_CONTENT, "text")
        .with_label(label)
        .with_field("body", FieldItemList::new(FieldDefinition::new("text_with_summary"), vec![item]));
    repository.save(&mut block).unwrap();
    block
}

#[test]
fn invariant_section_count_matches_configuration() {
    let repository = InMemoryRepository::new();
    let map = TableMigrationMap::new(&repository);
    let assembler = LayoutAssembler::new(&repository, &map);
    let sections = json!([
        {"id": "layout_onecol", "regions": {}},
        {"id": "layout_twocol", "regions": {}},
        {"id": "layout_onecol", "regions": {}}
    ]);

    let with_default = assembler
        .assemble(&layout(json!({"sections": sections.clone()})), &TransformContext::new("1"))
        .unwrap();
    assert_eq!(with_default.len(), 4);

    let without_default = assembler
        .assemble(
            &layout(json!({"sections": sections, "create_default_section": false})),
            &TransformContext::new("1"),
        )
        .unwrap();
    assert_eq!(without_default.len(), 3);
}

#[test]
fn invariant_declared_order_is_preserved() {
    let repository = InMemoryRepository::new();
    let a = text_block(&repository, "A", "<p>A</p>");
    let b = text_block(&repository, "B", "<p>B</p>");
    let c = text_block(&repository, "C", "<p>C</p>");
    let map = TableMigrationMap::new(&repository);
    let assembler = LayoutAssembler::new(&repository, &map);

    let config = layout(json!({
        "default_section": {
            "layout_settings": {"label": "Header"},
            "components": [{"plugin_id": "field_block:node:event:field_event_details"}]
        },
        "sections": [
            {
                "id": "layout_twocol",
                "layout_settings": {"label": "First"},
                "regions": {
                    "second": [{"type": "text", "source": "existing", "block_id": a.id}],
                    "first": [
                        {"type": "text", "source": "existing", "block_id": c.id},
                        {"type": "text", "source": "existing", "block_id": b.id}
                    ]
                }
            },
            {"id": "layout_onecol", "layout_settings": {"label": "Second"}, "regions": {}}
        ]
    }));

    let sections = assembler.assemble(&config, &TransformContext::new("5")).unwrap();

    let labels: Vec<_> = sections.iter().map(|s| s.label()).collect();
    assert_eq!(labels, vec![Some("Header"), Some("First"), Some("Second")]);

    let placed: Vec<_> = sections[1]
        .components
        .iter()
        .map(|c| (c.region.as_str(), c.label.as_str(), c.weight))
        .collect();
    assert_eq!(placed, vec![("second", "A", 0), ("first", "C", 0), ("first", "B", 1)]);
}

#[test]
fn invariant_existing_reuses_same_revision() {
    let repository = InMemoryRepository::new();
    let block = text_block(&repository, "Shared", "<p>Shared</p>");
    let map = TableMigrationMap::new(&repository);
    let assembler = LayoutAssembler::new(&repository, &map);

    let config = layout(json!({
        "create_default_section": false,
        "sections": [{"regions": {"content": [
            {"type": "text", "source": "existing", "block_id": block.id},
            {"type": "text", "source": "existing", "block_id": block.id}
        ]}}]
    }));

    let sections = assembler.assemble(&config, &TransformContext::new("1")).unwrap();
    let components = &sections[0].components;
    assert_eq!(components.len(), 2);
    assert_eq!(components[0].block_revision_id, block.revision_id);
    assert_eq!(components[1].block_revision_id, block.revision_id);
    assert_ne!(components[0].uuid, components[1].uuid);
    assert_eq!(repository.count(BLOCK_CONTENT).unwrap(), 1);
}

#[test]
fn invariant_unresolved_component_is_omitted_not_its_section() {
    let repository = InMemoryRepository::new();
    let a = text_block(&repository, "A", "<p>A</p>");
    repository.record_mapping("page_body", "8", a.id.unwrap()).unwrap();
    let map = TableMigrationMap::new(&repository);
    let assembler = LayoutAssembler::new(&repository, &map);

    let config = layout(json!({
        "create_default_section": false,
        "sections": [{"id": "layout_twocol", "regions": {
            "content": [{"type": "text", "source": "migration", "migration_id": "page_body"}],
            "sidebar": [{"type": "text", "source": "migration", "migration_id": "page_sidebar"}]
        }}]
    }));

    let (sections, events) = capture_events(|| assembler.assemble(&config, &TransformContext::new("8")).unwrap());

    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].components.len(), 1);
    assert_eq!(sections[0].components_in("content").count(), 1);
    assert_eq!(sections[0].components_in("sidebar").count(), 0);
    assert_eq!(sections[0].components[0].block_revision_id, a.revision_id);
    assert!(
        events.iter().any(|(level, msg)| *level == tracing::Level::WARN && msg.contains("Unresolved component")),
        "expected a warning, got {events:?}"
    );
}

#[test]
fn invariant_zero_source_id_yields_empty_layout_and_error() {
    let repository = InMemoryRepository::new();
    let map = TableMigrationMap::new(&repository);
    let assembler = LayoutAssembler::new(&repository, &map);
    let config = layout(json!({"body_migration": "page_body"}));

    let (sections, events) = capture_events(|| assembler.assemble(&config, &TransformContext::new("0")));

    assert!(sections.unwrap().is_empty());
    assert!(
        events.iter().any(|(level, _)| *level == tracing::Level::ERROR),
        "expected an error event, got {events:?}"
    );
}

#[test]
fn invariant_legacy_path_wraps_body_block() {
    let repository = InMemoryRepository::new();
    let body = text_block(&repository, "Body", "<p>Body</p>");
    repository.record_mapping("page_body", "12", body.id.unwrap()).unwrap();
    let map = TableMigrationMap::new(&repository);
    let assembler = LayoutAssembler::new(&repository, &map);

    let sections = assembler
        .assemble(&layout(json!({"body_migration": "page_body"})), &TransformContext::new("12"))
        .unwrap();

    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].layout_id, "layout_onecol");
    assert_eq!(sections[0].components.len(), 1);
    assert_eq!(sections[0].components[0].region, "content");
    assert_eq!(sections[0].components[0].plugin_id, "inline_block:text");
    assert_eq!(sections[0].components[0].block_revision_id, body.revision_id);

    let missing = assembler
        .assemble(&layout(json!({"body_migration": "page_body"})), &TransformContext::new("13"))
        .unwrap();
    assert!(missing.is_empty());
}

#[test]
fn invariant_missing_configuration_is_fatal() {
    let repository = InMemoryRepository::new();
    let map = TableMigrationMap::new(&repository);
    let assembler = LayoutAssembler::new(&repository, &map);

    let result = assembler.assemble(&layout(json!({})), &TransformContext::new("1"));
    assert!(matches!(result, Err(LayoutError::InvalidConfiguration(_))));
    assert!(result.unwrap_err().to_string().contains("section_source"));
}

#[test]
fn invariant_inline_create_without_default_section() {
    let repository = InMemoryRepository::new();
    let map = TableMigrationMap::new(&repository);
    let assembler = LayoutAssembler::new(&repository, &map);

    let config = layout(json!({
        "create_default_section": false,
        "sections": [{"id": "layout_onecol", "regions": {"content": [
            {"type": "text", "source": "create", "source_property": "intro", "label": "Intro"}
        ]}}]
    }));
    let mut row = Map::new();
    row.insert("intro".into(), json!("<p>Welcome</p>"));

    let sections = assembler
        .assemble(&config, &TransformContext::new("4").with_row(row))
        .unwrap();

    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].components.len(), 1);
    assert_eq!(sections[0].components[0].label, "Intro");
    assert_eq!(repository.count(BLOCK_CONTENT).unwrap(), 1);
}

#[test]
fn invariant_storage_failure_propagates() {
    struct BrokenMap;
    impl sitelayout_core::MigrationMap for BrokenMap {
        fn lookup(&self, _: &str, _: &str) -> Result<Option<u64>, sitelayout_core::RepositoryError> {
            Err(sitelayout_core::RepositoryError::Backend("map table unavailable".into()))
        }
    }

    let repository = InMemoryRepository::new();
    let assembler = LayoutAssembler::new(&repository, &BrokenMap);
    let config = layout(json!({"sections": [{"regions": {"content": [
        {"type": "text", "source": "migration", "migration_id": "page_body"}
    ]}}]}));

    let result = assembler.assemble(&config, &TransformContext::new("1"));
    assert!(matches!(result, Err(LayoutError::Repository(_))));
}

#[test]
fn invariant_layout_reingested_by_extraction() {
    let repository = InMemoryRepository::new();
    let map = TableMigrationMap::new(&repository);
    let assembler = LayoutAssembler::new(&repository, &map);

    let config = layout(json!({
        "sections": [{"id": "layout_onecol", "layout_settings": {"label": "Body"}, "regions": {"content": [
            {"type": "text", "source": "create", "value": "<p>Moved</p>", "format": "full_html"}
        ]}}]
    }));
    let sections = assembler.assemble(&config, &TransformContext::new("2")).unwrap();

    let mut node = ContentEntity::new("node", "page");
    apply_layout(&mut node, &sections).unwrap();
    repository.save(&mut node).unwrap();
    assert_eq!(read_layout(&node).unwrap(), sections);

    let extracted = LayoutExtractionSource::new(&repository).extract(&node, "Body").unwrap();
    assert_eq!(extracted.len(), 1);
    assert_eq!(extracted[0].component_identifier, sections[1].components[0].uuid);
    assert_eq!(
        extracted[0].extracted_fields["body"],
        FieldValue::Formatted { value: "<p>Moved</p>".into(), format: Some("full_html".into()) }
    );
}

#[test]
fn invariant_manifest_fingerprint_stable_across_runs() {
    let repository = InMemoryRepository::new();
    let block = text_block(&repository, "Shared", "<p>Shared</p>");
    let map = TableMigrationMap::new(&repository);
    let assembler = LayoutAssembler::new(&repository, &map);
    let config = layout(json!({"sections": [{"regions": {"content": [
        {"type": "text", "source": "existing", "block_id": block.id}
    ]}}]}));
    let context = TransformContext::new("1");

    let first = assembler.assemble_manifest("page", &config, &context).unwrap();
    let second = assembler.assemble_manifest("page", &config, &context).unwrap();

    assert_eq!(first.fingerprint, second.fingerprint);
    assert_ne!(first.sections[1].components[0].uuid, second.sections[1].components[0].uuid);
    assert_eq!(first.engine_version, sitelayout_core::ENGINE_VERSION);
}

#[test]
fn invariant_shipped_layouts_validate() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../layouts");
    let registry = sitelayout_core::LayoutRegistry::load_from_dir(&dir).unwrap();
    let repository = InMemoryRepository::new();
    let map = TableMigrationMap::new(&repository);
    let assembler = LayoutAssembler::new(&repository, &map);

    assert!(registry.get("event").is_some());
    assert!(registry.get("page").is_some());
    for definition in registry.list() {
        let result = assembler.validate_config(&definition.layout);
        assert!(result.valid, "{} invalid: {:?}", definition.id, result.violations);
    }
}

#[test]
fn invariant_region_order_survives_definition_files() {
    let repository = InMemoryRepository::new();
    let a = text_block(&repository, "A", "<p>A</p>");
    let b = text_block(&repository, "B", "<p>B</p>");
    let map = TableMigrationMap::new(&repository);
    let assembler = LayoutAssembler::new(&repository, &map);

    let dir = tempfile::tempdir().unwrap();
    let definition = format!(
        r#"{{
            "id": "feature",
            "label": "Feature",
            "create_default_section": false,
            "sections": [{{
                "id": "layout_twocol",
                "regions": {{
                    "zeta": [{{"type": "text", "source": "existing", "block_id": {a}}}],
                    "alpha": [{{"type": "text", "source": "existing", "block_id": {b}}}]
                }}
            }}]
        }}"#,
        a = a.id.unwrap(),
        b = b.id.unwrap(),
    );
    std::fs::write(dir.path().join("feature.json"), definition).unwrap();

    let registry = sitelayout_core::LayoutRegistry::load_from_dir(dir.path()).unwrap();
    let config = &registry.get("feature").unwrap().layout;
    let sections = assembler.assemble(config, &TransformContext::new("1")).unwrap();

    let placed: Vec<_> = sections[0]
        .components
        .iter()
        .map(|c| (c.region.as_str(), c.label.as_str()))
        .collect();
    assert_eq!(placed, vec![("zeta", "A"), ("alpha", "B")]);
}

#[test]
fn invariant_deleted_mapped_block_is_omitted() {
    let repository = InMemoryRepository::new();
    let body = text_block(&repository, "Body", "<p>Body</p>");
    let body_id = body.id.unwrap();
    repository.record_mapping("page_body", "3", body_id).unwrap();
    repository.delete(BLOCK_CONTENT, body_id).unwrap();
    let map = TableMigrationMap::new(&repository);
    let assembler = LayoutAssembler::new(&repository, &map);

    let config = layout(json!({
        "create_default_section": false,
        "sections": [{"regions": {"content": [
            {"type": "text", "source": "migration", "migration_id": "page_body"}
        ]}}]
    }));

    let (sections, events) = capture_events(|| assembler.assemble(&config, &TransformContext::new("3")).unwrap());

    assert_eq!(sections.len(), 1);
    assert!(sections[0].components.is_empty());
    assert!(
        events.iter().any(|(level, _)| *level == tracing::Level::WARN),
        "expected a warning, got {events:?}"
    );
}
