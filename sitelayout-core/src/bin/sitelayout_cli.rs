//! SiteLayout CLI - Bridge interface for migration pipelines
//!
//! Commands: layouts, validate, assemble, extract
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on invalid configuration, 1 on other failures

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;

use sitelayout_core::{
    apply_layout, ContentRepository, InMemoryRepository, LayoutAssembler, LayoutError,
    LayoutExtractionSource, LayoutRegistry, TableMigrationMap, TransformContext,
};

#[derive(Parser)]
#[command(name = "sitelayout-cli")]
#[command(about = "SiteLayout CLI - content-to-layout transformation engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to layout definitions directory
    #[arg(short, long, default_value = "layouts")]
    layouts_dir: PathBuf,

    /// Path to the content store snapshot
    #[arg(short, long, default_value = "store.json")]
    store: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// List available layout definitions
    Layouts,

    /// Validate a layout definition
    Validate {
        /// Layout ID
        #[arg(short = 'L', long)]
        layout: String,
    },

    /// Assemble the layout for one source row
    Assemble {
        /// Layout ID
        #[arg(short = 'L', long)]
        layout: String,

        /// Transformation unit id
        #[arg(long)]
        source_id: String,

        /// Source row as a JSON object
        #[arg(long)]
        row: Option<String>,

        /// Write the layout to this node and save the store
        #[arg(long)]
        write_to: Option<u64>,
    },

    /// Extract inline blocks from a labelled section of an entity's layout
    Extract {
        #[arg(long, default_value = "node")]
        entity_type: String,

        #[arg(long)]
        id: u64,

        /// Section label to extract
        #[arg(long)]
        section: String,
    },
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(out) => println!("{out}"),
        Err(e) => println!(r#"{{"success": false, "error": "Failed to render output: {e}"}}"#),
    }
}

fn failure(error: impl ToString, code: u8) -> ExitCode {
    print_json(&json!({"success": false, "error": error.to_string()}));
    ExitCode::from(code)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    // Load layouts
    let registry = match LayoutRegistry::load_from_dir(&cli.layouts_dir) {
        Ok(r) => r,
        Err(e) => return failure(format!("Failed to load layouts: {e}"), 1),
    };

    match cli.command {
        Commands::Layouts => {
            let layouts: Vec<_> = registry
                .list()
                .iter()
                .map(|d| json!({
                    "id": d.id,
                    "label": d.label,
                    "legacy": d.layout.sections.is_none(),
                    "sections": d.layout.sections.as_ref().map_or(0, Vec::len),
                    "create_default_section": d.layout.create_default_section,
                }))
                .collect();

            print_json(&Value::Array(layouts));
            ExitCode::SUCCESS
        }

        Commands::Validate { layout } => {
            let Some(definition) = registry.get(&layout) else {
                return failure(LayoutError::LayoutNotFound(layout), 1);
            };
            let repository = InMemoryRepository::new();
            let map = TableMigrationMap::new(&repository);
            let result = LayoutAssembler::new(&repository, &map).validate_config(&definition.layout);

            match serde_json::to_value(&result) {
                Ok(value) => print_json(&value),
                Err(e) => return failure(e, 1),
            }
            if result.valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2) // Validation failure
            }
        }

        Commands::Assemble { layout, source_id, row, write_to } => {
            let Some(definition) = registry.get(&layout) else {
                return failure(LayoutError::LayoutNotFound(layout), 1);
            };
            let row: Map<String, Value> = match row.as_deref().map(serde_json::from_str).transpose() {
                Ok(row) => row.unwrap_or_default(),
                Err(e) => return failure(format!("Invalid row: {e}"), 1),
            };
            let repository = match InMemoryRepository::load_from_path(&cli.store) {
                Ok(r) => r,
                Err(e) => return failure(format!("Failed to load store: {e}"), 1),
            };
            let map = TableMigrationMap::new(&repository);
            let assembler = LayoutAssembler::new(&repository, &map);
            let context = TransformContext::new(source_id).with_row(row);

            let manifest = match assembler.assemble_manifest(&definition.id, &definition.layout, &context) {
                Ok(m) => m,
                Err(e @ (LayoutError::InvalidConfiguration(_) | LayoutError::MissingSectionConfiguration)) => {
                    return failure(e, 2)
                }
                Err(e) => return failure(e, 1),
            };

            if let Some(node_id) = write_to {
                if let Err(e) = write_layout(&repository, node_id, &manifest.sections) {
                    return failure(e, 1);
                }
            }
            // Inline blocks created during assembly must survive the run.
            if let Err(e) = repository.persist(&cli.store) {
                return failure(format!("Failed to save store: {e}"), 1);
            }

            print_json(&json!({"success": true, "manifest": manifest}));
            ExitCode::SUCCESS
        }

        Commands::Extract { entity_type, id, section } => {
            let repository = match InMemoryRepository::load_from_path(&cli.store) {
                Ok(r) => r,
                Err(e) => return failure(format!("Failed to load store: {e}"), 1),
            };
            let entity = match repository.load(&entity_type, id) {
                Ok(Some(entity)) => entity,
                Ok(None) => return failure(format!("Entity not found: {entity_type}/{id}"), 1),
                Err(e) => return failure(e, 1),
            };

            match LayoutExtractionSource::new(&repository).extract(&entity, &section) {
                Ok(components) => {
                    print_json(&json!({"success": true, "components": components}));
                    ExitCode::SUCCESS
                }
                Err(e) => failure(e, 1),
            }
        }
    }
}

fn write_layout(
    repository: &InMemoryRepository,
    node_id: u64,
    sections: &[sitelayout_core::Section],
) -> Result<(), LayoutError> {
    let mut node = repository
        .load("node", node_id)?
        .ok_or_else(|| sitelayout_core::RepositoryError::NotFound {
            entity_type: "node".to_string(),
            id: node_id,
        })?;
    apply_layout(&mut node, sections)?;
    repository.save(&mut node)?;
    Ok(())
}
