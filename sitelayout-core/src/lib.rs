//! SiteLayout Core - Content-to-Layout Transformation Engine
//!
//! # Guarantees
//! 1. Configuration Is Validated Before Storage Is Touched
//! 2. Declared Order Is Rendered Order
//! 3. Unresolved Blocks Are Omitted, Never Dangling
//! 4. One Bad Unit Never Aborts A Batch
//! 5. Storage Is Injected, Never Ambient

pub mod repository;
pub mod model;
pub mod config;
pub mod validation;
pub mod id_map;
pub mod extractor;
pub mod resolver;
pub mod assembler;
pub mod extraction;
pub mod hashing;
pub mod memory;

pub use repository::{ContentEntity, ContentRepository, FieldDefinition, FieldItemList, RepositoryError};
pub use model::{Component, FieldValue, PortableBlock, Section, apply_layout, read_layout};
pub use config::{BlockSource, ComponentConfig, LayoutConfig, LayoutDefinition, LayoutRegistry, SectionConfig};
pub use validation::{ValidationResult, ValidationRule, ValidationViolation, ViolationSeverity};
pub use id_map::{MigrationMap, TableMigrationMap};
pub use extractor::FieldValueExtractor;
pub use resolver::{BlockResolver, TransformContext};
pub use assembler::{AssemblyPlan, LayoutAssembler, LayoutError, LayoutManifest};
pub use extraction::{ExtractedComponent, LayoutExtractionSource};
pub use hashing::{canonical_json, layout_fingerprint};
pub use memory::InMemoryRepository;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
