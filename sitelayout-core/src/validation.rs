//! Validation System - Configuration Rules
//!
//! Rules produce structured violations. Any error-severity violation makes the
//! configuration unusable; the assembler refuses it before touching storage.

use serde::{Deserialize, Serialize};

use crate::config::{BlockSource, LayoutConfig};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    /// Where in the configuration, e.g. `sections[1].regions.sidebar[0]`.
    pub path: Option<String>,
    pub remediation: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ValidationViolation>,
}

impl ValidationResult {
    pub fn from_violations(violations: Vec<ValidationViolation>) -> Self {
        let valid = !violations.iter().any(|v| v.severity == ViolationSeverity::Error);
        Self { valid, violations }
    }

    pub fn has_errors(&self) -> bool {
        !self.valid
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationViolation> {
        self.violations.iter().filter(|v| v.severity == ViolationSeverity::Error)
    }
}

/// Validation rule trait - produces violations
pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn validate(&self, config: &LayoutConfig) -> Vec<ValidationViolation>;
}

fn violation(
    rule: &dyn ValidationRule,
    severity: ViolationSeverity,
    message: impl Into<String>,
    path: Option<String>,
    remediation: &str,
) -> ValidationViolation {
    ValidationViolation {
        rule: rule.name().to_string(),
        severity,
        message: message.into(),
        path,
        remediation: vec![remediation.to_string()],
    }
}

// --- Concrete Rules ---

/// Without sections the legacy path needs a body migration to look into.
pub struct SectionSourceRule;

impl ValidationRule for SectionSourceRule {
    fn name(&self) -> &'static str { "section_source" }

    fn validate(&self, config: &LayoutConfig) -> Vec<ValidationViolation> {
        let missing_body = config
            .body_migration
            .as_deref()
            .map_or(true, |m| m.trim().is_empty());

        if config.sections.is_none() && missing_body {
            vec![violation(
                self,
                ViolationSeverity::Error,
                "No section configuration and no body migration for the legacy path",
                None,
                "Declare `sections` or set `body_migration`",
            )]
        } else {
            vec![]
        }
    }
}

pub struct RegionNameRule;

impl ValidationRule for RegionNameRule {
    fn name(&self) -> &'static str { "region_name" }

    fn validate(&self, config: &LayoutConfig) -> Vec<ValidationViolation> {
        let mut violations = vec![];

        if config.create_default_section && config.default_section.region.trim().is_empty() {
            violations.push(violation(
                self,
                ViolationSeverity::Error,
                "Default section region name is empty",
                Some("default_section.region".to_string()),
                "Name the region, e.g. `content`",
            ));
        }

        for (s, section) in config.sections.iter().flatten().enumerate() {
            for (region, _) in section.regions.iter() {
                if region.trim().is_empty() {
                    violations.push(violation(
                        self,
                        ViolationSeverity::Error,
                        "Region name is empty",
                        Some(format!("sections[{s}].regions")),
                        "Name the region as the layout template does",
                    ));
                }
            }
        }

        violations
    }
}

pub struct BlockSourceRule;

impl ValidationRule for BlockSourceRule {
    fn name(&self) -> &'static str { "block_source" }

    fn validate(&self, config: &LayoutConfig) -> Vec<ValidationViolation> {
        let mut violations = vec![];

        for (s, section) in config.sections.iter().flatten().enumerate() {
            for (region, components) in section.regions.iter() {
                for (c, component) in components.iter().enumerate() {
                    let path = Some(format!("sections[{s}].regions.{region}[{c}]"));

                    if component.block_type.trim().is_empty() {
                        violations.push(violation(
                            self,
                            ViolationSeverity::Error,
                            "Component block type is empty",
                            path.clone(),
                            "Set `type` to the block bundle",
                        ));
                    }

                    match &component.source {
                        BlockSource::Migration { migration_id, .. } if migration_id.trim().is_empty() => {
                            violations.push(violation(
                                self,
                                ViolationSeverity::Error,
                                "Migration source without a migration id",
                                path,
                                "Set `migration_id` to the upstream migration",
                            ));
                        }
                        BlockSource::Existing { block_id: 0 } => {
                            violations.push(violation(
                                self,
                                ViolationSeverity::Error,
                                "Existing source with block id 0",
                                path,
                                "Reference a positive block id",
                            ));
                        }
                        BlockSource::Create { value: None, source_property: None, fields, .. }
                            if fields.is_empty() =>
                        {
                            violations.push(violation(
                                self,
                                ViolationSeverity::Warning,
                                "Create source has no value, source property or fields; it will never resolve",
                                path,
                                "Provide `value`, `source_property` or `fields`",
                            ));
                        }
                        _ => {}
                    }
                }
            }
        }

        violations
    }
}

/// Empty sections are allowed; flag them so authors know.
pub struct EmptySectionRule;

impl ValidationRule for EmptySectionRule {
    fn name(&self) -> &'static str { "empty_section" }

    fn validate(&self, config: &LayoutConfig) -> Vec<ValidationViolation> {
        config
            .sections
            .iter()
            .flatten()
            .enumerate()
            .filter(|(_, section)| section.regions.iter().all(|(_, components)| components.is_empty()))
            .map(|(s, _)| {
                violation(
                    self,
                    ViolationSeverity::Info,
                    "Section has no components configured",
                    Some(format!("sections[{s}]")),
                    "Leave as is if the section is meant for later authoring",
                )
            })
            .collect()
    }
}

/// Validator orchestrates rules
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(SectionSourceRule),
                Box::new(RegionNameRule),
                Box::new(BlockSourceRule),
                Box::new(EmptySectionRule),
            ],
        }
    }

    pub fn validate(&self, config: &LayoutConfig) -> ValidationResult {
        let violations = self
            .rules
            .iter()
            .flat_map(|rule| rule.validate(config))
            .collect();
        ValidationResult::from_violations(violations)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
