//! BR-013: Pipeline file parsing, validation and building.
//!
//! Parses pipeline.yaml and validates structural constraints:
//! - Name must not be empty
//! - Target, template, combine and external names must be identifiers, and
//!   a map delimiter may only use identifier characters
//! - Every expression must parse
//! - Each stage is exactly one of `map`, `combine`, `targets`
//! - Map stages declare templates and give rows or columns, not both
//! - Combine stages take `groups` or `targets`, not both, and groups must
//!   name a template expanded by an earlier stage

use super::combine::{CombineSpec, Sources};
use super::context::BuildContext;
use super::error::{BuildError, BuildResult};
use super::expand::MapSpec;
use super::expr::{Expr, Value};
use super::resolver::Graph;
use super::syntax::parse_expr;
use super::table::{ParamTable, ParameterRow};
use super::types::{ConcreteTarget, ExpansionGroup, TargetTemplate};
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use tracing::info;

static NODE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_.][A-Za-z0-9_.]*$").expect("valid regex"));

static DELIMITER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.]*$").expect("valid regex"));

// ============================================================================
// File model
// ============================================================================

/// Top-level pipeline.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineFile {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Names defined outside the pipeline (functions, datasets)
    #[serde(default)]
    pub externals: Vec<String>,

    /// Plain targets, added before any stage runs
    #[serde(default)]
    pub targets: IndexMap<String, TemplateDecl>,

    #[serde(default)]
    pub stages: Vec<Stage>,
}

/// A target as written in the file. Expressions are text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateDecl {
    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One build step. Exactly one field is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<MapStage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combine: Option<CombineStage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<IndexMap<String, TemplateDecl>>,
}

impl Stage {
    /// Label used in logs and validation messages.
    pub fn kind(&self) -> &'static str {
        match (&self.map, &self.combine, &self.targets) {
            (Some(_), None, None) => "map",
            (None, Some(_), None) => "combine",
            (None, None, Some(_)) => "targets",
            (None, None, None) => "empty",
            _ => "mixed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapStage {
    pub templates: IndexMap<String, TemplateDecl>,

    /// Table given row by row
    #[serde(default)]
    pub values: Vec<ParameterRow>,

    /// Table given column by column
    #[serde(default)]
    pub columns: IndexMap<String, Vec<Value>>,

    /// Columns that make up the generated names
    #[serde(default)]
    pub names: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,

    /// Columns appended to each target's description
    #[serde(default)]
    pub descriptions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CombineStage {
    pub name: String,

    /// Templates whose expanded targets are combined
    #[serde(default)]
    pub groups: Vec<String>,

    /// Individual targets to combine
    #[serde(default)]
    pub targets: Vec<String>,

    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a pipeline.yaml file from disk.
pub fn parse_pipeline_file(path: &Path) -> BuildResult<PipelineFile> {
    let content = std::fs::read_to_string(path).map_err(|e| BuildError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_pipeline(&content)
}

/// Parse a pipeline.yaml from a string.
pub fn parse_pipeline(yaml: &str) -> BuildResult<PipelineFile> {
    serde_yaml_ng::from_str(yaml).map_err(|e| BuildError::Parse(e.to_string()))
}

// ============================================================================
// Validation
// ============================================================================

/// Validate a parsed pipeline. Returns a list of errors (empty = valid).
pub fn validate_pipeline(pipeline: &PipelineFile) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if pipeline.name.trim().is_empty() {
        errors.push(ValidationError {
            message: "name must not be empty".to_string(),
        });
    }

    for name in &pipeline.externals {
        check_name(&mut errors, &format!("external '{}'", name), name);
    }

    for (name, decl) in &pipeline.targets {
        let what = format!("target '{}'", name);
        check_name(&mut errors, &what, name);
        check_decl(&mut errors, &what, decl);
    }

    let mut expanded: IndexSet<&str> = IndexSet::new();
    for (i, stage) in pipeline.stages.iter().enumerate() {
        match stage.kind() {
            "empty" => errors.push(ValidationError {
                message: format!("stage {} is empty", i),
            }),
            "mixed" => errors.push(ValidationError {
                message: format!(
                    "stage {} must be exactly one of map, combine, targets",
                    i
                ),
            }),
            _ => {}
        }

        if let Some(map) = &stage.map {
            if map.templates.is_empty() {
                errors.push(ValidationError {
                    message: format!("stage {} (map) has no templates", i),
                });
            }
            if !map.values.is_empty() && !map.columns.is_empty() {
                errors.push(ValidationError {
                    message: format!("stage {} (map) gives both values and columns", i),
                });
            }
            if let Some(delimiter) = &map.delimiter {
                if !DELIMITER.is_match(delimiter) {
                    errors.push(ValidationError {
                        message: format!(
                            "stage {} (map) delimiter '{}' may only contain letters, digits, '_' and '.'",
                            i, delimiter
                        ),
                    });
                }
            }
            for (name, decl) in &map.templates {
                let what = format!("stage {} template '{}'", i, name);
                check_name(&mut errors, &what, name);
                check_decl(&mut errors, &what, decl);
                expanded.insert(name);
            }
        }

        if let Some(combine) = &stage.combine {
            check_combine(&mut errors, i, combine, &expanded);
        }

        if let Some(targets) = &stage.targets {
            for (name, decl) in targets {
                let what = format!("stage {} target '{}'", i, name);
                check_name(&mut errors, &what, name);
                check_decl(&mut errors, &what, decl);
            }
        }
    }

    errors
}

fn check_combine(
    errors: &mut Vec<ValidationError>,
    index: usize,
    combine: &CombineStage,
    expanded: &IndexSet<&str>,
) {
    let what = format!("stage {} (combine '{}')", index, combine.name);
    if combine.name.trim().is_empty() {
        errors.push(ValidationError {
            message: format!("stage {} (combine) has no name", index),
        });
    } else {
        check_name(errors, &what, &combine.name);
    }
    match (combine.groups.is_empty(), combine.targets.is_empty()) {
        (true, true) => errors.push(ValidationError {
            message: format!("{} needs groups or targets", what),
        }),
        (false, false) => errors.push(ValidationError {
            message: format!("{} gives both groups and targets", what),
        }),
        _ => {}
    }
    for group in &combine.groups {
        if !expanded.contains(group.as_str()) {
            errors.push(ValidationError {
                message: format!("{} references unknown group '{}'", what, group),
            });
        }
    }
    check_expr(errors, &what, "command", &combine.command);
    if let Some(pattern) = &combine.pattern {
        check_expr(errors, &what, "pattern", pattern);
    }
}

/// Names must read back as a bare symbol, or commands could never refer to
/// them.
fn check_name(errors: &mut Vec<ValidationError>, what: &str, name: &str) {
    let symbol = NODE_NAME.is_match(name) && matches!(parse_expr(name), Ok(Expr::Symbol(_)));
    if !symbol {
        errors.push(ValidationError {
            message: format!("{} is not a valid name", what),
        });
    }
}

fn check_decl(errors: &mut Vec<ValidationError>, what: &str, decl: &TemplateDecl) {
    check_expr(errors, what, "command", &decl.command);
    if let Some(pattern) = &decl.pattern {
        check_expr(errors, what, "pattern", pattern);
    }
}

fn check_expr(errors: &mut Vec<ValidationError>, what: &str, field: &str, text: &str) {
    if let Err(e) = parse_expr(text) {
        errors.push(ValidationError {
            message: format!("{} {}: {}", what, field, e),
        });
    }
}

// ============================================================================
// Building
// ============================================================================

/// Run every stage in order through one `BuildContext` and check the result.
pub fn build_pipeline(pipeline: &PipelineFile) -> BuildResult<Graph> {
    let mut ctx = BuildContext::new();
    for name in &pipeline.externals {
        ctx.declare_external(name.clone());
    }
    for (name, decl) in &pipeline.targets {
        ctx.add_target(&template(name, decl)?)?;
    }

    for (i, stage) in pipeline.stages.iter().enumerate() {
        let before = ctx.len();
        if let Some(map) = &stage.map {
            run_map(&mut ctx, map)?;
        }
        if let Some(combine) = &stage.combine {
            run_combine(&mut ctx, combine)?;
        }
        if let Some(targets) = &stage.targets {
            for (name, decl) in targets {
                ctx.add_target(&template(name, decl)?)?;
            }
        }
        info!(stage = i, kind = stage.kind(), added = ctx.len() - before, "stage done");
    }

    let graph = ctx.into_graph();
    graph.validate()?;
    info!(pipeline = %pipeline.name, nodes = graph.len(), "pipeline built");
    Ok(graph)
}

fn template(name: &str, decl: &TemplateDecl) -> BuildResult<TargetTemplate> {
    let mut template = TargetTemplate::new(name, parse_expr(&decl.command)?);
    if let Some(pattern) = &decl.pattern {
        template = template.with_pattern(parse_expr(pattern)?);
    }
    if let Some(description) = &decl.description {
        template = template.with_description(description.clone());
    }
    Ok(template)
}

fn run_map(ctx: &mut BuildContext, map: &MapStage) -> BuildResult<()> {
    let templates = map
        .templates
        .iter()
        .map(|(name, decl)| template(name, decl))
        .collect::<BuildResult<Vec<_>>>()?;
    let table = if map.columns.is_empty() {
        ParamTable::from_rows(map.values.clone())?
    } else {
        ParamTable::from_columns(map.columns.clone())?
    };

    let mut spec = MapSpec::new(templates)
        .names(map.names.iter().cloned())
        .describe_with(map.descriptions.iter().cloned());
    if let Some(delimiter) = &map.delimiter {
        spec = spec.delimiter(delimiter.clone());
    }
    ctx.expand(&spec, &table)?;
    Ok(())
}

fn run_combine(ctx: &mut BuildContext, stage: &CombineStage) -> BuildResult<()> {
    let sources = if stage.groups.is_empty() {
        let mut targets: Vec<ConcreteTarget> = Vec::with_capacity(stage.targets.len());
        for name in &stage.targets {
            let target = ctx.node(name).ok_or_else(|| dangling(stage, name))?;
            targets.push(target.clone());
        }
        Sources::Targets(targets)
    } else {
        let mut groups: Vec<ExpansionGroup> = Vec::with_capacity(stage.groups.len());
        for name in &stage.groups {
            groups.push(ctx.group(name).ok_or_else(|| dangling(stage, name))?);
        }
        Sources::Groups(groups)
    };

    let mut spec = CombineSpec::new(stage.name.clone(), sources, parse_expr(&stage.command)?);
    if let Some(label) = &stage.label {
        spec = spec.labelled(label.clone());
    }
    if let Some(placeholder) = &stage.placeholder {
        spec = spec.placeholder(placeholder.clone());
    }
    if let Some(pattern) = &stage.pattern {
        spec = spec.with_pattern(parse_expr(pattern)?);
    }
    if let Some(description) = &stage.description {
        spec = spec.with_description(description.clone());
    }
    ctx.combine(&spec)?;
    Ok(())
}

fn dangling(stage: &CombineStage, missing: &str) -> BuildError {
    BuildError::DanglingDependency {
        target: stage.name.clone(),
        dependency: missing.to_string(),
    }
}
