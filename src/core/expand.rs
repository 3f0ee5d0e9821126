//! BR-006: Static branching — expand templates over a parameter table.
//!
//! Every template is copied once per row. In each copy, `$column`
//! placeholders take that row's cells and references to sibling templates
//! are rewritten to the sibling's copy for the same row, in `command` and
//! `pattern` alike. A per-row summary therefore reads (and fans out over)
//! its own row's analysis, never another row's.
//!
//! The call is all-or-nothing: every check runs before the first node is
//! registered.

use super::context::BuildContext;
use super::error::{BuildError, BuildResult};
use super::expr::Bindings;
use super::infer;
use super::naming::{self, NamingOptions};
use super::table::{ParamTable, ParameterRow};
use super::types::{ConcreteTarget, Expansion, ExpansionGroup, Origin, TargetTemplate};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

/// One static-branching request.
#[derive(Debug, Clone, PartialEq)]
pub struct MapSpec {
    /// Templates, in output order
    pub templates: Vec<TargetTemplate>,

    /// Naming of the generated targets
    pub naming: NamingOptions,

    /// Group output by template instead of flattening
    pub group_output: bool,

    /// Columns appended to each target's description
    pub description_columns: Vec<String>,
}

impl MapSpec {
    pub fn new(templates: Vec<TargetTemplate>) -> Self {
        Self {
            templates,
            naming: NamingOptions::default(),
            group_output: false,
            description_columns: Vec::new(),
        }
    }

    pub fn names<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.naming.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.naming.delimiter = delimiter.into();
        self
    }

    pub fn grouped(mut self) -> Self {
        self.group_output = true;
        self
    }

    pub fn describe_with<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.description_columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// Expand `spec` over `table` and register the result in `ctx`.
///
/// An empty table yields an empty expansion.
pub fn expand(
    ctx: &mut BuildContext,
    spec: &MapSpec,
    table: &ParamTable,
) -> BuildResult<Expansion> {
    if table.is_empty() || spec.templates.is_empty() {
        debug!(
            templates = spec.templates.len(),
            rows = table.len(),
            "nothing to expand"
        );
        return Ok(empty(spec));
    }

    check_columns(spec, table)?;
    let names = assign_all_names(ctx, spec, table)?;

    let mut known = ctx.known_names();
    for per_template in &names {
        known.extend(per_template.iter().cloned());
    }

    // groups[t][r] for template t, row r
    let mut groups: Vec<Vec<ConcreteTarget>> =
        vec![Vec::with_capacity(table.len()); spec.templates.len()];
    for (r, row) in table.rows().iter().enumerate() {
        let mut bindings = Bindings::new();
        for (column, value) in row {
            bindings.bind(column.clone(), value.to_expr());
        }
        for (t, template) in spec.templates.iter().enumerate() {
            bindings.rename(template.name.clone(), names[t][r].clone());
        }

        for (t, template) in spec.templates.iter().enumerate() {
            let name = names[t][r].clone();
            let command = template.command.substitute(&bindings);
            let pattern = template.pattern.as_ref().map(|p| p.substitute(&bindings));
            let dependencies = infer::infer_target(&name, &command, pattern.as_ref(), &known);
            trace!(name = %name, command = %command, deps = dependencies.len(), "expanded target");
            groups[t].push(ConcreteTarget {
                name,
                command,
                pattern,
                dependencies,
                description: describe(template, row, &spec.description_columns),
                origin: Some(Origin {
                    template: template.name.clone(),
                    row_index: r,
                    row: row.clone(),
                }),
            });
        }
    }

    let groups: Vec<ExpansionGroup> = spec
        .templates
        .iter()
        .zip(groups)
        .map(|(template, targets)| ExpansionGroup {
            template: template.name.clone(),
            targets,
        })
        .collect();

    let expansion = if spec.group_output {
        Expansion::Grouped(groups.clone())
    } else {
        // row-major
        let mut flat = Vec::with_capacity(table.len() * spec.templates.len());
        for r in 0..table.len() {
            for g in &groups {
                flat.push(g.targets[r].clone());
            }
        }
        Expansion::Flat(flat)
    };

    for g in &groups {
        ctx.register(g.targets.clone());
    }
    ctx.remember_groups(groups);
    debug!(
        templates = spec.templates.len(),
        rows = table.len(),
        targets = expansion.len(),
        "expanded templates"
    );
    Ok(expansion)
}

fn empty(spec: &MapSpec) -> Expansion {
    if spec.group_output {
        Expansion::Grouped(
            spec.templates
                .iter()
                .map(|t| ExpansionGroup {
                    template: t.name.clone(),
                    targets: Vec::new(),
                })
                .collect(),
        )
    } else {
        Expansion::Flat(Vec::new())
    }
}

/// Placeholders, description columns and template names against the schema.
fn check_columns(spec: &MapSpec, table: &ParamTable) -> BuildResult<()> {
    for template in &spec.templates {
        if table.has_column(&template.name) {
            return Err(BuildError::AmbiguousPlaceholder {
                name: template.name.clone(),
            });
        }
        let mut placeholders = template.command.placeholders();
        if let Some(pattern) = &template.pattern {
            placeholders.extend(pattern.placeholders());
        }
        let unknown = placeholders
            .into_iter()
            .chain(spec.description_columns.iter().cloned())
            .find(|p| !table.has_column(p));
        if let Some(column) = unknown {
            return Err(BuildError::UnknownColumn {
                template: template.name.clone(),
                column,
                available: table.columns().to_vec(),
            });
        }
    }
    Ok(())
}

/// `names[t][r]`, unique within the call and against the context.
fn assign_all_names(
    ctx: &BuildContext,
    spec: &MapSpec,
    table: &ParamTable,
) -> BuildResult<Vec<Vec<String>>> {
    let mut claimed: FxHashMap<String, (usize, usize)> = FxHashMap::default();
    let mut names = Vec::with_capacity(spec.templates.len());
    for (t, template) in spec.templates.iter().enumerate() {
        let per_template = naming::assign_names(&template.name, table, &spec.naming)?;
        for (r, name) in per_template.iter().enumerate() {
            ctx.ensure_free(name)?;
            if let Some(&(other_t, other_r)) = claimed.get(name) {
                return Err(BuildError::NameConflict {
                    name: name.clone(),
                    existing: format!(
                        "template '{}' row {}",
                        spec.templates[other_t].name, other_r
                    ),
                });
            }
            claimed.insert(name.clone(), (t, r));
        }
        names.push(per_template);
    }
    Ok(names)
}

fn describe(
    template: &TargetTemplate,
    row: &ParameterRow,
    columns: &[String],
) -> Option<String> {
    let mut parts: Vec<String> = template.description.iter().cloned().collect();
    for column in columns {
        if let Some(value) = row.get(column) {
            parts.push(value.token());
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}
