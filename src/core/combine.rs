//! BR-010: Aggregation — one new target over a group of targets.
//!
//! The reducer's collection placeholder (`$.x` by default) is replaced by a
//! reference to every source, in order: spliced into the surrounding call
//! (`concat($.x)` becomes `concat(head_mtcars, tail_mtcars)`), or wrapped in
//! `list(...)` anywhere else. The new target depends on every source.

use super::context::BuildContext;
use super::error::{BuildError, BuildResult};
use super::expr::{Arg, Bindings, Expr};
use super::infer;
use super::naming::{self, DEFAULT_DELIMITER};
use super::types::{ConcreteTarget, Expansion, ExpansionGroup};
use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use tracing::debug;

pub const DEFAULT_PLACEHOLDER: &str = ".x";

/// What a combined target aggregates.
#[derive(Debug, Clone, PartialEq)]
pub enum Sources {
    Targets(Vec<ConcreteTarget>),
    Groups(Vec<ExpansionGroup>),
}

impl Sources {
    /// Sources in order, groups flattened, repeats dropped.
    pub fn flatten(&self) -> Vec<&ConcreteTarget> {
        let all: Vec<&ConcreteTarget> = match self {
            Self::Targets(targets) => targets.iter().collect(),
            Self::Groups(groups) => groups.iter().flat_map(|g| g.targets.iter()).collect(),
        };
        let mut seen = IndexSet::new();
        all.into_iter()
            .filter(|t| seen.insert(t.name.as_str()))
            .collect()
    }
}

impl From<Vec<ConcreteTarget>> for Sources {
    fn from(targets: Vec<ConcreteTarget>) -> Self {
        Self::Targets(targets)
    }
}

impl From<Vec<ExpansionGroup>> for Sources {
    fn from(groups: Vec<ExpansionGroup>) -> Self {
        Self::Groups(groups)
    }
}

impl From<Expansion> for Sources {
    fn from(expansion: Expansion) -> Self {
        match expansion {
            Expansion::Flat(targets) => Self::Targets(targets),
            Expansion::Grouped(groups) => Self::Groups(groups),
        }
    }
}

/// One aggregation request.
#[derive(Debug, Clone, PartialEq)]
pub struct CombineSpec {
    /// Name of the combined target
    pub name: String,

    pub sources: Sources,

    /// Reducer command containing the collection placeholder
    pub reducer: Expr,

    /// Name each source's argument by this column of its originating row
    pub label_column: Option<String>,

    /// Collection placeholder name (without `$`)
    pub placeholder: String,

    /// Optional runtime fan-out over the combined sources
    pub pattern: Option<Expr>,

    pub description: Option<String>,
}

impl CombineSpec {
    pub fn new(name: impl Into<String>, sources: impl Into<Sources>, reducer: Expr) -> Self {
        Self {
            name: name.into(),
            sources: sources.into(),
            reducer,
            label_column: None,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            pattern: None,
            description: None,
        }
    }

    pub fn labelled(mut self, column: impl Into<String>) -> Self {
        self.label_column = Some(column.into());
        self
    }

    pub fn placeholder(mut self, name: impl Into<String>) -> Self {
        self.placeholder = name.into();
        self
    }

    pub fn with_pattern(mut self, pattern: Expr) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Build the combined target and register it in `ctx`.
pub fn combine(ctx: &mut BuildContext, spec: &CombineSpec) -> BuildResult<ConcreteTarget> {
    let sources = spec.sources.flatten();
    if sources.is_empty() {
        return Err(BuildError::EmptyGroup {
            name: spec.name.clone(),
        });
    }
    ctx.ensure_free(&spec.name)?;
    if !spec.reducer.placeholders().contains(&spec.placeholder) {
        return Err(BuildError::MissingPlaceholder {
            name: spec.name.clone(),
            placeholder: spec.placeholder.clone(),
        });
    }

    let labels = match &spec.label_column {
        Some(column) => Some(source_labels(&spec.name, &sources, column)?),
        None => None,
    };
    let args: Vec<Arg> = sources
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let value = Expr::sym(t.name.clone());
            match &labels {
                Some(labels) => Arg::named(labels[i].clone(), value),
                None => Arg::positional(value),
            }
        })
        .collect();

    let mut bindings = Bindings::new();
    bindings.splice(spec.placeholder.clone(), args);
    let command = spec.reducer.substitute(&bindings);
    let pattern = spec.pattern.as_ref().map(|p| p.substitute(&bindings));

    let mut dependencies: IndexSet<String> = sources.iter().map(|t| t.name.clone()).collect();
    let mut known = ctx.known_names();
    known.extend(dependencies.iter().cloned());
    dependencies.extend(infer::infer_target(
        &spec.name,
        &command,
        pattern.as_ref(),
        &known,
    ));

    let target = ConcreteTarget {
        name: spec.name.clone(),
        command,
        pattern,
        dependencies,
        description: spec.description.clone(),
        origin: None,
    };
    debug!(
        name = %target.name,
        sources = sources.len(),
        labelled = labels.is_some(),
        "combined targets"
    );
    ctx.register(vec![target.clone()]);
    Ok(target)
}

/// One argument name per source, from the label column of its row. Repeated
/// labels are qualified with the originating template.
fn source_labels(
    combined: &str,
    sources: &[&ConcreteTarget],
    column: &str,
) -> BuildResult<Vec<String>> {
    let mut labels = Vec::with_capacity(sources.len());
    for t in sources {
        let origin = t.origin.as_ref().ok_or_else(|| BuildError::UnknownColumn {
            template: t.name.clone(),
            column: column.to_string(),
            available: Vec::new(),
        })?;
        let label = naming::label(&origin.row, column).ok_or_else(|| BuildError::UnknownColumn {
            template: origin.template.clone(),
            column: column.to_string(),
            available: origin.row.keys().cloned().collect(),
        })?;
        labels.push(label);
    }

    if first_duplicate(&labels).is_some() {
        labels = sources
            .iter()
            .zip(&labels)
            .map(|(t, label)| {
                naming::canonicalize(&format!(
                    "{}{}{}",
                    t.template_name(),
                    DEFAULT_DELIMITER,
                    label
                ))
            })
            .collect();
    }
    if let Some((first, second)) = first_duplicate(&labels) {
        return Err(BuildError::NamingCollision {
            template: combined.to_string(),
            name: labels[second].clone(),
            rows: (first, second),
        });
    }
    Ok(labels)
}

fn first_duplicate(labels: &[String]) -> Option<(usize, usize)> {
    let mut seen: FxHashMap<&str, usize> = FxHashMap::default();
    for (i, label) in labels.iter().enumerate() {
        if let Some(&first) = seen.get(label.as_str()) {
            return Some((first, i));
        }
        seen.insert(label, i);
    }
    None
}
