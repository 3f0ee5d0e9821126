//! BR-009: Build context — the graph under construction.
//!
//! Every expansion, combination and plain target of one build goes through a
//! single `BuildContext`. It owns the accumulated nodes and the set of names
//! dependency inference matches against. Nothing here is global; two
//! contexts never see each other.

use super::combine::{self, CombineSpec};
use super::error::{BuildError, BuildResult};
use super::expand::{self, MapSpec};
use super::infer;
use super::resolver::Graph;
use super::table::ParamTable;
use super::types::{ConcreteTarget, Expansion, ExpansionGroup, TargetTemplate};
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

/// Accumulating node set of one build.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    nodes: IndexMap<String, ConcreteTarget>,
    externals: IndexSet<String>,
    groups: IndexMap<String, Vec<ExpansionGroup>>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a name that exists outside the build (a function, a dataset).
    /// Externals are matched by inference and accepted by validation, but are
    /// not nodes.
    pub fn declare_external(&mut self, name: impl Into<String>) -> &mut Self {
        self.externals.insert(name.into());
        self
    }

    /// Add one plain, unexpanded target.
    pub fn add_target(&mut self, template: &TargetTemplate) -> BuildResult<ConcreteTarget> {
        let mut placeholders = template.command.placeholders();
        if let Some(pattern) = &template.pattern {
            placeholders.extend(pattern.placeholders());
        }
        if let Some(column) = placeholders.into_iter().next() {
            return Err(BuildError::UnknownColumn {
                template: template.name.clone(),
                column,
                available: Vec::new(),
            });
        }
        self.ensure_free(&template.name)?;

        let known = self.known_names();
        let target = ConcreteTarget {
            name: template.name.clone(),
            command: template.command.clone(),
            pattern: template.pattern.clone(),
            dependencies: infer::infer_target(
                &template.name,
                &template.command,
                template.pattern.as_ref(),
                &known,
            ),
            description: template.description.clone(),
            origin: None,
        };
        debug!(name = %target.name, deps = target.dependencies.len(), "added plain target");
        self.register(vec![target.clone()]);
        Ok(target)
    }

    /// Expand templates over a table (static branching).
    pub fn expand(&mut self, spec: &MapSpec, table: &ParamTable) -> BuildResult<Expansion> {
        expand::expand(self, spec, table)
    }

    /// Collapse sources into one combined target.
    pub fn combine(&mut self, spec: &CombineSpec) -> BuildResult<ConcreteTarget> {
        combine::combine(self, spec)
    }

    /// Every target expanded so far from `template`, across all expansions.
    pub fn group(&self, template: &str) -> Option<ExpansionGroup> {
        let groups = self.groups.get(template)?;
        Some(ExpansionGroup {
            template: template.to_string(),
            targets: groups.iter().flat_map(|g| g.targets.iter().cloned()).collect(),
        })
    }

    pub fn node(&self, name: &str) -> Option<&ConcreteTarget> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ConcreteTarget> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node names plus externals: what inference matches against.
    pub fn known_names(&self) -> IndexSet<String> {
        self.nodes
            .keys()
            .chain(self.externals.iter())
            .cloned()
            .collect()
    }

    /// Fail if `name` is already a node.
    pub(crate) fn ensure_free(&self, name: &str) -> BuildResult<()> {
        match self.nodes.get(name) {
            Some(existing) => Err(BuildError::NameConflict {
                name: name.to_string(),
                existing: describe_owner(existing),
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn register(&mut self, targets: Vec<ConcreteTarget>) {
        for t in targets {
            self.nodes.insert(t.name.clone(), t);
        }
    }

    pub(crate) fn remember_groups(&mut self, groups: Vec<ExpansionGroup>) {
        for g in groups {
            self.groups.entry(g.template.clone()).or_default().push(g);
        }
    }

    /// Finish the build.
    pub fn into_graph(self) -> Graph {
        Graph::new(self.nodes, self.externals)
    }
}

fn describe_owner(target: &ConcreteTarget) -> String {
    match &target.origin {
        Some(origin) => format!("template '{}' row {}", origin.template, origin.row_index),
        None => format!("target '{}'", target.name),
    }
}
