//! BR-002: Graph data model.
//!
//! Templates go in, concrete targets come out. Concrete targets are never
//! mutated after construction; downstream consumers (executor, manifest
//! rendering) only read them.

use super::expr::Expr;
use super::table::ParameterRow;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Templates
// ============================================================================

/// A target declaration with placeholders, expanded once per table row.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetTemplate {
    /// Template name; also the prefix of every generated target name
    pub name: String,

    /// Computation to perform
    pub command: Expr,

    /// Runtime fan-out specification, substituted exactly like `command`
    pub pattern: Option<Expr>,

    /// Optional human-readable description
    pub description: Option<String>,
}

impl TargetTemplate {
    pub fn new(name: impl Into<String>, command: Expr) -> Self {
        Self {
            name: name.into(),
            command,
            pattern: None,
            description: None,
        }
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

// ============================================================================
// Concrete targets
// ============================================================================

/// Whether a node runs once or fans out at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Static,
    Pattern,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Pattern => write!(f, "pattern"),
        }
    }
}

/// Where an expanded target came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    pub template: String,
    pub row_index: usize,
    pub row: ParameterRow,
}

/// A uniquely named node of the dependency graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcreteTarget {
    /// Globally unique name
    pub name: String,

    /// Substituted command
    pub command: Expr,

    /// Substituted pattern
    pub pattern: Option<Expr>,

    /// Names of the nodes this node reads (first-occurrence order)
    pub dependencies: IndexSet<String>,

    /// Description, if the template or the table supplied one
    pub description: Option<String>,

    /// Template and row this target was expanded from (`None` for plain and
    /// combined targets)
    pub origin: Option<Origin>,
}

impl ConcreteTarget {
    pub fn kind(&self) -> NodeKind {
        if self.pattern.is_some() {
            NodeKind::Pattern
        } else {
            NodeKind::Static
        }
    }

    /// Template this target was expanded from, or its own name.
    pub fn template_name(&self) -> &str {
        self.origin
            .as_ref()
            .map(|o| o.template.as_str())
            .unwrap_or(self.name.as_str())
    }
}

/// All targets expanded from one template, in row order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionGroup {
    pub template: String,
    pub targets: Vec<ConcreteTarget>,
}

impl ExpansionGroup {
    pub fn names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Result of one expansion call.
#[derive(Debug, Clone, PartialEq)]
pub enum Expansion {
    /// Row-major: every template for row 0, then row 1, ...
    Flat(Vec<ConcreteTarget>),
    /// One group per template, in template order
    Grouped(Vec<ExpansionGroup>),
}

impl Expansion {
    /// All targets, in the order the variant stores them.
    pub fn targets(&self) -> Vec<&ConcreteTarget> {
        match self {
            Self::Flat(targets) => targets.iter().collect(),
            Self::Grouped(groups) => groups.iter().flat_map(|g| g.targets.iter()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Flat(targets) => targets.len(),
            Self::Grouped(groups) => groups.iter().map(ExpansionGroup::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Groups by template. A flat expansion is regrouped on the fly.
    pub fn groups(&self) -> Vec<ExpansionGroup> {
        match self {
            Self::Grouped(groups) => groups.clone(),
            Self::Flat(targets) => {
                let mut groups: Vec<ExpansionGroup> = Vec::new();
                for t in targets {
                    let template = t.template_name();
                    match groups.iter().position(|g| g.template == template) {
                        Some(i) => groups[i].targets.push(t.clone()),
                        None => groups.push(ExpansionGroup {
                            template: template.to_string(),
                            targets: vec![t.clone()],
                        }),
                    }
                }
                groups
            }
        }
    }

    /// Keep only the groups of the named templates, in the order given.
    pub fn select(&self, templates: &[&str]) -> Vec<ExpansionGroup> {
        let groups = self.groups();
        templates
            .iter()
            .filter_map(|name| groups.iter().find(|g| g.template == *name).cloned())
            .collect()
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// Read-only rendering of a node for listings and downstream tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub kind: NodeKind,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ManifestEntry {
    pub fn is_pattern(&self) -> bool {
        self.kind == NodeKind::Pattern
    }
}

impl From<&ConcreteTarget> for ManifestEntry {
    fn from(t: &ConcreteTarget) -> Self {
        Self {
            name: t.name.clone(),
            kind: t.kind(),
            command: t.command.to_string(),
            pattern: t.pattern.as_ref().map(Expr::to_string),
            dependencies: t.dependencies.iter().cloned().collect(),
            description: t.description.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::syntax::parse_expr;

    fn target(name: &str, template: &str, pattern: Option<&str>) -> ConcreteTarget {
        ConcreteTarget {
            name: name.to_string(),
            command: parse_expr("f(x)").unwrap(),
            pattern: pattern.map(|p| parse_expr(p).unwrap()),
            dependencies: IndexSet::from(["x".to_string()]),
            description: None,
            origin: Some(Origin {
                template: template.to_string(),
                row_index: 0,
                row: ParameterRow::new(),
            }),
        }
    }

    #[test]
    fn test_br002_node_kind() {
        assert_eq!(target("a", "a", None).kind(), NodeKind::Static);
        assert_eq!(target("a", "a", Some("map(x)")).kind(), NodeKind::Pattern);
        assert_eq!(NodeKind::Pattern.to_string(), "pattern");
    }

    #[test]
    fn test_br002_template_builder() {
        let t = TargetTemplate::new("fit", parse_expr("fit($x)").unwrap())
            .with_pattern(parse_expr("map(data)").unwrap())
            .with_description("model fit");
        assert_eq!(t.name, "fit");
        assert!(t.pattern.is_some());
        assert_eq!(t.description.as_deref(), Some("model fit"));
    }

    #[test]
    fn test_br002_regroup_flat_expansion() {
        let flat = Expansion::Flat(vec![
            target("analysis_a", "analysis", None),
            target("summary_a", "summary", None),
            target("analysis_b", "analysis", None),
            target("summary_b", "summary", None),
        ]);
        let groups = flat.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].names(), vec!["analysis_a", "analysis_b"]);
        assert_eq!(groups[1].names(), vec!["summary_a", "summary_b"]);
        assert_eq!(flat.len(), 4);
    }

    #[test]
    fn test_br002_select_groups() {
        let grouped = Expansion::Grouped(vec![
            ExpansionGroup {
                template: "analysis".to_string(),
                targets: vec![target("analysis_a", "analysis", None)],
            },
            ExpansionGroup {
                template: "summary".to_string(),
                targets: vec![target("summary_a", "summary", None)],
            },
        ]);
        let picked = grouped.select(&["summary", "missing"]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].template, "summary");
    }

    #[test]
    fn test_br002_manifest_entry() {
        let entry = ManifestEntry::from(&target("a", "a", Some("map(x)")));
        assert_eq!(entry.command, "f(x)");
        assert_eq!(entry.pattern.as_deref(), Some("map(x)"));
        assert_eq!(entry.dependencies, vec!["x"]);
        assert!(entry.is_pattern());
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"kind\":\"pattern\""));
        assert!(!json.contains("description"));
    }
}
