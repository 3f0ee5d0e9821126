//! BR-012: Finished graph and its structural checks.
//!
//! Verifies that every edge points at a node or a declared external and
//! that the graph is acyclic (Kahn's algorithm with alphabetical
//! tie-breaking, so error reports are deterministic). Ordering the work is
//! the executor's business; the order computed here is only used to find
//! cycle members.

use super::error::{BuildError, BuildResult};
use super::types::{ConcreteTarget, ManifestEntry, NodeKind};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet, VecDeque};

/// Node set handed to the executor.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: IndexMap<String, ConcreteTarget>,
    externals: IndexSet<String>,
}

impl Graph {
    pub fn new(nodes: IndexMap<String, ConcreteTarget>, externals: IndexSet<String>) -> Self {
        Self { nodes, externals }
    }

    pub fn get(&self, name: &str) -> Option<&ConcreteTarget> {
        self.nodes.get(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ConcreteTarget> {
        self.nodes.values()
    }

    pub fn externals(&self) -> &IndexSet<String> {
        &self.externals
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Count of nodes of one kind.
    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes.values().filter(|n| n.kind() == kind).count()
    }

    /// Edges to other nodes only (externals dropped).
    pub fn edges(&self) -> Vec<(&str, &str)> {
        let mut edges = Vec::new();
        for (id, node) in &self.nodes {
            for dep in &node.dependencies {
                if self.nodes.contains_key(dep) {
                    edges.push((dep.as_str(), id.as_str()));
                }
            }
        }
        edges
    }

    /// Read-only listing of every node, in insertion order.
    pub fn manifest(&self) -> Vec<ManifestEntry> {
        self.nodes.values().map(ManifestEntry::from).collect()
    }

    /// Check edges and acyclicity.
    pub fn validate(&self) -> BuildResult<()> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

        for id in self.nodes.keys() {
            in_degree.insert(id, 0);
            adjacency.insert(id, Vec::new());
        }

        for (id, node) in &self.nodes {
            for dep in &node.dependencies {
                if self.externals.contains(dep) && !self.nodes.contains_key(dep) {
                    continue;
                }
                if !self.nodes.contains_key(dep) {
                    return Err(BuildError::DanglingDependency {
                        target: id.clone(),
                        dependency: dep.clone(),
                    });
                }
                if let Some(children) = adjacency.get_mut(dep.as_str()) {
                    children.push(id);
                }
                if let Some(degree) = in_degree.get_mut(id.as_str()) {
                    *degree += 1;
                }
            }
        }

        let mut zero_degree: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(id, _)| *id)
            .collect();
        zero_degree.sort_unstable();
        let mut queue: VecDeque<&str> = zero_degree.into_iter().collect();

        let mut visited = 0usize;
        let mut done: HashSet<&str> = HashSet::new();
        while let Some(current) = queue.pop_front() {
            visited += 1;
            done.insert(current);

            let mut next_ready: Vec<&str> = Vec::new();
            if let Some(children) = adjacency.get(current) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            next_ready.push(child);
                        }
                    }
                }
            }
            next_ready.sort_unstable();
            queue.extend(next_ready);
        }

        if visited != self.nodes.len() {
            let mut members: Vec<String> = self
                .nodes
                .keys()
                .filter(|id| !done.contains(id.as_str()))
                .cloned()
                .collect();
            members.sort();
            return Err(BuildError::Cycle { members });
        }
        Ok(())
    }
}
