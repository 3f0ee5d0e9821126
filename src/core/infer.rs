//! BR-005: Static dependency inference.
//!
//! Walks a substituted command (and pattern) and keeps every symbol that
//! names a known target. No scoping or shadowing analysis: a syntactic match
//! is a dependency. Extra edges are allowed, missing edges are not.

use super::expr::Expr;
use indexmap::IndexSet;

/// Lookup of names that count as graph nodes.
pub trait KnownNames {
    fn is_known(&self, name: &str) -> bool;
}

impl<S: std::hash::BuildHasher> KnownNames for std::collections::HashSet<String, S> {
    fn is_known(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl<S: std::hash::BuildHasher> KnownNames for IndexSet<String, S> {
    fn is_known(&self, name: &str) -> bool {
        self.contains(name)
    }
}

/// Known names referenced by `expr`, in first-occurrence order.
pub fn infer<K: KnownNames + ?Sized>(expr: &Expr, known: &K) -> IndexSet<String> {
    expr.symbols()
        .into_iter()
        .filter(|s| known.is_known(s))
        .collect()
}

/// Dependencies of one node: command and pattern walked alike, the node's
/// own name excluded.
pub fn infer_target<K: KnownNames + ?Sized>(
    name: &str,
    command: &Expr,
    pattern: Option<&Expr>,
    known: &K,
) -> IndexSet<String> {
    let mut deps = infer(command, known);
    if let Some(pattern) = pattern {
        deps.extend(infer(pattern, known));
    }
    deps.shift_remove(name);
    deps
}
