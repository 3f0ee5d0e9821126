//! BR-001: Unevaluated expression trees.
//!
//! Commands, patterns and reducers are syntax trees that are only ever
//! rewritten, never run. A tree is built from literals, symbol references,
//! `$placeholders` (parameter-table columns) and calls with ordered,
//! optionally named arguments.

use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Literal leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Literal {
    /// Unquoted text of the literal, used for naming and labels.
    pub fn token(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(x) => x.to_string(),
            Self::Str(s) => s.clone(),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Literal {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// A call argument, positional or named.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

impl Arg {
    pub fn positional(value: Expr) -> Self {
        Self { name: None, value }
    }

    pub fn named(name: impl Into<String>, value: Expr) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }
}

/// Unevaluated syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// Reference to a target or an external name.
    Symbol(String),
    /// Parameter-table column, written `$name`.
    Placeholder(String),
    Call { func: String, args: Vec<Arg> },
}

impl Expr {
    pub fn sym(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    pub fn placeholder(name: impl Into<String>) -> Self {
        Self::Placeholder(name.into())
    }

    pub fn lit(value: impl Into<Literal>) -> Self {
        Self::Literal(value.into())
    }

    /// Call with positional arguments only.
    pub fn call(func: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            func: func.into(),
            args: args.into_iter().map(Arg::positional).collect(),
        }
    }

    /// Every symbol leaf and call head, in first-seen order.
    pub fn symbols(&self) -> IndexSet<String> {
        let mut out = IndexSet::new();
        self.visit(&mut |node| match node {
            Expr::Symbol(s) => {
                out.insert(s.clone());
            }
            Expr::Call { func, .. } => {
                out.insert(func.clone());
            }
            _ => {}
        });
        out
    }

    /// Every placeholder name, in first-seen order.
    pub fn placeholders(&self) -> IndexSet<String> {
        let mut out = IndexSet::new();
        self.visit(&mut |node| {
            if let Expr::Placeholder(p) = node {
                out.insert(p.clone());
            }
        });
        out
    }

    /// Pre-order walk over every node.
    pub fn visit<F: FnMut(&Expr)>(&self, f: &mut F) {
        f(self);
        if let Expr::Call { args, .. } = self {
            for arg in args {
                arg.value.visit(f);
            }
        }
    }

    /// Syntactic substitution. Never evaluates anything.
    pub fn substitute(&self, bindings: &Bindings) -> Expr {
        match self {
            Expr::Literal(_) => self.clone(),
            Expr::Symbol(s) => match bindings.renames.get(s) {
                Some(to) => Expr::Symbol(to.clone()),
                None => self.clone(),
            },
            Expr::Placeholder(p) => {
                if let Some(value) = bindings.values.get(p) {
                    value.clone()
                } else if let Some(args) = bindings.splices.get(p) {
                    Expr::Call {
                        func: "list".to_string(),
                        args: args.clone(),
                    }
                } else {
                    self.clone()
                }
            }
            Expr::Call { func, args } => {
                let func = bindings
                    .renames
                    .get(func)
                    .cloned()
                    .unwrap_or_else(|| func.clone());
                let mut out = Vec::with_capacity(args.len());
                for arg in args {
                    match &arg.value {
                        Expr::Placeholder(p) if arg.name.is_none() => {
                            if let Some(spliced) = bindings.splices.get(p) {
                                out.extend(spliced.iter().cloned());
                                continue;
                            }
                            out.push(Arg {
                                name: None,
                                value: arg.value.substitute(bindings),
                            });
                        }
                        value => out.push(Arg {
                            name: arg.name.clone(),
                            value: value.substitute(bindings),
                        }),
                    }
                }
                Expr::Call { func, args: out }
            }
        }
    }
}

/// Substitution environment: placeholder values, placeholder splices and
/// symbol renames.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: FxHashMap<String, Expr>,
    splices: FxHashMap<String, Vec<Arg>>,
    renames: FxHashMap<String, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `$name` with `value`.
    pub fn bind(&mut self, name: impl Into<String>, value: Expr) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Replace `$name` with an argument list. As a positional call argument
    /// the list is spliced in place; elsewhere it becomes `list(...)`.
    pub fn splice(&mut self, name: impl Into<String>, args: Vec<Arg>) -> &mut Self {
        self.splices.insert(name.into(), args);
        self
    }

    /// Rewrite every reference to symbol `from` into `to`.
    pub fn rename(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.renames.insert(from.into(), to.into());
        self
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.values.contains_key(name) || self.splices.contains_key(name)
    }
}

/// A parameter-table cell. Callers tag every cell explicitly: a string
/// literal is data, a symbol is a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CellRepr", into = "CellRepr")]
pub enum Value {
    Literal(Literal),
    Symbol(String),
}

impl Value {
    pub fn sym(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    pub fn lit(value: impl Into<Literal>) -> Self {
        Self::Literal(value.into())
    }

    pub fn to_expr(&self) -> Expr {
        match self {
            Self::Literal(l) => Expr::Literal(l.clone()),
            Self::Symbol(s) => Expr::Symbol(s.clone()),
        }
    }

    /// Unquoted text of the cell.
    pub fn token(&self) -> String {
        match self {
            Self::Literal(l) => l.token(),
            Self::Symbol(s) => s.clone(),
        }
    }
}

/// On-disk form of a cell: scalars are literals, `{symbol: name}` is a
/// symbol reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum CellRepr {
    Symbol { symbol: String },
    Literal(Literal),
}

impl From<CellRepr> for Value {
    fn from(repr: CellRepr) -> Self {
        match repr {
            CellRepr::Symbol { symbol } => Self::Symbol(symbol),
            CellRepr::Literal(l) => Self::Literal(l),
        }
    }
}

impl From<Value> for CellRepr {
    fn from(value: Value) -> Self {
        match value {
            Value::Symbol(symbol) => Self::Symbol { symbol },
            Value::Literal(l) => Self::Literal(l),
        }
    }
}
