//! Core graph construction — expressions, tables, naming, expansion, aggregation.

pub mod combine;
pub mod context;
pub mod error;
pub mod eval;
pub mod expand;
pub mod expr;
pub mod infer;
pub mod naming;
pub mod parser;
pub mod resolver;
pub mod syntax;
pub mod table;
pub mod types;
