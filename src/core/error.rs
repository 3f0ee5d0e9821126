//! BR-007: Graph construction errors.
//!
//! Every failure aborts the whole call that raised it. Messages carry the
//! template, row index and column needed to find the faulty declaration.

use thiserror::Error;

/// Result type for graph construction.
pub type BuildResult<T> = Result<T, BuildError>;

/// Construction-time failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    /// A template references a `$placeholder` the table does not have.
    #[error("template '{template}' references unknown column '{column}' (available: {})", .available.join(", "))]
    UnknownColumn {
        template: String,
        column: String,
        available: Vec<String>,
    },

    /// Two rows yield the same identifier for the same template.
    #[error("template '{template}' produces duplicate name '{name}' for rows {} and {}", .rows.0, .rows.1)]
    NamingCollision {
        template: String,
        name: String,
        rows: (usize, usize),
    },

    /// Column lengths differ in a row-wise substitution.
    #[error("column '{column}' has {actual} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// A combined node was requested over zero sources.
    #[error("combined target '{name}' has no source targets")]
    EmptyGroup { name: String },

    /// A new node would reuse the name of an existing node.
    #[error("target name '{name}' already exists in the graph (declared by {existing})")]
    NameConflict { name: String, existing: String },

    /// A row does not match the table schema.
    #[error("row {row}: {detail}")]
    TableSchema { row: usize, detail: String },

    /// A column and a sibling template share a name.
    #[error("column '{name}' has the same name as a template in the same expansion")]
    AmbiguousPlaceholder { name: String },

    /// A reducer does not mention its collection placeholder.
    #[error("combined target '{name}' never references placeholder '${placeholder}'")]
    MissingPlaceholder { name: String, placeholder: String },

    /// A node depends on a name that is neither a node nor an external.
    #[error("target '{target}' depends on unknown '{dependency}'")]
    DanglingDependency { target: String, dependency: String },

    /// The dependency graph has a cycle.
    #[error("dependency cycle detected involving: {}", .members.join(", "))]
    Cycle { members: Vec<String> },

    /// An expression could not be read.
    #[error("syntax error at offset {offset} in `{source_text}`: {message}")]
    Syntax {
        source_text: String,
        offset: usize,
        message: String,
    },

    /// A pipeline file could not be read.
    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },

    /// A pipeline file could not be decoded.
    #[error("pipeline parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_br007_unknown_column_message() {
        let err = BuildError::UnknownColumn {
            template: "analysis".to_string(),
            column: "dataset".to_string(),
            available: vec!["method".to_string(), "data_source".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("analysis"));
        assert!(msg.contains("dataset"));
        assert!(msg.contains("method, data_source"));
    }

    #[test]
    fn test_br007_collision_names_rows() {
        let err = BuildError::NamingCollision {
            template: "fit".to_string(),
            name: "fit_a_b".to_string(),
            rows: (0, 3),
        };
        assert_eq!(
            err.to_string(),
            "template 'fit' produces duplicate name 'fit_a_b' for rows 0 and 3"
        );
    }

    #[test]
    fn test_br007_cycle_message() {
        let err = BuildError::Cycle {
            members: vec!["a".to_string(), "b".to_string()],
        };
        assert!(err.to_string().contains("cycle"));
        assert!(err.to_string().contains("a, b"));
    }

    #[test]
    fn test_br007_missing_placeholder_message() {
        let err = BuildError::MissingPlaceholder {
            name: "all".to_string(),
            placeholder: ".x".to_string(),
        };
        assert!(err.to_string().contains("$.x"));
    }
}
