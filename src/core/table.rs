//! BR-003: Parameter tables.
//!
//! An ordered table of rows sharing one column schema. Each row drives one
//! copy of every template during expansion. Row order matters: it decides
//! output order and positional name suffixes.

use super::error::{BuildError, BuildResult};
use super::expr::Value;
use indexmap::IndexMap;

/// One row: column name to cell, in table column order.
pub type ParameterRow = IndexMap<String, Value>;

/// Ordered rows over a fixed column schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTable {
    columns: Vec<String>,
    rows: Vec<ParameterRow>,
}

impl ParamTable {
    /// Empty table with the given schema.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build from rows; the first row fixes the schema.
    pub fn from_rows(rows: Vec<ParameterRow>) -> BuildResult<Self> {
        let columns = rows
            .first()
            .map(|r| r.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Build from equal-length columns.
    pub fn from_columns(columns: IndexMap<String, Vec<Value>>) -> BuildResult<Self> {
        let expected = check_lengths(&columns)?;
        let mut table = Self::new(columns.keys().cloned());
        for i in 0..expected {
            let row: ParameterRow = columns
                .iter()
                .map(|(name, values)| (name.clone(), values[i].clone()))
                .collect();
            table.rows.push(row);
        }
        Ok(table)
    }

    /// Append a row. Its keys must be exactly the table's columns; the row is
    /// stored in column order.
    pub fn push_row(&mut self, mut row: ParameterRow) -> BuildResult<()> {
        let index = self.rows.len();
        let missing: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| !row.contains_key(*c))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::TableSchema {
                row: index,
                detail: format!("missing column(s) {}", missing.join(", ")),
            });
        }
        let extra: Vec<&str> = row
            .keys()
            .filter(|k| !self.columns.contains(k))
            .map(String::as_str)
            .collect();
        if !extra.is_empty() {
            return Err(BuildError::TableSchema {
                row: index,
                detail: format!("unexpected column(s) {}", extra.join(", ")),
            });
        }

        let mut ordered = ParameterRow::with_capacity(self.columns.len());
        for column in &self.columns {
            if let Some(value) = row.shift_remove(column) {
                ordered.insert(column.clone(), value);
            }
        }
        self.rows.push(ordered);
        Ok(())
    }

    /// Cartesian product: every row of `self` combined with every row of
    /// `other`, `self` outermost.
    pub fn cross(&self, other: &ParamTable) -> BuildResult<ParamTable> {
        if let Some(shared) = self.columns.iter().find(|c| other.has_column(c)) {
            return Err(BuildError::TableSchema {
                row: 0,
                detail: format!("column '{}' appears in both tables", shared),
            });
        }
        let mut out = ParamTable::new(self.columns.iter().chain(other.columns.iter()).cloned());
        for left in &self.rows {
            for right in &other.rows {
                let mut row = left.clone();
                row.extend(right.iter().map(|(k, v)| (k.clone(), v.clone())));
                out.rows.push(row);
            }
        }
        Ok(out)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[ParameterRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Verify every column has the same length as the first; return that length.
pub(crate) fn check_lengths(columns: &IndexMap<String, Vec<Value>>) -> BuildResult<usize> {
    let expected = columns.values().next().map(Vec::len).unwrap_or(0);
    for (name, values) in columns {
        if values.len() != expected {
            return Err(BuildError::LengthMismatch {
                column: name.clone(),
                expected,
                actual: values.len(),
            });
        }
    }
    Ok(expected)
}
