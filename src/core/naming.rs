//! BR-004: Deterministic target names.
//!
//! `template` + delimiter + canonicalized values of the selected columns, or
//! `template` + a row-derived hash suffix when no column is selected. Names
//! depend only on the template name and the table: the same table always
//! yields the same names. Hash suffixes start at 8 hex digits and grow for
//! the whole table when two rows would share one, so hash naming never fails.

use super::error::{BuildError, BuildResult};
use super::table::{ParamTable, ParameterRow};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::LazyLock;
use tracing::debug;

pub const DEFAULT_DELIMITER: &str = "_";

/// Hex digits kept from the row hash when they are unique.
const HASH_SUFFIX_LEN: usize = 8;

/// Hex digits in a full BLAKE3 digest.
const HASH_FULL_LEN: usize = 64;

static NON_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]+").expect("valid regex"));

/// How expanded targets are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingOptions {
    /// Columns whose values become the suffix (empty = hash suffix)
    pub columns: Vec<String>,

    /// Separator between template name and each value
    pub delimiter: String,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }
}

impl NamingOptions {
    pub fn by_columns<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Turn arbitrary text into an identifier-safe token. Case is preserved.
pub fn canonicalize(raw: &str) -> String {
    let replaced = NON_IDENT.replace_all(raw, "_");
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        "x".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Canonical label for one cell, usable as an argument name.
pub fn label(row: &ParameterRow, column: &str) -> Option<String> {
    let token = canonicalize(&row.get(column)?.token());
    if token.starts_with(|c: char| c.is_ascii_digit()) {
        Some(format!("x{}", token))
    } else {
        Some(token)
    }
}

/// Name of the target `template` expands to for one row. In hash mode this
/// is the short form; `assign_names` lengthens it when a table needs that.
pub fn generate(
    template: &str,
    row_index: usize,
    row: &ParameterRow,
    options: &NamingOptions,
) -> BuildResult<String> {
    if options.columns.is_empty() {
        return Ok(format!(
            "{}{}{}",
            template,
            options.delimiter,
            &row_digest(row_index, row)[..HASH_SUFFIX_LEN]
        ));
    }

    if let Some(unknown) = options.columns.iter().find(|c| !row.contains_key(*c)) {
        return Err(BuildError::UnknownColumn {
            template: template.to_string(),
            column: unknown.clone(),
            available: row.keys().cloned().collect(),
        });
    }

    let mut name = template.to_string();
    // row order is table column order, not the caller's listing order
    for (column, value) in row {
        if options.columns.contains(column) {
            name.push_str(&options.delimiter);
            name.push_str(&canonicalize(&value.token()));
        }
    }
    Ok(name)
}

/// Positional, content-derived digest: identical rows at different indexes
/// still hash differently.
fn row_digest(row_index: usize, row: &ParameterRow) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(row_index.to_string().as_bytes());
    for (column, value) in row {
        hasher.update(b"\0");
        hasher.update(column.as_bytes());
        hasher.update(b"=");
        hasher.update(value.to_expr().to_string().as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Hash-suffixed names for every row. The suffix starts at `min_len` hex
/// digits and doubles until every name in the table is distinct.
fn hashed_names(
    template: &str,
    table: &ParamTable,
    delimiter: &str,
    min_len: usize,
) -> Vec<String> {
    let digests: Vec<String> = table
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| row_digest(i, row))
        .collect();

    let mut len = min_len.clamp(1, HASH_FULL_LEN);
    loop {
        let names: Vec<String> = digests
            .iter()
            .map(|d| format!("{}{}{}", template, delimiter, &d[..len]))
            .collect();
        let mut seen = FxHashSet::default();
        if names.iter().all(|n| seen.insert(n.as_str())) {
            return names;
        }
        if len == HASH_FULL_LEN {
            break;
        }
        debug!(template, len, "hash suffix collision, lengthening");
        len = (len * 2).min(HASH_FULL_LEN);
    }

    // full digests only repeat for repeated input; the row index settles it
    digests
        .iter()
        .enumerate()
        .map(|(i, d)| format!("{}{}{}{}{}", template, delimiter, d, delimiter, i))
        .collect()
}

/// Names for every row of `table`. Column naming fails on the first
/// duplicate; hash naming always succeeds.
pub fn assign_names(
    template: &str,
    table: &ParamTable,
    options: &NamingOptions,
) -> BuildResult<Vec<String>> {
    if let Some(unknown) = options.columns.iter().find(|c| !table.has_column(c)) {
        return Err(BuildError::UnknownColumn {
            template: template.to_string(),
            column: unknown.clone(),
            available: table.columns().to_vec(),
        });
    }

    if options.columns.is_empty() {
        return Ok(hashed_names(
            template,
            table,
            &options.delimiter,
            HASH_SUFFIX_LEN,
        ));
    }

    let mut seen: FxHashMap<String, usize> = FxHashMap::default();
    let mut names = Vec::with_capacity(table.len());
    for (i, row) in table.rows().iter().enumerate() {
        let name = generate(template, i, row, options)?;
        if let Some(&first) = seen.get(&name) {
            return Err(BuildError::NamingCollision {
                template: template.to_string(),
                name,
                rows: (first, i),
            });
        }
        seen.insert(name.clone(), i);
        names.push(name);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expr::Value;

    fn table(rows: &[&[(&str, Value)]]) -> ParamTable {
        ParamTable::from_rows(
            rows.iter()
                .map(|r| r.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
                .collect(),
        )
        .unwrap()
    }

    fn methods() -> ParamTable {
        table(&[
            &[("method", Value::sym("M1")), ("data_source", Value::lit("NIH"))],
            &[("method", Value::sym("M2")), ("data_source", Value::lit("NIAID"))],
        ])
    }

    #[test]
    fn test_br004_canonicalize() {
        assert_eq!(canonicalize("NIH"), "NIH");
        assert_eq!(canonicalize("data set 1"), "data_set_1");
        assert_eq!(canonicalize("a.b-c"), "a_b_c");
        assert_eq!(canonicalize("  (x)  "), "x");
        assert_eq!(canonicalize("!!!"), "x");
        assert_eq!(canonicalize("keep__this"), "keep__this");
    }

    #[test]
    fn test_br004_named_by_column() {
        let names = assign_names(
            "analysis",
            &methods(),
            &NamingOptions::by_columns(["data_source"]),
        )
        .unwrap();
        assert_eq!(names, vec!["analysis_NIH", "analysis_NIAID"]);
    }

    #[test]
    fn test_br004_columns_follow_table_order() {
        let opts = NamingOptions::by_columns(["data_source", "method"]);
        let names = assign_names("fit", &methods(), &opts).unwrap();
        assert_eq!(names, vec!["fit_M1_NIH", "fit_M2_NIAID"]);
    }

    #[test]
    fn test_br004_custom_delimiter() {
        let opts = NamingOptions {
            columns: vec!["method".to_string()],
            delimiter: ".".to_string(),
        };
        let names = assign_names("fit", &methods(), &opts).unwrap();
        assert_eq!(names, vec!["fit.M1", "fit.M2"]);
    }

    #[test]
    fn test_br004_hash_suffix_unique_for_identical_rows() {
        let t = table(&[&[("x", Value::lit(1i64))], &[("x", Value::lit(1i64))]]);
        let names = assign_names("sim", &t, &NamingOptions::default()).unwrap();
        assert_ne!(names[0], names[1]);
        for name in &names {
            assert!(name.starts_with("sim_"));
            assert_eq!(name.len(), "sim_".len() + HASH_SUFFIX_LEN);
        }
        // deterministic
        assert_eq!(
            names,
            assign_names("sim", &t, &NamingOptions::default()).unwrap()
        );
    }

    #[test]
    fn test_br004_hash_suffix_lengthens_instead_of_colliding() {
        let rows: Vec<Vec<(&str, Value)>> =
            (0..40).map(|_| vec![("seed", Value::lit(7i64))]).collect();
        let refs: Vec<&[(&str, Value)]> = rows.iter().map(Vec::as_slice).collect();
        let t = table(&refs);

        // one hex digit has 16 values, so 40 rows must collide at that length
        let names = hashed_names("sim", &t, "_", 1);
        let distinct: FxHashSet<&String> = names.iter().collect();
        assert_eq!(distinct.len(), 40);
        let len = names[0].len();
        assert!(len > "sim_".len() + 1);
        assert!(names.iter().all(|n| n.len() == len && n.starts_with("sim_")));
        assert_eq!(names, hashed_names("sim", &t, "_", 1));
    }

    #[test]
    fn test_br004_hash_naming_never_fails() {
        let rows: Vec<Vec<(&str, Value)>> =
            (0..2000).map(|_| vec![("x", Value::lit(1i64))]).collect();
        let refs: Vec<&[(&str, Value)]> = rows.iter().map(Vec::as_slice).collect();
        let t = table(&refs);
        let names = assign_names("sim", &t, &NamingOptions::default()).unwrap();
        let distinct: FxHashSet<&String> = names.iter().collect();
        assert_eq!(distinct.len(), names.len());
    }

    #[test]
    fn test_br004_collision_reports_rows() {
        let t = table(&[
            &[("src", Value::lit("a b"))],
            &[("src", Value::lit("c"))],
            &[("src", Value::lit("a-b"))],
        ]);
        let err = assign_names("x", &t, &NamingOptions::by_columns(["src"])).unwrap_err();
        assert_eq!(
            err,
            BuildError::NamingCollision {
                template: "x".to_string(),
                name: "x_a_b".to_string(),
                rows: (0, 2),
            }
        );
    }

    #[test]
    fn test_br004_unknown_name_column() {
        let err =
            assign_names("x", &methods(), &NamingOptions::by_columns(["dataset"])).unwrap_err();
        assert!(matches!(err, BuildError::UnknownColumn { ref column, .. } if column == "dataset"));
    }

    #[test]
    fn test_br004_label() {
        let t = table(&[&[("port", Value::lit(2049i64)), ("src", Value::lit("NI H"))]]);
        assert_eq!(label(&t.rows()[0], "port").as_deref(), Some("x2049"));
        assert_eq!(label(&t.rows()[0], "src").as_deref(), Some("NI_H"));
        assert_eq!(label(&t.rows()[0], "nope"), None);
    }
}
