//! BR-011: Row-wise substitution without guardrails.
//!
//! The primitive the engines are built from: one expression per row, each
//! column's i-th value bound to `$column`. No naming, no uniqueness checks,
//! no dependency inference; unbound placeholders stay as they are. Callers
//! that turn the output into graph nodes must go through
//! `BuildContext::add_target`, which does check names.

use super::error::BuildResult;
use super::expr::{Bindings, Expr, Value};
use super::table::{check_lengths, ParamTable};
use indexmap::IndexMap;

/// Substitute the i-th value of every column into `template`, for every i.
pub fn substitute_rows(
    template: &Expr,
    columns: &IndexMap<String, Vec<Value>>,
) -> BuildResult<Vec<Expr>> {
    let rows = check_lengths(columns)?;
    let mut out = Vec::with_capacity(rows);
    for i in 0..rows {
        let mut bindings = Bindings::new();
        for (name, values) in columns {
            bindings.bind(name.clone(), values[i].to_expr());
        }
        out.push(template.substitute(&bindings));
    }
    Ok(out)
}

/// `substitute_rows` over the rows of a table.
pub fn substitute_table(template: &Expr, table: &ParamTable) -> Vec<Expr> {
    table
        .rows()
        .iter()
        .map(|row| {
            let mut bindings = Bindings::new();
            for (name, value) in row {
                bindings.bind(name.clone(), value.to_expr());
            }
            template.substitute(&bindings)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::BuildContext;
    use crate::core::error::BuildError;
    use crate::core::syntax::parse_expr;
    use crate::core::types::TargetTemplate;

    fn columns(cols: &[(&str, Vec<Value>)]) -> IndexMap<String, Vec<Value>> {
        cols.iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_br011_substitute_rows() {
        let template = parse_expr("download($url, dest = $file)").unwrap();
        let cols = columns(&[
            ("url", vec![Value::lit("https://a"), Value::lit("https://b")]),
            ("file", vec![Value::lit("a.csv"), Value::lit("b.csv")]),
        ]);
        let out = substitute_rows(&template, &cols).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].to_string(), "download(\"https://a\", dest = \"a.csv\")");
        assert_eq!(out[1].to_string(), "download(\"https://b\", dest = \"b.csv\")");
    }

    #[test]
    fn test_br011_length_mismatch() {
        let template = parse_expr("f($a, $b)").unwrap();
        let cols = columns(&[
            ("a", vec![Value::lit(1i64), Value::lit(2i64), Value::lit(3i64)]),
            ("b", vec![Value::lit(1i64)]),
        ]);
        assert_eq!(
            substitute_rows(&template, &cols).unwrap_err(),
            BuildError::LengthMismatch {
                column: "b".to_string(),
                expected: 3,
                actual: 1,
            }
        );
    }

    #[test]
    fn test_br011_unbound_placeholders_survive() {
        let template = parse_expr("f($a, $later)").unwrap();
        let cols = columns(&[("a", vec![Value::sym("x")])]);
        let out = substitute_rows(&template, &cols).unwrap();
        assert_eq!(out[0].to_string(), "f(x, $later)");
    }

    #[test]
    fn test_br011_no_columns_no_rows() {
        let template = parse_expr("f()").unwrap();
        assert!(substitute_rows(&template, &IndexMap::new()).unwrap().is_empty());
    }

    #[test]
    fn test_br011_produce_identifiers() {
        // the output can itself be a target name
        let cols = columns(&[("name", vec![Value::sym("fit_a"), Value::sym("fit_b")])]);
        let names = substitute_rows(&Expr::placeholder("name"), &cols).unwrap();
        assert_eq!(names, vec![Expr::sym("fit_a"), Expr::sym("fit_b")]);

        let mut ctx = BuildContext::new();
        for name in &names {
            if let Expr::Symbol(s) = name {
                ctx.add_target(&TargetTemplate::new(s.clone(), Expr::call("fit", vec![])))
                    .unwrap();
            }
        }
        assert!(ctx.contains("fit_a"));
        // re-adding the same output is caught at the context, not here
        let dup = ctx.add_target(&TargetTemplate::new("fit_a", Expr::call("fit", vec![])));
        assert!(matches!(dup, Err(BuildError::NameConflict { .. })));
    }

    #[test]
    fn test_br011_substitute_table() {
        let table = ParamTable::from_columns(columns(&[(
            "n",
            vec![Value::lit(1i64), Value::lit(2i64)],
        )]))
        .unwrap();
        let out = substitute_table(&parse_expr("sim(n = $n)").unwrap(), &table);
        assert_eq!(out[1].to_string(), "sim(n = 2)");
    }
}
