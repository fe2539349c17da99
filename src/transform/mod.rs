//! Sandboxed Transform Runner
//!
//! Executes AI-supplied transform scripts against the dataset. The script
//! is interpreted statement by statement; scalar expressions are delegated
//! to `evalexpr`, which has no I/O surface. The runner validates the
//! produced shape (a row array) before any downstream consumer sees it and
//! never lets an evaluation failure escape unwrapped.

pub mod script;

use crate::dataset::{normalize_keys, sanitize_cell, Row, Value};
use crate::error::{EngineError, Result};
use evalexpr::{eval_with_context, ContextWithMutableVariables, HashMapContext, Value as ExprValue};
use script::Stmt;

pub struct TransformRunner {
    max_statements: usize,
}

impl Default for TransformRunner {
    fn default() -> Self {
        Self { max_statements: 100 }
    }
}

impl TransformRunner {
    /// Run a transform script against the rows, returning the replacement
    /// row array. Every failure mode surfaces as `EngineError::Transform`
    /// carrying the offending script and a human-readable cause.
    pub fn run(&self, rows: &[Row], code: &str) -> Result<Vec<Row>> {
        let statements = script::parse(code)?;
        if statements.len() > self.max_statements {
            return Err(fail(
                format!(
                    "script has {} statements; the limit is {}",
                    statements.len(),
                    self.max_statements
                ),
                code,
            ));
        }

        let mut rows: Vec<Row> = rows.to_vec();

        for stmt in &statements {
            match stmt {
                Stmt::Filter(expr) => {
                    let mut kept = Vec::with_capacity(rows.len());
                    for row in rows {
                        match eval_in_row(expr, &row, code)? {
                            ExprValue::Boolean(true) => kept.push(row),
                            ExprValue::Boolean(false) => {}
                            other => {
                                return Err(fail(
                                    format!(
                                        "filter `{}` evaluated to {} instead of a boolean",
                                        expr,
                                        type_name(&other)
                                    ),
                                    code,
                                ))
                            }
                        }
                    }
                    rows = kept;
                }
                Stmt::Derive { column, expr } => {
                    for row in rows.iter_mut() {
                        let value = to_value(eval_in_row(expr, row, code)?, expr, code)?;
                        row.insert(column.clone(), value);
                    }
                }
                Stmt::Fill { column, expr } => {
                    for row in rows.iter_mut() {
                        let missing = row.get(column).map(Value::is_missing).unwrap_or(true);
                        if missing {
                            let value = to_value(eval_in_row(expr, row, code)?, expr, code)?;
                            row.insert(column.clone(), value);
                        }
                    }
                }
                Stmt::Rename { from, to } => {
                    for row in rows.iter_mut() {
                        if let Some(value) = row.remove(from) {
                            row.insert(to.clone(), value);
                        }
                    }
                }
                Stmt::Drop(columns) => {
                    for row in rows.iter_mut() {
                        for column in columns {
                            row.remove(column);
                        }
                    }
                }
                Stmt::Keep(columns) => {
                    for row in rows.iter_mut() {
                        row.retain(|key, _| columns.iter().any(|c| c == key));
                    }
                }
                Stmt::ParseNumber(columns) => {
                    for row in rows.iter_mut() {
                        for column in columns {
                            if let Some(value) = row.get(column) {
                                let replacement = match value.numeric() {
                                    Some(n) => Value::Number(n),
                                    None => Value::Null,
                                };
                                row.insert(column.clone(), replacement);
                            }
                        }
                    }
                }
                Stmt::ReturnRows => return Ok(normalize_keys(rows)),
                Stmt::ReturnExpr(expr) => {
                    let context = HashMapContext::new();
                    let value = eval_with_context(expr, &context).map_err(|e| {
                        fail(format!("expression `{}` failed: {}", expr, e), code)
                    })?;
                    return Err(fail(
                        format!(
                            "transform returned {}, expected an array of rows (use `return rows`)",
                            type_name(&value)
                        ),
                        code,
                    ));
                }
            }
        }

        Err(fail(
            "script finished without `return rows`; no row array was produced".to_string(),
            code,
        ))
    }
}

fn fail(cause: String, code: &str) -> EngineError {
    EngineError::Transform {
        cause,
        code: code.to_string(),
    }
}

/// Expose every row column to the expression as a sanitized identifier.
fn eval_in_row(expr: &str, row: &Row, code: &str) -> Result<ExprValue> {
    let mut context = HashMapContext::new();
    for (name, value) in row {
        let expr_value = match value {
            Value::Null => ExprValue::Empty,
            Value::Bool(b) => ExprValue::Boolean(*b),
            Value::Number(n) => ExprValue::Float(*n),
            Value::Text(s) => ExprValue::String(s.clone()),
        };
        context
            .set_value(identifier(name), expr_value)
            .map_err(|e| fail(format!("binding column `{}` failed: {}", name, e), code))?;
    }
    eval_with_context(expr, &context)
        .map_err(|e| fail(format!("expression `{}` failed: {}", expr, e), code))
}

/// Column name → expression identifier: non-alphanumeric characters map
/// to underscores, a leading digit gets one prepended.
pub fn identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if out.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(true) {
        out.insert(0, '_');
    }
    out
}

fn to_value(value: ExprValue, expr: &str, code: &str) -> Result<Value> {
    match value {
        ExprValue::Float(f) => Ok(Value::Number(f)),
        ExprValue::Int(i) => Ok(Value::Number(i as f64)),
        ExprValue::Boolean(b) => Ok(Value::Bool(b)),
        ExprValue::String(s) => Ok(Value::Text(sanitize_cell(&s))),
        ExprValue::Empty => Ok(Value::Null),
        ExprValue::Tuple(_) => Err(fail(
            format!("expression `{}` produced a tuple; cells hold scalars", expr),
            code,
        )),
    }
}

fn type_name(value: &ExprValue) -> &'static str {
    match value {
        ExprValue::Float(_) | ExprValue::Int(_) => "a number",
        ExprValue::Boolean(_) => "a boolean",
        ExprValue::String(_) => "a string",
        ExprValue::Tuple(_) => "a tuple",
        ExprValue::Empty => "nothing",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn fixture() -> Vec<Row> {
        vec![
            row(&[
                ("region", Value::Text("east".into())),
                ("amount", Value::Text("$1,200".into())),
            ]),
            row(&[
                ("region", Value::Text("west".into())),
                ("amount", Value::Text("$300".into())),
            ]),
        ]
    }

    #[test]
    fn cleans_and_filters_rows() {
        let code = "parse_number amount\nfilter amount > 500\nderive doubled = amount * 2\nreturn rows";
        let out = TransformRunner::default().run(&fixture(), code).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("amount"), Some(&Value::Number(1200.0)));
        assert_eq!(out[0].get("doubled"), Some(&Value::Number(2400.0)));
    }

    #[test]
    fn scalar_return_is_a_shape_violation() {
        let err = TransformRunner::default()
            .run(&fixture(), "return 42")
            .unwrap_err();
        match err {
            EngineError::Transform { cause, code } => {
                assert!(cause.contains("expected an array of rows"), "{}", cause);
                assert_eq!(code, "return 42");
            }
            other => panic!("expected Transform error, got {:?}", other),
        }
    }

    #[test]
    fn missing_return_is_a_shape_violation() {
        let err = TransformRunner::default()
            .run(&fixture(), "parse_number amount")
            .unwrap_err();
        assert!(err.to_string().contains("without `return rows`"));
    }

    #[test]
    fn bad_expression_surfaces_cause_and_code() {
        let code = "derive x = nosuchcolumn + 1\nreturn rows";
        let err = TransformRunner::default().run(&fixture(), code).unwrap_err();
        match err {
            EngineError::Transform { cause, code: c } => {
                assert!(cause.contains("nosuchcolumn"), "{}", cause);
                assert_eq!(c, code);
            }
            other => panic!("expected Transform error, got {:?}", other),
        }
    }

    #[test]
    fn rename_keep_and_fill() {
        let code = "rename amount -> amt\nfill note = \"none\"\nkeep region, amt, note\nreturn rows";
        let out = TransformRunner::default().run(&fixture(), code).unwrap();
        assert!(out[0].contains_key("amt"));
        assert!(!out[0].contains_key("amount"));
        assert_eq!(out[0].get("note"), Some(&Value::Text("none".into())));
    }

    #[test]
    fn output_keys_are_normalized() {
        let rows = vec![
            row(&[("a", Value::Number(1.0))]),
            row(&[("b", Value::Number(2.0))]),
        ];
        let out = TransformRunner::default().run(&rows, "return rows").unwrap();
        assert_eq!(out[0].get("b"), Some(&Value::Null));
    }

    #[test]
    fn derived_strings_are_sanitized() {
        let code = "derive formula = \"=HYPERLINK(1)\"\nreturn rows";
        let out = TransformRunner::default().run(&fixture(), code).unwrap();
        assert_eq!(
            out[0].get("formula"),
            Some(&Value::Text("'=HYPERLINK(1)".into()))
        );
    }

    #[test]
    fn sanitizes_awkward_column_names() {
        assert_eq!(identifier("Sales Amount ($)"), "Sales_Amount____");
        assert_eq!(identifier("2023 total"), "_2023_total");
    }
}
