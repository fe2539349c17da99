//! Transform script parser.
//!
//! The AI supplies transforms as a small line-oriented script instead of
//! raw code. Statements carry scalar expressions that are evaluated later
//! by `evalexpr`; the parser only recognizes statement shapes.

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Keep rows where the expression is true.
    Filter(String),
    /// Compute a column per row.
    Derive { column: String, expr: String },
    /// Compute a column only where it is currently missing.
    Fill { column: String, expr: String },
    Rename { from: String, to: String },
    Drop(Vec<String>),
    Keep(Vec<String>),
    /// Re-parse columns as numbers, stripping currency formatting.
    ParseNumber(Vec<String>),
    /// Produce the transformed row array.
    ReturnRows,
    /// Produce a scalar; always a shape violation, kept so the runner can
    /// report it precisely.
    ReturnExpr(String),
}

pub fn parse(code: &str) -> Result<Vec<Stmt>> {
    let mut statements = Vec::new();

    for (index, raw_line) in code.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let stmt = if let Some(rest) = line.strip_prefix("filter ") {
            Stmt::Filter(rest.trim().to_string())
        } else if let Some(rest) = line.strip_prefix("derive ") {
            let (column, expr) = split_assignment(rest, index, code)?;
            Stmt::Derive { column, expr }
        } else if let Some(rest) = line.strip_prefix("fill ") {
            let (column, expr) = split_assignment(rest, index, code)?;
            Stmt::Fill { column, expr }
        } else if let Some(rest) = line.strip_prefix("rename ") {
            let (from, to) = rest.split_once("->").ok_or_else(|| parse_error(
                index,
                "rename expects `old -> new`",
                code,
            ))?;
            Stmt::Rename {
                from: from.trim().to_string(),
                to: to.trim().to_string(),
            }
        } else if let Some(rest) = line.strip_prefix("drop ") {
            Stmt::Drop(column_list(rest))
        } else if let Some(rest) = line.strip_prefix("keep ") {
            Stmt::Keep(column_list(rest))
        } else if let Some(rest) = line.strip_prefix("parse_number ") {
            Stmt::ParseNumber(column_list(rest))
        } else if line == "return rows" {
            Stmt::ReturnRows
        } else if let Some(rest) = line.strip_prefix("return ") {
            Stmt::ReturnExpr(rest.trim().to_string())
        } else if line == "return" {
            return Err(parse_error(index, "bare `return` produces nothing", code));
        } else {
            return Err(parse_error(
                index,
                &format!("unknown statement `{}`", line),
                code,
            ));
        };
        statements.push(stmt);
    }

    Ok(statements)
}

fn split_assignment(rest: &str, index: usize, code: &str) -> Result<(String, String)> {
    let (column, expr) = rest
        .split_once('=')
        .ok_or_else(|| parse_error(index, "expected `<column> = <expression>`", code))?;
    let column = column.trim();
    let expr = expr.trim();
    if column.is_empty() || expr.is_empty() {
        return Err(parse_error(index, "expected `<column> = <expression>`", code));
    }
    Ok((column.to_string(), expr.to_string()))
}

fn column_list(rest: &str) -> Vec<String> {
    rest.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_error(line_index: usize, message: &str, code: &str) -> EngineError {
    EngineError::Transform {
        cause: format!("line {}: {}", line_index + 1, message),
        code: code.to_string(),
    }
}
