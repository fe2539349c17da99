//! Dataset Model
//!
//! Rows are plain column → scalar maps. The dataset is owned by the
//! session and replaced wholesale on every transformation; nothing in the
//! engine mutates rows in place.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

lazy_static! {
    static ref CURRENCY: Regex = Regex::new(r"[$€£¥,\s]").unwrap();
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// A value is missing when it is null or a blank string.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric view of the value. Strings are parsed after stripping
    /// currency symbols and thousands separators.
    pub fn numeric(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => parse_numeric_text(s),
            _ => None,
        }
    }

    /// String form used for group keys and distinct counting.
    pub fn key_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Text(s) => s.clone(),
        }
    }
}

/// Parse a numeric string, tolerating `$1,234.56`-style formatting.
pub fn parse_numeric_text(s: &str) -> Option<f64> {
    let stripped = CURRENCY.replace_all(s.trim(), "");
    if stripped.is_empty() {
        return None;
    }
    stripped.parse::<f64>().ok()
}

/// One dataset row: column name → scalar value.
pub type Row = BTreeMap<String, Value>;

/// Neutralize spreadsheet formula injection in a raw string cell.
/// Leading `=` gets a quote prefix, the convention spreadsheet importers
/// use to force text interpretation.
pub fn sanitize_cell(raw: &str) -> String {
    if raw.trim_start().starts_with('=') {
        format!("'{}", raw)
    } else {
        raw.to_string()
    }
}

/// Apply `sanitize_cell` to every text value of a row.
pub fn sanitize_row(row: &mut Row) {
    for value in row.values_mut() {
        if let Value::Text(s) = value {
            let clean = sanitize_cell(s);
            if &clean != s {
                *value = Value::Text(clean);
            }
        }
    }
}

/// Union of column names across rows, sorted for determinism.
pub fn column_names(rows: &[Row]) -> Vec<String> {
    let mut names: BTreeSet<String> = BTreeSet::new();
    for row in rows {
        for key in row.keys() {
            names.insert(key.clone());
        }
    }
    names.into_iter().collect()
}

/// Give every row the same key set, filling gaps with nulls. Upholds the
/// single-key-set invariant after transformations.
pub fn normalize_keys(rows: Vec<Row>) -> Vec<Row> {
    let names = column_names(&rows);
    rows.into_iter()
        .map(|mut row| {
            for name in &names {
                row.entry(name.clone()).or_insert(Value::Null);
            }
            row
        })
        .collect()
}

/// Leading slice of the dataset used as the AI-visible sample.
pub fn sample(rows: &[Row], n: usize) -> &[Row] {
    &rows[..rows.len().min(n)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_currency_and_separators() {
        assert_eq!(parse_numeric_text("$1,234.50"), Some(1234.5));
        assert_eq!(parse_numeric_text("€2 000"), Some(2000.0));
        assert_eq!(parse_numeric_text("-42"), Some(-42.0));
        assert_eq!(parse_numeric_text("n/a"), None);
        assert_eq!(parse_numeric_text(""), None);
    }

    #[test]
    fn neutralizes_formula_cells() {
        assert_eq!(sanitize_cell("=SUM(A1:A9)"), "'=SUM(A1:A9)");
        assert_eq!(sanitize_cell("plain"), "plain");
    }

    #[test]
    fn normalizes_key_sets() {
        let mut a = Row::new();
        a.insert("x".into(), Value::Number(1.0));
        let mut b = Row::new();
        b.insert("y".into(), Value::Number(2.0));
        let rows = normalize_keys(vec![a, b]);
        assert_eq!(rows[0].get("y"), Some(&Value::Null));
        assert_eq!(rows[1].get("x"), Some(&Value::Null));
    }

    #[test]
    fn key_string_trims_integral_floats() {
        assert_eq!(Value::Number(2023.0).key_string(), "2023");
        assert_eq!(Value::Number(1.5).key_string(), "1.5");
        assert_eq!(Value::Null.key_string(), "null");
    }
}
