//! Type Profiler
//!
//! Deterministic column classification from the raw rows. A column is
//! numerical only when every present value parses as a number after
//! currency/thousands-separator stripping; anything else is categorical.

use crate::dataset::{column_names, Row};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numerical,
    Categorical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    /// [min, max] over parsed values; numerical columns only.
    #[serde(default)]
    pub range: Option<(f64, f64)>,
    /// Distinct stringified values; categorical columns only.
    #[serde(default)]
    pub unique_count: Option<usize>,
    /// Share of missing cells over all rows, in percent.
    pub missing_pct: f64,
}

/// Profile every column of the dataset. Pure and deterministic; an empty
/// dataset profiles to an empty list.
pub fn profile(rows: &[Row]) -> Vec<ColumnProfile> {
    if rows.is_empty() {
        return Vec::new();
    }
    let total = rows.len() as f64;

    column_names(rows)
        .into_iter()
        .map(|name| {
            let mut parsed: Vec<f64> = Vec::new();
            let mut present: Vec<String> = Vec::new();
            let mut missing = 0usize;
            let mut all_numeric = true;

            for row in rows {
                match row.get(&name) {
                    Some(value) if !value.is_missing() => {
                        present.push(value.key_string());
                        match value.numeric() {
                            Some(n) => parsed.push(n),
                            None => all_numeric = false,
                        }
                    }
                    _ => missing += 1,
                }
            }

            let missing_pct = missing as f64 / total * 100.0;
            if all_numeric && !present.is_empty() {
                let min = parsed.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = parsed.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                ColumnProfile {
                    name,
                    kind: ColumnKind::Numerical,
                    range: Some((min, max)),
                    unique_count: None,
                    missing_pct,
                }
            } else {
                // All-empty columns land here too: categorical, 100% missing.
                let unique = present.iter().unique().count();
                ColumnProfile {
                    name,
                    kind: ColumnKind::Categorical,
                    range: None,
                    unique_count: Some(unique),
                    missing_pct,
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn currency_columns_are_numerical() {
        let rows = vec![
            row(&[("amount", Value::Text("$1,200".into()))]),
            row(&[("amount", Value::Text("€300".into()))]),
            row(&[("amount", Value::Null)]),
        ];
        let profiles = profile(&rows);
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].kind, ColumnKind::Numerical);
        assert_eq!(profiles[0].range, Some((300.0, 1200.0)));
        assert!((profiles[0].missing_pct - 33.333).abs() < 0.01);
    }

    #[test]
    fn one_bad_value_makes_column_categorical() {
        let rows = vec![
            row(&[("v", Value::Text("10".into()))]),
            row(&[("v", Value::Text("unknown".into()))]),
        ];
        let profiles = profile(&rows);
        assert_eq!(profiles[0].kind, ColumnKind::Categorical);
        assert_eq!(profiles[0].unique_count, Some(2));
    }

    #[test]
    fn all_empty_column_defaults_to_categorical() {
        let rows = vec![
            row(&[("note", Value::Null)]),
            row(&[("note", Value::Text("".into()))]),
        ];
        let profiles = profile(&rows);
        assert_eq!(profiles[0].kind, ColumnKind::Categorical);
        assert_eq!(profiles[0].missing_pct, 100.0);
        assert_eq!(profiles[0].unique_count, Some(0));
    }

    #[test]
    fn empty_input_profiles_to_empty_list() {
        assert!(profile(&[]).is_empty());
    }
}
