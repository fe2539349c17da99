//! Aggregation Engine
//!
//! Executes a declarative `AnalysisPlan` against the dataset: scatter
//! projection or grouped sum/count/avg, followed by the sort policy
//! (chronological when the group keys look like dates/quarters/months,
//! otherwise value-descending). Also hosts the Top-N "Others" collapsing
//! utility used by card rendering.

use crate::config::EngineConfig;
use crate::dataset::{Row, Value};
use crate::error::{EngineError, Result};
use chrono::NaiveDate;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Scatter,
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Count,
    Avg,
}

/// Declarative aggregation/visualization specification.
///
/// Invariant: scatter plans carry `x_column` + `y_column` and omit
/// `aggregation`/`group_by_column`; every other kind carries
/// `group_by_column` + `aggregation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPlan {
    pub chart_kind: ChartKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub aggregation: Option<Aggregation>,
    #[serde(default)]
    pub group_by_column: Option<String>,
    #[serde(default)]
    pub value_column: Option<String>,
    #[serde(default)]
    pub x_column: Option<String>,
    #[serde(default)]
    pub y_column: Option<String>,
    #[serde(default)]
    pub default_top_n: Option<usize>,
    #[serde(default)]
    pub default_hide_others: Option<bool>,
}

/// Label used for the collapsed low-rank bucket.
pub const OTHERS_LABEL: &str = "Others";

/// Execute a plan against the dataset.
pub fn execute(rows: &[Row], plan: &AnalysisPlan, config: &EngineConfig) -> Result<Vec<Row>> {
    match plan.chart_kind {
        ChartKind::Scatter => execute_scatter(rows, plan),
        _ => execute_grouped(rows, plan, config),
    }
}

fn execute_scatter(rows: &[Row], plan: &AnalysisPlan) -> Result<Vec<Row>> {
    let x = plan.x_column.as_deref().ok_or_else(|| {
        EngineError::Plan(format!("scatter plan '{}' is missing x_column", plan.title))
    })?;
    let y = plan.y_column.as_deref().ok_or_else(|| {
        EngineError::Plan(format!("scatter plan '{}' is missing y_column", plan.title))
    })?;

    let projected = rows
        .iter()
        .filter_map(|row| {
            let xv = row.get(x).and_then(Value::numeric)?;
            let yv = row.get(y).and_then(Value::numeric)?;
            let mut out = Row::new();
            out.insert(x.to_string(), Value::Number(xv));
            out.insert(y.to_string(), Value::Number(yv));
            Some(out)
        })
        .collect();
    Ok(projected)
}

fn execute_grouped(rows: &[Row], plan: &AnalysisPlan, config: &EngineConfig) -> Result<Vec<Row>> {
    let group_by = plan.group_by_column.as_deref().ok_or_else(|| {
        EngineError::Plan(format!(
            "plan '{}' needs group_by_column for {:?} charts",
            plan.title, plan.chart_kind
        ))
    })?;
    let aggregation = plan.aggregation.ok_or_else(|| {
        EngineError::Plan(format!("plan '{}' is missing aggregation", plan.title))
    })?;
    if plan.value_column.is_none() && aggregation != Aggregation::Count {
        return Err(EngineError::Plan(format!(
            "plan '{}' needs value_column for {:?}",
            plan.title, aggregation
        )));
    }

    // Bucket in first-seen order; the sort policy reorders afterwards.
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<f64>> = HashMap::new();

    for row in rows {
        let key = match row.get(group_by) {
            Some(v) => v.key_string(),
            None => continue,
        };
        if key == "null" || key == "undefined" {
            continue;
        }
        let bucket = buckets.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            Vec::new()
        });
        match &plan.value_column {
            Some(value_column) => {
                if let Some(n) = row.get(value_column).and_then(Value::numeric) {
                    bucket.push(n);
                }
            }
            // Count with no value column: every row weighs 1.
            None => bucket.push(1.0),
        }
    }

    let value_key = plan
        .value_column
        .clone()
        .unwrap_or_else(|| "count".to_string());

    let mut result: Vec<Row> = order
        .into_iter()
        .map(|key| {
            let values = &buckets[&key];
            let aggregated = match aggregation {
                Aggregation::Sum => values.iter().sum(),
                Aggregation::Count => values.len() as f64,
                Aggregation::Avg => {
                    if values.is_empty() {
                        0.0
                    } else {
                        values.iter().sum::<f64>() / values.len() as f64
                    }
                }
            };
            let mut row = Row::new();
            row.insert(group_by.to_string(), Value::Text(key));
            row.insert(value_key.clone(), Value::Number(aggregated));
            row
        })
        .collect();

    sort_rows(&mut result, group_by, &value_key, config);
    Ok(result)
}

/// Sort policy: chronological when enough leading keys carry a derivable
/// time order, otherwise aggregated value descending.
fn sort_rows(rows: &mut [Row], group_by: &str, value_key: &str, config: &EngineConfig) {
    let sample_len = rows.len().min(config.chronology_sample);
    if sample_len > 0 {
        let matched = rows[..sample_len]
            .iter()
            .filter(|row| {
                row.get(group_by)
                    .map(|v| chronological_order(&v.key_string(), config).is_some())
                    .unwrap_or(false)
            })
            .count();
        if matched as f64 >= config.chronology_threshold * sample_len as f64 {
            rows.sort_by(|a, b| {
                let oa = key_order(a, group_by, config);
                let ob = key_order(b, group_by, config);
                oa.partial_cmp(&ob).unwrap_or(std::cmp::Ordering::Equal)
            });
            return;
        }
    }

    rows.sort_by(|a, b| {
        let va = a.get(value_key).and_then(Value::numeric).unwrap_or(0.0);
        let vb = b.get(value_key).and_then(Value::numeric).unwrap_or(0.0);
        vb.partial_cmp(&va).unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn key_order(row: &Row, group_by: &str, config: &EngineConfig) -> f64 {
    row.get(group_by)
        .and_then(|v| chronological_order(&v.key_string(), config))
        .unwrap_or(f64::INFINITY)
}

lazy_static! {
    static ref QUARTER: Regex =
        Regex::new(r"(?i)^q([1-4])(?:\s*['./\-]?\s*(\d{2,4}))?$").unwrap();
}

const MONTHS: [(&str, u32); 12] = [
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

const WEEKDAYS: [(&str, u32); 7] = [
    ("mon", 1),
    ("tue", 2),
    ("wed", 3),
    ("thu", 4),
    ("fri", 5),
    ("sat", 6),
    ("sun", 7),
];

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%d %b %Y",
];

/// Derived time-order value for a group key, when one exists:
/// dates map to epoch milliseconds, quarters to year*10+quarter, month and
/// weekday names to their 1-based index.
pub fn chronological_order(key: &str, config: &EngineConfig) -> Option<f64> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(caps) = QUARTER.captures(trimmed) {
        let quarter: i32 = caps[1].parse().ok()?;
        let year = match caps.get(2) {
            Some(m) => {
                let raw: i32 = m.as_str().parse().ok()?;
                if m.as_str().len() == 2 {
                    if raw < config.two_digit_year_pivot {
                        2000 + raw
                    } else {
                        1900 + raw
                    }
                } else {
                    raw
                }
            }
            None => 0,
        };
        return Some((year * 10 + quarter) as f64);
    }

    let lower = trimmed.to_lowercase();
    for (name, index) in MONTHS {
        if lower == name || lower.starts_with(name) && is_month_name(&lower, name) {
            return Some(index as f64);
        }
    }
    for (name, index) in WEEKDAYS {
        if lower == name || lower.starts_with(name) && is_weekday_name(&lower, name) {
            return Some(index as f64);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            let ms = date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis();
            return Some(ms as f64);
        }
    }

    None
}

fn is_month_name(lower: &str, abbrev: &str) -> bool {
    matches!(
        (abbrev, lower),
        ("jan", "january")
            | ("feb", "february")
            | ("mar", "march")
            | ("apr", "april")
            | ("jun", "june")
            | ("jul", "july")
            | ("aug", "august")
            | ("sep", "sept")
            | ("sep", "september")
            | ("oct", "october")
            | ("nov", "november")
            | ("dec", "december")
    )
}

fn is_weekday_name(lower: &str, abbrev: &str) -> bool {
    matches!(
        (abbrev, lower),
        ("mon", "monday")
            | ("tue", "tues")
            | ("tue", "tuesday")
            | ("wed", "wednesday")
            | ("thu", "thur")
            | ("thu", "thurs")
            | ("thu", "thursday")
            | ("fri", "friday")
            | ("sat", "saturday")
            | ("sun", "sunday")
    )
}

/// Top-N with Others: keep the top `n - 1` rows by value and collapse the
/// remainder into a single synthetic row. No-op when the row count already
/// fits the bound.
pub fn collapse_top_n(rows: &[Row], n: usize, label_column: &str, value_column: &str) -> Vec<Row> {
    if n == 0 || rows.len() <= n {
        return rows.to_vec();
    }

    let sorted: Vec<&Row> = rows
        .iter()
        .sorted_by(|a, b| {
            let va = a.get(value_column).and_then(Value::numeric).unwrap_or(0.0);
            let vb = b.get(value_column).and_then(Value::numeric).unwrap_or(0.0);
            vb.partial_cmp(&va).unwrap_or(std::cmp::Ordering::Equal)
        })
        .collect();

    let mut result: Vec<Row> = sorted[..n - 1].iter().map(|r| (*r).clone()).collect();
    let rest: f64 = sorted[n - 1..]
        .iter()
        .map(|r| r.get(value_column).and_then(Value::numeric).unwrap_or(0.0))
        .sum();

    let mut others = Row::new();
    others.insert(label_column.to_string(), Value::Text(OTHERS_LABEL.into()));
    others.insert(value_column.to_string(), Value::Number(rest));
    result.push(others);
    result
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

    fn grouped_plan(aggregation: Aggregation, value_column: Option<&str>) -> AnalysisPlan {
        AnalysisPlan {
            chart_kind: ChartKind::Bar,
            title: "test".into(),
            description: String::new(),
            aggregation: Some(aggregation),
            group_by_column: Some("r".into()),
            value_column: value_column.map(|s| s.to_string()),
            x_column: None,
            y_column: None,
            default_top_n: None,
            default_hide_others: None,
        }
    }

    #[test]
    fn groups_and_sums_sorted_descending() {
        let rows = vec![
            row(&[("r", Value::Text("A".into())), ("v", Value::Number(10.0))]),
            row(&[("r", Value::Text("A".into())), ("v", Value::Number(5.0))]),
            row(&[("r", Value::Text("B".into())), ("v", Value::Number(3.0))]),
        ];
        let result = execute(
            &rows,
            &grouped_plan(Aggregation::Sum, Some("v")),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].get("r"), Some(&Value::Text("A".into())));
        assert_eq!(result[0].get("v"), Some(&Value::Number(15.0)));
        assert_eq!(result[1].get("r"), Some(&Value::Text("B".into())));
        assert_eq!(result[1].get("v"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn count_without_value_column_counts_rows() {
        let rows = vec![
            row(&[("r", Value::Text("A".into()))]),
            row(&[("r", Value::Text("A".into()))]),
            row(&[("r", Value::Text("B".into()))]),
        ];
        let result = execute(
            &rows,
            &grouped_plan(Aggregation::Count, None),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(result[0].get("count"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn avg_of_no_values_is_zero() {
        let rows = vec![row(&[
            ("r", Value::Text("A".into())),
            ("v", Value::Text("n/a".into())),
        ])];
        let result = execute(
            &rows,
            &grouped_plan(Aggregation::Avg, Some("v")),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(result[0].get("v"), Some(&Value::Number(0.0)));
    }

    #[test]
    fn null_group_keys_are_dropped() {
        let rows = vec![
            row(&[("r", Value::Null), ("v", Value::Number(1.0))]),
            row(&[
                ("r", Value::Text("undefined".into())),
                ("v", Value::Number(1.0)),
            ]),
            row(&[("r", Value::Text("A".into())), ("v", Value::Number(1.0))]),
        ];
        let result = execute(
            &rows,
            &grouped_plan(Aggregation::Sum, Some("v")),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get("r"), Some(&Value::Text("A".into())));
    }

    #[test]
    fn quarters_sort_chronologically() {
        let rows = vec![
            row(&[("r", Value::Text("Q1 2023".into())), ("v", Value::Number(1.0))]),
            row(&[("r", Value::Text("Q4'22".into())), ("v", Value::Number(99.0))]),
            row(&[("r", Value::Text("Q2/23".into())), ("v", Value::Number(50.0))]),
        ];
        let result = execute(
            &rows,
            &grouped_plan(Aggregation::Sum, Some("v")),
            &EngineConfig::default(),
        )
        .unwrap();
        let keys: Vec<String> = result
            .iter()
            .map(|r| r.get("r").unwrap().key_string())
            .collect();
        assert_eq!(keys, vec!["Q4'22", "Q1 2023", "Q2/23"]);
    }

    #[test]
    fn months_sort_by_calendar_order() {
        let rows = vec![
            row(&[("r", Value::Text("March".into())), ("v", Value::Number(1.0))]),
            row(&[("r", Value::Text("Jan".into())), ("v", Value::Number(2.0))]),
            row(&[("r", Value::Text("Feb".into())), ("v", Value::Number(3.0))]),
        ];
        let result = execute(
            &rows,
            &grouped_plan(Aggregation::Sum, Some("v")),
            &EngineConfig::default(),
        )
        .unwrap();
        let keys: Vec<String> = result
            .iter()
            .map(|r| r.get("r").unwrap().key_string())
            .collect();
        assert_eq!(keys, vec!["Jan", "Feb", "March"]);
    }

    #[test]
    fn unmatched_keys_sort_last_in_chronological_mode() {
        let rows = vec![
            row(&[("r", Value::Text("Totals".into())), ("v", Value::Number(9.0))]),
            row(&[("r", Value::Text("Q1 2024".into())), ("v", Value::Number(1.0))]),
            row(&[("r", Value::Text("Q2 2024".into())), ("v", Value::Number(2.0))]),
        ];
        let result = execute(
            &rows,
            &grouped_plan(Aggregation::Sum, Some("v")),
            &EngineConfig::default(),
        )
        .unwrap();
        let keys: Vec<String> = result
            .iter()
            .map(|r| r.get("r").unwrap().key_string())
            .collect();
        assert_eq!(keys, vec!["Q1 2024", "Q2 2024", "Totals"]);
    }

    #[test]
    fn two_digit_year_pivot() {
        let config = EngineConfig::default();
        let q99 = chronological_order("Q1'99", &config).unwrap();
        let q22 = chronological_order("Q1'22", &config).unwrap();
        assert_eq!(q99, 19991.0);
        assert_eq!(q22, 20221.0);
    }

    #[test]
    fn scatter_projects_and_drops_unparseable() {
        let rows = vec![
            row(&[("x", Value::Number(1.0)), ("y", Value::Number(2.0))]),
            row(&[("x", Value::Text("bad".into())), ("y", Value::Number(3.0))]),
            row(&[("x", Value::Text("$4".into())), ("y", Value::Text("5".into()))]),
        ];
        let plan = AnalysisPlan {
            chart_kind: ChartKind::Scatter,
            title: "xy".into(),
            description: String::new(),
            aggregation: None,
            group_by_column: None,
            value_column: None,
            x_column: Some("x".into()),
            y_column: Some("y".into()),
            default_top_n: None,
            default_hide_others: None,
        };
        let result = execute(&rows, &plan, &EngineConfig::default()).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[1].get("x"), Some(&Value::Number(4.0)));
    }

    #[test]
    fn malformed_plans_are_rejected() {
        let rows: Vec<Row> = Vec::new();
        let mut plan = grouped_plan(Aggregation::Sum, Some("v"));
        plan.group_by_column = None;
        assert!(matches!(
            execute(&rows, &plan, &EngineConfig::default()),
            Err(EngineError::Plan(_))
        ));

        let scatter = AnalysisPlan {
            chart_kind: ChartKind::Scatter,
            title: "xy".into(),
            description: String::new(),
            aggregation: None,
            group_by_column: None,
            value_column: None,
            x_column: Some("x".into()),
            y_column: None,
            default_top_n: None,
            default_hide_others: None,
        };
        assert!(matches!(
            execute(&rows, &scatter, &EngineConfig::default()),
            Err(EngineError::Plan(_))
        ));
    }

    #[test]
    fn top_n_collapses_remainder_into_others() {
        let rows: Vec<Row> = (0..20)
            .map(|i| {
                row(&[
                    ("label", Value::Text(format!("cat{}", i))),
                    ("v", Value::Number((20 - i) as f64)),
                ])
            })
            .collect();
        let collapsed = collapse_top_n(&rows, 5, "label", "v");
        assert_eq!(collapsed.len(), 5);
        assert_eq!(
            collapsed[4].get("label"),
            Some(&Value::Text(OTHERS_LABEL.into()))
        );
        // Values 20..17 survive; Others carries 16 + 15 + ... + 1 = 136.
        assert_eq!(collapsed[4].get("v"), Some(&Value::Number(136.0)));
    }

    #[test]
    fn top_n_is_noop_when_rows_fit() {
        let rows = vec![row(&[("label", Value::Text("a".into())), ("v", Value::Number(1.0))])];
        assert_eq!(collapse_top_n(&rows, 5, "label", "v"), rows);
    }
}
