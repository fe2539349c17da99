//! Prompt builders for the AI boundary. The engine only guarantees the
//! response schemas; wording here is free to evolve.

use crate::dataset::Row;
use crate::profiler::ColumnProfile;

fn render_columns(profiles: &[ColumnProfile]) -> String {
    serde_json::to_string_pretty(profiles).unwrap_or_else(|_| "[]".to_string())
}

fn render_rows(rows: &[Row]) -> String {
    rows.iter()
        .map(|r| serde_json::to_string(r).unwrap_or_else(|_| "{}".to_string()))
        .collect::<Vec<_>>()
        .join("\n")
}

const TRANSFORM_GRAMMAR: &str = r#"Transform scripts are line-oriented. Statements:
  filter <boolean expression>      keep matching rows
  derive <column> = <expression>   compute a column per row
  fill <column> = <expression>     compute only where the column is missing
  rename <old> -> <new>
  drop <col1>, <col2>
  keep <col1>, <col2>
  parse_number <col1>, <col2>      strip currency formatting, parse as number
  return rows                      mandatory final statement
Column names appear in expressions with non-alphanumeric characters replaced
by underscores (e.g. "Sales Amount" -> Sales_Amount)."#;

pub fn initial_plans_prompt(profiles: &[ColumnProfile], sample: &[Row]) -> String {
    format!(
        r#"You are a data analyst. Given the column profiles and sample rows below,
propose up to 4 analysis plans. Return ONLY a JSON array; each element:
{{
  "chart_kind": "bar" | "line" | "pie" | "scatter" | "table",
  "title": "...",
  "description": "...",
  "aggregation": "sum" | "count" | "avg",
  "group_by_column": "...",
  "value_column": "...",
  "x_column": "...", "y_column": "..."
}}
Scatter plans carry x_column and y_column and omit aggregation/group_by_column;
all other kinds carry group_by_column and aggregation.

COLUMNS:
{}

SAMPLE ROWS:
{}

Only return the JSON array, no other text."#,
        render_columns(profiles),
        render_rows(sample)
    )
}

pub fn preparation_prompt(
    profiles: &[ColumnProfile],
    sample: &[Row],
    prior_error: Option<&str>,
) -> String {
    let correction = match prior_error {
        Some(error) => format!(
            "\nYOUR PREVIOUS TRANSFORM FAILED. Fix the script. The exact error was:\n{}\n",
            error
        ),
        None => String::new(),
    };
    format!(
        r#"You prepare tabular data for analysis. Inspect the columns and sample
rows; if the data needs cleaning or reshaping, write a transform script,
otherwise set transform_code to null.
{}
{}
Return ONLY JSON:
{{
  "explanation": "what you did and why, in plain language",
  "transform_code": "filter ...\nreturn rows" or null,
  "output_columns": [{{"name": "...", "kind": "numerical" | "categorical", "missing_pct": 0.0}}]
}}

COLUMNS:
{}

SAMPLE ROWS:
{}

Only return the JSON, no other text."#,
        TRANSFORM_GRAMMAR,
        correction,
        render_columns(profiles),
        render_rows(sample)
    )
}

pub fn chat_prompt(state_summary: &str, message: &str) -> String {
    format!(
        r#"You are a data analysis copilot driving a deck of analysis cards.
Respond with an ordered action list. Return ONLY JSON:
{{"actions": [{{"thought": "...", "kind": "...", ...}}]}}

Every action MUST carry a non-empty "thought". Kinds:
- {{"kind": "text", "content": "...", "card_id": optional}}
- {{"kind": "plan_creation", "plan": {{...same schema as analysis plans...}}}}
- {{"kind": "dom_action", "tool": "highlight_card" | "change_chart_kind" |
   "toggle_data_visibility" | "filter_card", "args": {{"card_id": "...", ...}}}}
- {{"kind": "code_execution", "code": "<transform script>"}}

{}

CURRENT STATE:
{}

USER MESSAGE:
{}

Only return the JSON, no other text."#,
        TRANSFORM_GRAMMAR, state_summary, message
    )
}

pub fn summary_prompt(title: &str, rows: &[Row]) -> String {
    format!(
        r#"Summarize the key takeaway of the analysis "{}" in 1-2 plain sentences
for a business reader. Data:
{}

Return only the summary text."#,
        title,
        render_rows(rows)
    )
}
