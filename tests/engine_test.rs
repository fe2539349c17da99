//! End-to-end test: CSV ingestion → preparation → initial analysis →
//! chat turns, driven by a scripted planner standing in for the AI
//! boundary.

use async_trait::async_trait;
use datadeck::actions::{self, ChatAction};
use datadeck::aggregation::{Aggregation, AnalysisPlan, ChartKind};
use datadeck::analysis;
use datadeck::config::EngineConfig;
use datadeck::dataset::{Row, Value};
use datadeck::error::Result;
use datadeck::ingest;
use datadeck::llm::Planner;
use datadeck::orchestrator::Orchestrator;
use datadeck::preparation::DataPreparationPlan;
use datadeck::profiler::ColumnProfile;
use datadeck::session::ChatRole;
use datadeck::store::{MemoryStore, SnapshotStore};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;

struct ScriptedPlanner {
    preparations: Mutex<VecDeque<DataPreparationPlan>>,
    initial: Vec<AnalysisPlan>,
    turns: Mutex<VecDeque<String>>,
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn initial_plans(
        &self,
        _profiles: &[ColumnProfile],
        _sample: &[Row],
    ) -> Result<Vec<AnalysisPlan>> {
        Ok(self.initial.clone())
    }

    async fn preparation_plan(
        &self,
        _profiles: &[ColumnProfile],
        _sample: &[Row],
        _prior_error: Option<&str>,
    ) -> Result<DataPreparationPlan> {
        Ok(self
            .preparations
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted preparation left"))
    }

    async fn chat_actions(&self, _state: &str, _message: &str) -> Result<Vec<ChatAction>> {
        let raw = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted turn left");
        actions::parse_chat_turn(&raw)
    }

    async fn summarize_card(&self, title: &str, _rows: &[Row]) -> Result<String> {
        Ok(format!("Insight about {}", title))
    }
}

const CSV: &str = "\
quarter,region,revenue
Q1 2023,east,$1200
Q1 2023,west,$800
Q4'22,east,$500
Q2/23,west,$300
Q2/23,east,=HACK()
";

fn revenue_plan() -> AnalysisPlan {
    AnalysisPlan {
        chart_kind: ChartKind::Line,
        title: "revenue by quarter".into(),
        description: "quarterly revenue trend".into(),
        aggregation: Some(Aggregation::Sum),
        group_by_column: Some("quarter".into()),
        value_column: Some("revenue".into()),
        x_column: None,
        y_column: None,
        default_top_n: None,
        default_hide_others: None,
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        action_pacing: std::time::Duration::from_millis(1),
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn full_pipeline_from_csv_to_chat_mutations() {
    let config = fast_config();
    let planner = ScriptedPlanner {
        preparations: Mutex::new(
            vec![DataPreparationPlan {
                explanation: "Parsed revenue as numbers.".into(),
                transform_code: Some("parse_number revenue\nreturn rows".into()),
                output_columns: Vec::new(),
            }]
            .into(),
        ),
        initial: vec![revenue_plan()],
        turns: Mutex::new(
            vec![json!({
                "actions": [
                    {"thought": "I'll narrow the data to the east region and refresh the deck.",
                     "kind": "text", "content": "Focusing on the east region."},
                    {"thought": "Drop the west rows.",
                     "kind": "code_execution",
                     "code": "filter region == \"east\"\nreturn rows"},
                    {"thought": "Pie charts read better here.",
                     "kind": "dom_action", "tool": "change_chart_kind",
                     "args": {"card_id": "latest", "chart_kind": "pie"}}
                ]
            })
            .to_string()]
            .into(),
        ),
    };

    // Ingestion: CSV rows, formula neutralized, transform applied in full.
    let rows = ingest::dataset_from_reader(CSV.as_bytes()).unwrap();
    assert_eq!(
        rows[4].get("revenue"),
        Some(&Value::Text("'=HACK()".into()))
    );

    let mut session = analysis::ingest(&planner, rows, &config).await.unwrap();
    assert_eq!(
        session.dataset[0].get("revenue"),
        Some(&Value::Number(1200.0))
    );

    // Initial analysis: one card, chronologically sorted, summarized.
    analysis::run_initial_analysis(&planner, &mut session, &config)
        .await
        .unwrap();
    assert_eq!(session.cards.len(), 1);
    let keys: Vec<String> = session.cards[0]
        .aggregated_rows
        .iter()
        .map(|r| r.get("quarter").unwrap().key_string())
        .collect();
    assert_eq!(keys, vec!["Q4'22", "Q1 2023", "Q2/23"]);
    assert_eq!(
        session.cards[0].ai_summary.as_deref(),
        Some("Insight about revenue by quarter")
    );

    // Chat turn: text + dataset mutation + card directive, in order.
    let orchestrator = Orchestrator::new(&planner, &config);
    orchestrator
        .handle_user_message(&mut session, "only east please")
        .await
        .unwrap();

    assert!(session.dataset.iter().all(|r| {
        r.get("region").map(|v| v.key_string() == "east").unwrap_or(false)
    }));
    // Card regenerated from its original plan against the filtered data.
    let east_total: Vec<f64> = session.cards[0]
        .aggregated_rows
        .iter()
        .filter_map(|r| r.get("revenue").and_then(Value::numeric))
        .collect();
    // Q2/23 keeps its bucket with no parseable values, summing to zero.
    assert_eq!(east_total, vec![500.0, 1200.0, 0.0]);
    assert_eq!(session.cards[0].display_chart_kind, ChartKind::Pie);

    // Multi-action batch surfaced a plan-started preamble.
    assert!(session
        .timeline
        .iter()
        .any(|e| e.role == ChatRole::Notice && e.text.starts_with("Plan started:")));

    // Snapshot round-trip through the persistence boundary.
    let store = MemoryStore::new();
    store.put("t1", &session).await.unwrap();
    let restored = store.get("t1").await.unwrap().unwrap();
    assert_eq!(restored.cards.len(), session.cards.len());
    assert_eq!(restored.dataset.len(), session.dataset.len());
}

#[tokio::test]
async fn contract_violations_abort_the_turn_with_nothing_applied() {
    let config = fast_config();
    let planner = ScriptedPlanner {
        preparations: Mutex::new(
            vec![DataPreparationPlan {
                explanation: "Data is already clean.".into(),
                transform_code: None,
                output_columns: Vec::new(),
            }]
            .into(),
        ),
        initial: Vec::new(),
        turns: Mutex::new(
            vec![json!({
                "actions": [
                    {"thought": "ok", "kind": "text", "content": "fine"},
                    {"kind": "text", "content": "missing thought"}
                ]
            })
            .to_string()]
            .into(),
        ),
    };

    let rows = ingest::dataset_from_reader(CSV.as_bytes()).unwrap();
    let mut session = analysis::ingest(&planner, rows, &config).await.unwrap();
    let timeline_before = session.timeline.len();
    let cards_before = session.cards.len();

    let orchestrator = Orchestrator::new(&planner, &config);
    let err = orchestrator
        .handle_user_message(&mut session, "do something")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("contract violation"));

    // Only the user's own message landed; no action output of any kind.
    assert_eq!(session.timeline.len(), timeline_before + 1);
    assert_eq!(session.cards.len(), cards_before);
}
