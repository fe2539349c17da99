//! Session State
//!
//! The long-lived, single-writer state behind one analysis session:
//! dataset, column profiles, analysis cards and the chat/progress
//! timeline. Mutations replace the dataset wholesale (copy-on-write);
//! a generation counter lets stale async results be discarded instead of
//! relying on true cancellation.

use crate::aggregation::{collapse_top_n, AnalysisPlan, ChartKind, OTHERS_LABEL};
use crate::dataset::Row;
use crate::preparation::DataPreparationPlan;
use crate::profiler::{self, ColumnProfile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Synthetic card id resolving to the most recently added card.
pub const LATEST_CARD: &str = "latest";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardFilter {
    pub column: String,
    pub allowed_values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisCard {
    pub id: String,
    pub plan: AnalysisPlan,
    pub aggregated_rows: Vec<Row>,
    pub ai_summary: Option<String>,
    pub display_chart_kind: ChartKind,
    pub top_n: usize,
    pub hide_others: bool,
    pub hidden_labels: BTreeSet<String>,
    pub filter: Option<CardFilter>,
    pub highlighted: bool,
}

impl AnalysisCard {
    pub fn new(plan: AnalysisPlan, aggregated_rows: Vec<Row>, default_top_n: usize) -> Self {
        let top_n = plan.default_top_n.unwrap_or(default_top_n);
        let hide_others = plan.default_hide_others.unwrap_or(false);
        Self {
            id: Uuid::new_v4().to_string(),
            display_chart_kind: plan.chart_kind,
            top_n,
            hide_others,
            plan,
            aggregated_rows,
            ai_summary: None,
            hidden_labels: BTreeSet::new(),
            filter: None,
            highlighted: false,
        }
    }

    fn label_column(&self) -> Option<&str> {
        self.plan.group_by_column.as_deref()
    }

    fn value_column(&self) -> String {
        self.plan
            .value_column
            .clone()
            .unwrap_or_else(|| "count".to_string())
    }

    /// Rows handed to the rendering boundary: card filter, hidden labels
    /// and the Top-N bound applied on top of the aggregated rows.
    pub fn visible_rows(&self) -> Vec<Row> {
        let mut rows: Vec<Row> = self.aggregated_rows.clone();

        if let Some(filter) = &self.filter {
            rows.retain(|row| {
                row.get(&filter.column)
                    .map(|v| filter.allowed_values.contains(&v.key_string()))
                    .unwrap_or(false)
            });
        }

        let label_column = match self.label_column() {
            Some(c) => c.to_string(),
            None => return rows, // scatter cards have no category axis
        };

        if !self.hidden_labels.is_empty() {
            rows.retain(|row| {
                row.get(&label_column)
                    .map(|v| !self.hidden_labels.contains(&v.key_string()))
                    .unwrap_or(true)
            });
        }

        if self.top_n > 0 && rows.len() > self.top_n {
            rows = collapse_top_n(&rows, self.top_n, &label_column, &self.value_column());
            if self.hide_others {
                rows.retain(|row| {
                    row.get(&label_column)
                        .map(|v| v.key_string() != OTHERS_LABEL)
                        .unwrap_or(true)
                });
            }
        }
        rows
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    Notice,
    Error,
}

/// One entry of the chronological progress/chat timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    pub ts_ms: u64,
    pub role: ChatRole,
    pub text: String,
    #[serde(default)]
    pub card_id: Option<String>,
}

impl ChatEntry {
    pub fn now(role: ChatRole, text: String) -> Self {
        let ts_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            ts_ms,
            role,
            text,
            card_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionState {
    pub dataset: Vec<Row>,
    pub profiles: Vec<ColumnProfile>,
    pub cards: Vec<AnalysisCard>,
    pub timeline: Vec<ChatEntry>,
    pub preparation: Option<DataPreparationPlan>,
    /// Liveness epoch; results computed under an older generation are
    /// discarded when applied. Not persisted.
    #[serde(skip)]
    generation: u64,
}

impl SessionState {
    pub fn new(dataset: Vec<Row>) -> Self {
        let profiles = profiler::profile(&dataset);
        Self {
            dataset,
            profiles,
            cards: Vec::new(),
            timeline: Vec::new(),
            preparation: None,
            generation: 0,
        }
    }

    /// Replace the dataset wholesale and recompute derived profiles.
    pub fn replace_dataset(&mut self, rows: Vec<Row>) {
        self.dataset = rows;
        self.profiles = profiler::profile(&self.dataset);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Tear down the session: everything is dropped and in-flight results
    /// become stale.
    pub fn reset(&mut self) {
        self.dataset.clear();
        self.profiles.clear();
        self.cards.clear();
        self.timeline.clear();
        self.preparation = None;
        self.generation += 1;
    }

    pub fn add_card(&mut self, card: AnalysisCard) -> String {
        let id = card.id.clone();
        self.cards.push(card);
        id
    }

    /// Look a card up by id; `latest` addresses the most recent card.
    pub fn card_mut(&mut self, id: &str) -> Option<&mut AnalysisCard> {
        if id == LATEST_CARD {
            return self.cards.last_mut();
        }
        self.cards.iter_mut().find(|c| c.id == id)
    }

    pub fn card(&self, id: &str) -> Option<&AnalysisCard> {
        if id == LATEST_CARD {
            return self.cards.last();
        }
        self.cards.iter().find(|c| c.id == id)
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.timeline.push(ChatEntry::now(ChatRole::User, text.into()));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>, card_id: Option<String>) {
        let mut entry = ChatEntry::now(ChatRole::Assistant, text.into());
        entry.card_id = card_id;
        self.timeline.push(entry);
    }

    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.timeline.push(ChatEntry::now(ChatRole::Notice, text.into()));
    }

    pub fn push_error(&mut self, text: impl Into<String>) {
        self.timeline.push(ChatEntry::now(ChatRole::Error, text.into()));
    }

    /// Compact description of the current state for chat prompts.
    pub fn describe(&self) -> String {
        let columns: Vec<String> = self
            .profiles
            .iter()
            .map(|p| format!("{} ({:?})", p.name, p.kind))
            .collect();
        let cards: Vec<String> = self
            .cards
            .iter()
            .map(|c| format!("{}: {}", c.id, c.plan.title))
            .collect();
        format!(
            "rows: {}\ncolumns: {}\ncards: {}",
            self.dataset.len(),
            columns.join(", "),
            if cards.is_empty() {
                "none".to_string()
            } else {
                cards.join("; ")
            }
        )
    }
}
