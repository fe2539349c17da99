//! Chat Action Protocol
//!
//! Typed contracts for one AI chat turn: an ordered list of actions, each
//! carrying a mandatory `thought`. Decoding is strict; a response that
//! fails the schema is a boundary contract violation, never coerced.

use crate::aggregation::{AnalysisPlan, ChartKind};
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAction {
    #[serde(default)]
    pub thought: String,
    #[serde(flatten)]
    pub kind: ActionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// Conversational message, optionally tied to a card.
    Text {
        #[serde(default)]
        content: String,
        #[serde(default)]
        card_id: Option<String>,
    },
    /// Run the aggregation engine and materialize a new card.
    PlanCreation { plan: AnalysisPlan },
    /// UI directive addressed at an existing card. The tool name stays a
    /// raw string here so an unknown tool fails the single action, not the
    /// whole batch.
    DomAction {
        tool: String,
        #[serde(default)]
        args: Json,
    },
    /// Transform the full dataset through the sandboxed runner.
    CodeExecution { code: String },
    /// Deprecated no-op kept for older AI responses.
    #[serde(alias = "continue_execution")]
    Proceed,
}

/// Closed vocabulary of card directives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CardDirective {
    Highlight {
        card_id: String,
    },
    SetChartKind {
        card_id: String,
        chart_kind: ChartKind,
    },
    ToggleSeries {
        card_id: String,
        label: String,
    },
    SetFilter {
        card_id: String,
        column: String,
        allowed_values: Vec<String>,
    },
}

impl CardDirective {
    /// Resolve a raw tool invocation into the closed vocabulary.
    pub fn resolve(tool: &str, args: &Json) -> Result<CardDirective> {
        fn arg(args: &Json, name: &str, tool: &str) -> Result<String> {
            args.get(name)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .ok_or_else(|| {
                    EngineError::DomAction(format!("tool '{}' is missing argument '{}'", tool, name))
                })
        }

        match tool {
            "highlight_card" => Ok(CardDirective::Highlight {
                card_id: arg(args, "card_id", tool)?,
            }),
            "change_chart_kind" => {
                let chart_kind: ChartKind =
                    serde_json::from_value(args.get("chart_kind").cloned().unwrap_or(Json::Null))
                        .map_err(|e| {
                            EngineError::DomAction(format!(
                                "tool '{}' has an invalid chart_kind: {}",
                                tool, e
                            ))
                        })?;
                Ok(CardDirective::SetChartKind {
                    card_id: arg(args, "card_id", tool)?,
                    chart_kind,
                })
            }
            "toggle_data_visibility" => Ok(CardDirective::ToggleSeries {
                card_id: arg(args, "card_id", tool)?,
                label: arg(args, "label", tool)?,
            }),
            "filter_card" => {
                let allowed_values = args
                    .get("allowed_values")
                    .and_then(|v| v.as_array())
                    .map(|a| {
                        a.iter()
                            .filter_map(|v| v.as_str().map(|s| s.to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(CardDirective::SetFilter {
                    card_id: arg(args, "card_id", tool)?,
                    column: arg(args, "column", tool)?,
                    allowed_values,
                })
            }
            other => Err(EngineError::DomAction(format!(
                "unrecognized tool '{}'",
                other
            ))),
        }
    }

    pub fn card_id(&self) -> &str {
        match self {
            CardDirective::Highlight { card_id }
            | CardDirective::SetChartKind { card_id, .. }
            | CardDirective::ToggleSeries { card_id, .. }
            | CardDirective::SetFilter { card_id, .. } => card_id,
        }
    }
}

/// Every action of a batch must carry a non-blank thought. A violation
/// invalidates the whole batch before anything executes.
pub fn validate_batch(actions: &[ChatAction]) -> Result<()> {
    for (index, action) in actions.iter().enumerate() {
        if action.thought.trim().is_empty() {
            return Err(EngineError::BoundaryContract(format!(
                "action {} has no thought",
                index + 1
            )));
        }
    }
    Ok(())
}

/// Parse one chat-turn response (`{"actions": [...]}`) and validate the
/// thought contract.
pub fn parse_chat_turn(raw: &str) -> Result<Vec<ChatAction>> {
    #[derive(Deserialize)]
    struct Turn {
        actions: Vec<ChatAction>,
    }

    let turn: Turn = serde_json::from_str(raw)
        .map_err(|e| EngineError::BoundaryContract(format!("chat response failed to parse: {}", e)))?;
    validate_batch(&turn.actions)?;
    Ok(turn.actions)
}
