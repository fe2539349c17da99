//! Action Orchestrator
//!
//! Consumes the ordered action list of one chat turn and applies each
//! action to the session in strict list order, with pacing between
//! actions and per-action failure isolation. A contract violation
//! (missing thought) rejects the whole batch before anything executes;
//! everything else fails the single action and the batch continues.

use crate::actions::{self, ActionKind, CardDirective, ChatAction};
use crate::aggregation;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::llm::Planner;
use crate::session::{AnalysisCard, CardFilter, SessionState};
use crate::transform::TransformRunner;
use tracing::{debug, info, warn};

pub struct Orchestrator<'a> {
    planner: &'a dyn Planner,
    config: &'a EngineConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(planner: &'a dyn Planner, config: &'a EngineConfig) -> Self {
        Self { planner, config }
    }

    /// Handle one user chat message end to end: ask the AI for an action
    /// plan and execute it. A boundary contract violation is fatal to the
    /// turn; nothing is partially applied.
    pub async fn handle_user_message(
        &self,
        session: &mut SessionState,
        message: &str,
    ) -> Result<()> {
        session.push_user(message);
        let batch = self
            .planner
            .chat_actions(&session.describe(), message)
            .await?;
        self.run_batch(session, batch).await
    }

    /// Execute one action batch against the session.
    pub async fn run_batch(
        &self,
        session: &mut SessionState,
        batch: Vec<ChatAction>,
    ) -> Result<()> {
        // Contract check first: a single blank thought invalidates the
        // whole batch before any action runs.
        actions::validate_batch(&batch)?;

        let generation = session.generation();
        let total = batch.len();
        let multi = total > 1;

        if multi {
            session.push_notice(format!("Plan started: {}", batch[0].thought));
        }

        for (index, action) in batch.into_iter().enumerate() {
            if !session.is_current(generation) {
                warn!("session superseded; abandoning remaining actions");
                return Ok(());
            }

            // The first thought of a multi-action plan was already shown
            // as the plan-started notice.
            if !(multi && index == 0) {
                session.push_notice(action.thought.clone());
            }

            if let Err(e) = self.apply(session, &action, generation).await {
                info!(action = index + 1, error = %e, "action failed; batch continues");
                session.push_error(e.to_string());
            }

            if multi && index + 1 < total {
                tokio::time::sleep(self.config.action_pacing).await;
            }
        }
        Ok(())
    }

    async fn apply(
        &self,
        session: &mut SessionState,
        action: &ChatAction,
        generation: u64,
    ) -> Result<()> {
        match &action.kind {
            ActionKind::Text { content, card_id } => {
                session.push_assistant(content.clone(), card_id.clone());
                Ok(())
            }
            ActionKind::PlanCreation { plan } => {
                let rows = aggregation::execute(&session.dataset, plan, self.config)?;
                if rows.is_empty() {
                    info!(title = %plan.title, "plan produced no rows; card skipped");
                    session.push_notice(format!(
                        "\"{}\" matched no rows, so no card was added.",
                        plan.title
                    ));
                    return Ok(());
                }

                let card = AnalysisCard::new(plan.clone(), rows, self.config.default_top_n);
                let summary_rows = card.aggregated_rows.clone();
                let card_id = session.add_card(card);

                let summary = self.planner.summarize_card(&plan.title, &summary_rows).await;
                // The await above is a suspension point; a reset session
                // must not receive the stale summary.
                if !session.is_current(generation) {
                    return Ok(());
                }
                match summary {
                    Ok(text) => {
                        if let Some(card) = session.card_mut(&card_id) {
                            card.ai_summary = Some(text);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "card summary failed");
                        session.push_notice(format!(
                            "Added \"{}\" without a summary ({}).",
                            plan.title, e
                        ));
                        return Ok(());
                    }
                }
                session.push_notice(format!("Added card \"{}\".", plan.title));
                Ok(())
            }
            ActionKind::DomAction { tool, args } => {
                let directive = CardDirective::resolve(tool, args)?;
                self.apply_directive(session, directive)
            }
            ActionKind::CodeExecution { code } => {
                let transformed = TransformRunner::default().run(&session.dataset, code)?;
                session.replace_dataset(transformed);

                // Every card is regenerated from its original plan against
                // the new dataset.
                let plans: Vec<(String, aggregation::AnalysisPlan)> = session
                    .cards
                    .iter()
                    .map(|c| (c.id.clone(), c.plan.clone()))
                    .collect();
                let mut regenerated = 0usize;
                for (card_id, plan) in plans {
                    match aggregation::execute(&session.dataset, &plan, self.config) {
                        Ok(rows) => {
                            if let Some(card) = session.card_mut(&card_id) {
                                card.aggregated_rows = rows;
                                regenerated += 1;
                            }
                        }
                        Err(e) => {
                            session.push_notice(format!(
                                "Card \"{}\" could not be recomputed: {}",
                                plan.title, e
                            ));
                        }
                    }
                }
                session.push_notice(format!(
                    "Dataset updated ({} rows); {} card(s) recomputed.",
                    session.dataset.len(),
                    regenerated
                ));
                Ok(())
            }
            ActionKind::Proceed => {
                debug!("deprecated proceed action; nothing to do");
                Ok(())
            }
        }
    }

    fn apply_directive(&self, session: &mut SessionState, directive: CardDirective) -> Result<()> {
        let card_id = directive.card_id().to_string();
        let card = session.card_mut(&card_id).ok_or_else(|| {
            EngineError::DomAction(format!("no card with id '{}'", card_id))
        })?;

        match directive {
            CardDirective::Highlight { .. } => card.highlighted = true,
            CardDirective::SetChartKind { chart_kind, .. } => {
                card.display_chart_kind = chart_kind;
            }
            CardDirective::ToggleSeries { label, .. } => {
                if !card.hidden_labels.remove(&label) {
                    card.hidden_labels.insert(label);
                }
            }
            CardDirective::SetFilter {
                column,
                allowed_values,
                ..
            } => {
                card.filter = Some(CardFilter {
                    column,
                    allowed_values,
                });
            }
        }
        Ok(())
    }
}
