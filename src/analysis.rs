//! Initial Analysis Flow
//!
//! raw rows → Type Profiler → Self-Correcting Preparation Loop → cleaned
//! dataset → Aggregation Engine per AI plan → analysis cards. Card
//! summaries for the initial fan-out run concurrently (their results are
//! independent) and are joined before insertion.

use crate::config::EngineConfig;
use crate::dataset::{sample, Row};
use crate::error::Result;
use crate::llm::Planner;
use crate::preparation;
use crate::session::{AnalysisCard, SessionState};
use crate::transform::TransformRunner;
use crate::aggregation;
use futures::future::join_all;
use tracing::{info, warn};

/// Ingest a dataset: profile it, run the preparation round-trip, and apply
/// the accepted transform to the full dataset. A `Preparation` error
/// propagates so the caller can choose to continue with the unprepared
/// rows (`SessionState::new`).
pub async fn ingest(
    planner: &dyn Planner,
    raw_rows: Vec<Row>,
    config: &EngineConfig,
) -> Result<SessionState> {
    let mut session = SessionState::new(raw_rows);
    let profiles = session.profiles.clone();
    let plan = preparation::prepare(
        planner,
        &profiles,
        sample(&session.dataset, config.sample_rows),
        config,
    )
    .await?;

    if let Some(code) = plan.code() {
        // Validated on the sample; the full dataset can still surprise.
        match TransformRunner::default().run(&session.dataset, code) {
            Ok(rows) => {
                info!(rows = rows.len(), "preparation transform applied");
                session.replace_dataset(rows);
            }
            Err(e) => {
                warn!(error = %e, "transform passed the sample but failed on the full dataset");
                session.push_error(format!(
                    "Data preparation was skipped: {}. Continuing with the raw data.",
                    e
                ));
            }
        }
    }

    session.push_notice(plan.explanation.clone());
    session.preparation = Some(plan);
    Ok(session)
}

/// Ask the AI for initial plans and materialize one card per non-empty
/// aggregation. Summaries are requested concurrently; completion order is
/// irrelevant because results are joined before any card is inserted.
pub async fn run_initial_analysis(
    planner: &dyn Planner,
    session: &mut SessionState,
    config: &EngineConfig,
) -> Result<()> {
    let generation = session.generation();
    let plans = planner
        .initial_plans(
            &session.profiles,
            sample(&session.dataset, config.sample_rows),
        )
        .await?;
    info!(plans = plans.len(), "initial analysis plans received");

    let mut cards: Vec<AnalysisCard> = Vec::new();
    for plan in plans {
        match aggregation::execute(&session.dataset, &plan, config) {
            Ok(rows) if rows.is_empty() => {
                info!(title = %plan.title, "plan produced no rows; skipped");
                session.push_notice(format!("\"{}\" matched no rows; skipped.", plan.title));
            }
            Ok(rows) => cards.push(AnalysisCard::new(plan, rows, config.default_top_n)),
            Err(e) => {
                warn!(title = %plan.title, error = %e, "initial plan failed");
                session.push_error(e.to_string());
            }
        }
    }

    let summaries = join_all(cards.iter().map(|card| {
        let title = card.plan.title.clone();
        let rows = card.aggregated_rows.clone();
        async move { planner.summarize_card(&title, &rows).await }
    }))
    .await;

    if !session.is_current(generation) {
        warn!("session superseded during initial analysis; results discarded");
        return Ok(());
    }

    for (mut card, summary) in cards.into_iter().zip(summaries) {
        match summary {
            Ok(text) => card.ai_summary = Some(text),
            Err(e) => warn!(error = %e, "initial summary failed"),
        }
        let title = card.plan.title.clone();
        session.add_card(card);
        session.push_notice(format!("Added card \"{}\".", title));
    }
    Ok(())
}
