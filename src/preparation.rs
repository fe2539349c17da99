//! Self-Correcting Preparation Loop
//!
//! One round-trip per freshly ingested dataset: ask the AI for a
//! preparation plan, validate any transform code deterministically against
//! the sample, and feed the exact failure text back as corrective context
//! on retry. Bounded by a retry budget; exhaustion is terminal and the
//! caller falls back to the unprepared dataset.

use crate::config::EngineConfig;
use crate::dataset::Row;
use crate::error::{EngineError, Result};
use crate::llm::Planner;
use crate::profiler::ColumnProfile;
use crate::transform::TransformRunner;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Produced once per dataset ingestion; immutable after acceptance and
/// retained for later natural-language explanation to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPreparationPlan {
    pub explanation: String,
    #[serde(default)]
    pub transform_code: Option<String>,
    #[serde(default)]
    pub output_columns: Vec<ColumnProfile>,
}

impl DataPreparationPlan {
    /// Whitespace-only code means no transform.
    pub fn code(&self) -> Option<&str> {
        self.transform_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Drive the preparation round-trip against the sample rows only.
pub async fn prepare(
    planner: &dyn Planner,
    profiles: &[ColumnProfile],
    sample: &[Row],
    config: &EngineConfig,
) -> Result<DataPreparationPlan> {
    let runner = TransformRunner::default();
    let mut last_error: Option<String> = None;

    for attempt in 1..=config.preparation_attempts {
        info!(attempt, "requesting data preparation plan");
        let mut plan = planner
            .preparation_plan(profiles, sample, last_error.as_deref())
            .await?;

        match plan.code() {
            None => {
                if plan.output_columns.is_empty() {
                    plan.output_columns = profiles.to_vec();
                }
                return Ok(plan);
            }
            Some(code) => match runner.run(sample, code) {
                Ok(_) => return Ok(plan),
                Err(e) => {
                    // The exact failure text crosses the retry boundary so
                    // the AI can make a provably different attempt.
                    let message = e.to_string();
                    warn!(attempt, error = %message, "preparation transform failed on sample");
                    last_error = Some(message);
                }
            },
        }
    }

    Err(EngineError::Preparation {
        attempts: config.preparation_attempts,
        last_error: last_error.unwrap_or_else(|| "no transform was attempted".to_string()),
    })
}
