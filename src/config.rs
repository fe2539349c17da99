//! Engine Configuration
//!
//! Tunables for retry budgets, pacing and the chronological-sort
//! heuristics. The chronology thresholds and the two-digit year pivot are
//! heuristics, so they live here instead of being hard-coded.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Attempts for the self-correcting data preparation loop.
    pub preparation_attempts: u8,

    /// Network-level attempts per LLM request.
    pub llm_attempts: u8,

    /// Fixed backoff between LLM network retries.
    pub llm_retry_backoff: Duration,

    /// Delay inserted between actions of a multi-action batch so the user
    /// can read intermediate output.
    pub action_pacing: Duration,

    /// How many leading result keys to sample when deciding whether a
    /// grouped result is chronological.
    pub chronology_sample: usize,

    /// Fraction of sampled keys that must look chronological to trigger
    /// the chronological sort.
    pub chronology_threshold: f64,

    /// Two-digit years below the pivot map to 2000s, the rest to 1900s.
    pub two_digit_year_pivot: i32,

    /// Rows sent to the AI as a dataset sample.
    pub sample_rows: usize,

    /// Default category bound for new cards when the plan does not set one.
    pub default_top_n: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preparation_attempts: 3,
            llm_attempts: 3,
            llm_retry_backoff: Duration::from_millis(300),
            action_pacing: Duration::from_millis(900),
            chronology_sample: 10,
            chronology_threshold: 0.5,
            two_digit_year_pivot: 50,
            sample_rows: 20,
            default_top_n: 12,
        }
    }
}
