//! AI Boundary
//!
//! `Planner` is the opaque request/response seam to the AI service;
//! `LlmClient` implements it against an OpenAI-style chat completions
//! endpoint. Responses must parse as JSON conforming to the requested
//! schema; anything else is a boundary contract violation and is never
//! silently coerced. Network failures retry on a fixed short backoff with
//! a small ceiling before surfacing a terminal error.

use crate::actions::{self, ChatAction};
use crate::aggregation::AnalysisPlan;
use crate::config::EngineConfig;
use crate::dataset::Row;
use crate::error::{EngineError, Result};
use crate::preparation::DataPreparationPlan;
use crate::profiler::ColumnProfile;
use crate::prompts;
use async_trait::async_trait;
use tracing::{debug, warn};

#[async_trait]
pub trait Planner: Send + Sync {
    /// Propose analysis plans for a freshly profiled dataset.
    async fn initial_plans(
        &self,
        profiles: &[ColumnProfile],
        sample: &[Row],
    ) -> Result<Vec<AnalysisPlan>>;

    /// Propose a data preparation plan, optionally correcting a previous
    /// failed attempt.
    async fn preparation_plan(
        &self,
        profiles: &[ColumnProfile],
        sample: &[Row],
        prior_error: Option<&str>,
    ) -> Result<DataPreparationPlan>;

    /// Turn a user chat message into an ordered action list.
    async fn chat_actions(&self, state_summary: &str, message: &str) -> Result<Vec<ChatAction>>;

    /// Narrative summary for one card's aggregated rows.
    async fn summarize_card(&self, title: &str, rows: &[Row]) -> Result<String>;
}

pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    attempts: u8,
    backoff: std::time::Duration,
}

impl LlmClient {
    pub fn new(api_key: String, config: &EngineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            attempts: config.llm_attempts,
            backoff: config.llm_retry_backoff,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You are a precise JSON-only responder. Always return valid JSON, no other text."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1,
        });

        let mut last_error = String::new();
        for attempt in 1..=self.attempts {
            let sent = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status());

            match sent {
                Ok(response) => {
                    let response_json: serde_json::Value = response
                        .json()
                        .await
                        .map_err(|e| EngineError::Llm(format!("failed to read LLM response: {}", e)))?;
                    let content = response_json["choices"][0]["message"]["content"]
                        .as_str()
                        .ok_or_else(|| EngineError::Llm("no content in LLM response".to_string()))?;
                    debug!(attempt, "LLM call succeeded");
                    return Ok(content.to_string());
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(attempt, error = %last_error, "LLM call failed");
                    if attempt < self.attempts {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }
        Err(EngineError::Llm(format!(
            "LLM request failed after {} attempts: {}",
            self.attempts, last_error
        )))
    }
}

/// Models wrap JSON in markdown fences despite instructions; strip one
/// fence layer before parsing.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    trimmed
}

#[async_trait]
impl Planner for LlmClient {
    async fn initial_plans(
        &self,
        profiles: &[ColumnProfile],
        sample: &[Row],
    ) -> Result<Vec<AnalysisPlan>> {
        let response = self
            .call_llm(&prompts::initial_plans_prompt(profiles, sample))
            .await?;
        serde_json::from_str(strip_code_fence(&response)).map_err(|e| {
            EngineError::BoundaryContract(format!("plan array failed to parse: {}", e))
        })
    }

    async fn preparation_plan(
        &self,
        profiles: &[ColumnProfile],
        sample: &[Row],
        prior_error: Option<&str>,
    ) -> Result<DataPreparationPlan> {
        let response = self
            .call_llm(&prompts::preparation_prompt(profiles, sample, prior_error))
            .await?;
        serde_json::from_str(strip_code_fence(&response)).map_err(|e| {
            EngineError::BoundaryContract(format!("preparation plan failed to parse: {}", e))
        })
    }

    async fn chat_actions(&self, state_summary: &str, message: &str) -> Result<Vec<ChatAction>> {
        let response = self
            .call_llm(&prompts::chat_prompt(state_summary, message))
            .await?;
        actions::parse_chat_turn(strip_code_fence(&response))
    }

    async fn summarize_card(&self, title: &str, rows: &[Row]) -> Result<String> {
        let response = self.call_llm(&prompts::summary_prompt(title, rows)).await?;
        Ok(response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fences() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[]\n```"), "[]");
        assert_eq!(strip_code_fence(" {\"a\":1} "), "{\"a\":1}");
    }
}
