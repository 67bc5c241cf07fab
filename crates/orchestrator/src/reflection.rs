//! Validates raw LLM output against the structured-output schema and the
//! anti-static-reply liveness check.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const GENERIC_REPLY_BLOCKLIST: &[&str] =
    &["as an ai", "i cannot assist", "i do not understand", "sorry, i am", "i am an ai"];

const MIN_REASONING_LEN: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalReasoning {
    pub situation_analysis: String,
    pub strategy_selection: String,
    pub persona_alignment_check: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub internal_reasoning: InternalReasoning,
    pub final_response: String,
}

impl AgentResponse {
    /// The Open Question resolution: an orchestrator-signaled early
    /// disengage is the literal marker `"DISENGAGE"` inside
    /// `strategy_selection`.
    pub fn requests_disengage(&self) -> bool {
        self.internal_reasoning.strategy_selection.contains("DISENGAGE")
    }
}

#[derive(Debug, Error)]
pub enum ReflectionError {
    #[error("EVAL_FAIL: invalid JSON format: {0}")]
    InvalidJson(String),
    #[error("EVAL_FAIL: missing or empty required schema fields: {0}")]
    MissingFields(String),
    #[error("EVAL_FAIL: reasoning block too shallow or generic")]
    ShallowReasoning,
    #[error("EVAL_FAIL: final_response matches a generic-reply template")]
    GenericReply,
}

/// Strips a leading/trailing fenced code block (```json ... ``` or
/// ``` ... ```) that some models wrap structured output in.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("```json").unwrap_or(trimmed);
    let trimmed = trimmed.strip_prefix("```").unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Validates: (1) valid JSON, (2) all schema fields present and
/// non-empty, (3) reasoning fields meet a minimum length, (4)
/// `final_response` avoids the generic-reply blocklist.
pub fn evaluate(raw_llm_output: &str) -> Result<AgentResponse, ReflectionError> {
    let cleaned = strip_code_fences(raw_llm_output);

    let parsed: AgentResponse =
        serde_json::from_str(cleaned).map_err(|e| ReflectionError::InvalidJson(e.to_string()))?;

    if parsed.internal_reasoning.situation_analysis.trim().is_empty()
        || parsed.internal_reasoning.strategy_selection.trim().is_empty()
        || parsed.internal_reasoning.persona_alignment_check.trim().is_empty()
        || parsed.final_response.trim().is_empty()
    {
        return Err(ReflectionError::MissingFields(
            "one or more schema fields is empty".to_string(),
        ));
    }

    if parsed.internal_reasoning.situation_analysis.len() < MIN_REASONING_LEN
        || parsed.internal_reasoning.strategy_selection.len() < MIN_REASONING_LEN
    {
        return Err(ReflectionError::ShallowReasoning);
    }

    let lowered = parsed.final_response.to_lowercase();
    if GENERIC_REPLY_BLOCKLIST.iter().any(|template| lowered.contains(template)) {
        return Err(ReflectionError::GenericReply);
    }

    Ok(parsed)
}
