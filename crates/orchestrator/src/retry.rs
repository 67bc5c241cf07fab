//! Temperature-escalated retry loop. Timeouts and validator rejections
//! both count as a failed attempt; total exhaustion falls back to a
//! single persona-compliant micro-fallback reply.

use std::time::Duration;

use cipher_llm::{ChatMessage, Generator};
use rand::seq::SliceRandom;
use tracing::{error, warn};

use crate::reflection::{self, AgentResponse, InternalReasoning};

const TEMPERATURES: &[f32] = &[0.7, 0.9, 0.4];

/// The only permitted non-dynamic reply, drawn from a short fixed pool
/// when every retry attempt fails. Conservative panic lines suited to an
/// elderly, low-tech-literacy persona — tune per-persona if ever needed.
const MICRO_FALLBACKS: &[&str] = &[
    "Oh dear, my screen just went black for a moment. What were you saying?",
    "I'm sorry, my internet is acting up. Could you repeat that?",
    "Wait, I dropped my reading glasses. What do I need to do next?",
];

/// Exposed so callers that can't even reach the retry loop (e.g. a persona
/// load failure) can still return the one permitted static reply.
pub fn micro_fallback() -> AgentResponse {
    let reply = MICRO_FALLBACKS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(MICRO_FALLBACKS[0]);
    AgentResponse {
        internal_reasoning: InternalReasoning {
            situation_analysis: "SYSTEM FAILURE".to_string(),
            strategy_selection: "EMERGENCY MICRO-PROMPT TRIGGERED".to_string(),
            persona_alignment_check: "MANUAL OVERRIDE".to_string(),
        },
        final_response: reply.to_string(),
    }
}

pub struct RetryHandler {
    max_retries: usize,
    generation_timeout: Duration,
}

impl RetryHandler {
    pub fn new(max_retries: usize, generation_timeout: Duration) -> Self {
        Self { max_retries, generation_timeout }
    }

    /// Attempts generation up to `max_retries` times at the progressive
    /// temperature schedule `[0.7, 0.9, 0.4]` (repeating the last value if
    /// `max_retries` exceeds the schedule length). Every attempt is wrapped
    /// in `generation_timeout`; a timeout or generator error counts as a
    /// failed attempt exactly like a validator rejection.
    pub async fn execute(&self, generator: &dyn Generator, messages: &[ChatMessage]) -> AgentResponse {
        for attempt in 0..self.max_retries {
            let temperature = *TEMPERATURES.get(attempt).unwrap_or(&0.4);

            let outcome = tokio::time::timeout(
                self.generation_timeout,
                generator.generate(messages, temperature),
            )
            .await;

            let raw = match outcome {
                Ok(Ok(raw)) => raw,
                Ok(Err(e)) => {
                    warn!(attempt = attempt + 1, error = %e, "llm generation failed");
                    continue;
                }
                Err(_) => {
                    warn!(attempt = attempt + 1, "llm generation timed out");
                    continue;
                }
            };

            match reflection::evaluate(&raw) {
                Ok(parsed) => return parsed,
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "reflection validation failed");
                }
            }
        }

        error!("all structural generation attempts failed, falling back to micro-prompt");
        micro_fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct AlwaysFailsGenerator;

    #[async_trait]
    impl Generator for AlwaysFailsGenerator {
        async fn generate(&self, _messages: &[ChatMessage], _temperature: f32) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(anyhow::anyhow!("provider down"))
        }
    }

    struct SucceedsOnThirdAttempt {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Generator for SucceedsOnThirdAttempt {
        async fn generate(&self, _messages: &[ChatMessage], _temperature: f32) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                return Err(anyhow::anyhow!("not yet"));
            }
            Ok(serde_json::json!({
                "internal_reasoning": {
                    "situation_analysis": "They want an OTP urgently from me.",
                    "strategy_selection": "Ask them to repeat the instructions slowly.",
                    "persona_alignment_check": "Fits Margaret's confused-elder persona."
                },
                "final_response": "Sorry dear, which number do I need again?"
            })
            .to_string())
        }
    }

    #[tokio::test]
    async fn exhausts_all_attempts_and_falls_back() {
        let handler = RetryHandler::new(3, Duration::from_secs(1));
        let response = handler.execute(&AlwaysFailsGenerator, &[ChatMessage::user("hi")]).await;
        assert_eq!(response.internal_reasoning.situation_analysis, "SYSTEM FAILURE");
        assert!(MICRO_FALLBACKS.contains(&response.final_response.as_str()));
    }

    #[tokio::test]
    async fn succeeds_once_a_later_attempt_validates() {
        let generator = SucceedsOnThirdAttempt { calls: Arc::new(AtomicUsize::new(0)) };
        let handler = RetryHandler::new(3, Duration::from_secs(1));
        let response = handler.execute(&generator, &[ChatMessage::user("hi")]).await;
        assert_eq!(response.final_response, "Sorry dear, which number do I need again?");
    }
}
