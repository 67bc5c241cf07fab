//! The Persona Orchestrator: composes persona hydration, memory
//! truncation, prompt assembly, reflection validation and the retry loop
//! into one call that always returns a reply string.

pub mod memory;
pub mod prompt;
pub mod reflection;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use cipher_detection::RiskLevel;
use cipher_llm::{ChatMessage, Generator};
use cipher_persona::PersonaEngine;
use tracing::{error, instrument};

pub use reflection::{AgentResponse, InternalReasoning, ReflectionError};

fn risk_level_label(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Low => "low",
        RiskLevel::Medium => "medium",
        RiskLevel::High => "high",
        RiskLevel::Critical => "critical",
    }
}

/// Everything the orchestrator needs to produce one reply.
pub struct GenerateRequest {
    pub persona_id: String,
    pub history: Vec<ChatMessage>,
    pub turn_number: u64,
    pub max_messages: u64,
    pub missing_entities: Vec<&'static str>,
    pub confidence_score: f64,
    pub risk_level: RiskLevel,
}

pub struct GenerateOutcome {
    pub reply: String,
    /// Resolves the Open Question in spec.md §9: true when the model's
    /// internal reasoning asked to wrap up early.
    pub disengage_requested: bool,
}

pub struct Orchestrator {
    persona_engine: Arc<PersonaEngine>,
    generator: Arc<dyn Generator>,
    retry_handler: retry::RetryHandler,
    max_turns_retained: usize,
}

impl Orchestrator {
    pub fn new(
        persona_engine: Arc<PersonaEngine>,
        generator: Arc<dyn Generator>,
        max_retries: usize,
        generation_timeout: Duration,
        max_turns_retained: usize,
    ) -> Self {
        Self {
            persona_engine,
            generator,
            retry_handler: retry::RetryHandler::new(max_retries, generation_timeout),
            max_turns_retained,
        }
    }

    /// Never fails: a persona-load error or total LLM exhaustion both
    /// degrade to the micro-fallback reply rather than propagating an
    /// error to the engagement controller (spec.md §4.1 step 6).
    #[instrument(skip(self, request), fields(persona_id = %request.persona_id, turn = request.turn_number))]
    pub async fn generate_reply(&self, request: GenerateRequest) -> GenerateOutcome {
        let persona_block = match self.persona_engine.build_system_prompt_segment(&request.persona_id) {
            Ok(block) => block,
            Err(e) => {
                error!(error = %e, "persona load failed, degrading to micro-fallback");
                let fallback = retry::micro_fallback();
                return GenerateOutcome {
                    reply: fallback.final_response,
                    disengage_requested: false,
                };
            }
        };

        let history = memory::summarize_history(request.history, self.max_turns_retained);
        let detection = prompt::DetectionState {
            confidence_score: request.confidence_score,
            risk_level: risk_level_label(request.risk_level),
        };
        let ctx = prompt::SessionContext {
            history,
            turn_number: request.turn_number,
            max_messages: request.max_messages,
            missing_entities: request.missing_entities,
        };

        let messages = prompt::compose(&persona_block, ctx, &detection);
        let response = self.retry_handler.execute(self.generator.as_ref(), &messages).await;

        GenerateOutcome {
            disengage_requested: response.requests_disengage(),
            reply: response.final_response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, _messages: &[ChatMessage], _temperature: f32) -> anyhow::Result<String> {
            Ok(serde_json::json!({
                "internal_reasoning": {
                    "situation_analysis": "They are asking for my bank PIN urgently.",
                    "strategy_selection": "Ask a naive clarifying question to stall them.",
                    "persona_alignment_check": "Consistent with Margaret's low tech literacy."
                },
                "final_response": "Oh my, which button do I press for that?"
            })
            .to_string())
        }
    }

    fn fixture_dir() -> std::path::PathBuf {
        std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../persona/personas")
    }

    #[tokio::test]
    async fn produces_a_reply_for_a_known_persona() {
        let orchestrator = Orchestrator::new(
            Arc::new(PersonaEngine::new(fixture_dir())),
            Arc::new(EchoGenerator),
            3,
            Duration::from_secs(8),
            10,
        );

        let outcome = orchestrator
            .generate_reply(GenerateRequest {
                persona_id: "margaret_72".to_string(),
                history: vec![ChatMessage::user("Share your OTP now")],
                turn_number: 1,
                max_messages: 20,
                missing_entities: vec!["upiIds"],
                confidence_score: 0.9,
                risk_level: RiskLevel::Critical,
            })
            .await;

        assert_eq!(outcome.reply, "Oh my, which button do I press for that?");
        assert!(!outcome.disengage_requested);
    }

    #[tokio::test]
    async fn unknown_persona_degrades_to_micro_fallback() {
        let orchestrator = Orchestrator::new(
            Arc::new(PersonaEngine::new(fixture_dir())),
            Arc::new(EchoGenerator),
            3,
            Duration::from_secs(8),
            10,
        );

        let outcome = orchestrator
            .generate_reply(GenerateRequest {
                persona_id: "nonexistent".to_string(),
                history: vec![ChatMessage::user("hi")],
                turn_number: 1,
                max_messages: 20,
                missing_entities: vec![],
                confidence_score: 0.1,
                risk_level: RiskLevel::Low,
            })
            .await;

        assert!(!outcome.reply.is_empty());
    }
}
