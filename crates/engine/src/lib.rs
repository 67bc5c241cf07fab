//! The Engagement Controller: per-turn state machine, gating, and the
//! composition root tying detection, extraction, the orchestrator,
//! events, the session store and the callback dispatcher together.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use cipher_callback::CallbackDispatcher;
use cipher_detection::ScamDetectorEngine;
use cipher_events::{Event, EventBus, ENGAGEMENT_COMPLETED, ENGAGEMENT_TURN, SCAM_DETECTED};
use cipher_orchestrator::{GenerateRequest, Orchestrator};
use cipher_session::{Session, SessionStage, SessionStore};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// A single message as carried in the request/history payloads (spec.md §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IncomingMessage {
    pub sender: String,
    pub text: String,
    pub timestamp: i64,
}

/// The agent's own sender alias in history and published events —
/// excluded from profiling (spec.md §4.6) and from the user/assistant
/// role mapping below.
pub const AGENT_SENDER: &str = "agent";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Continue,
    Completed,
    Error,
    Disabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub status: ResponseStatus,
    pub reply: Option<String>,
    pub session_state: SessionStage,
    pub turn_number: u64,
    pub scam_detected: bool,
    pub confidence_score: f64,
}

/// Immutable per-call configuration the controller needs beyond its
/// collaborators' own settings.
pub struct EngineSettings {
    pub max_turns: u64,
    pub default_persona_id: String,
    pub feature_engagement_enabled: bool,
}

pub struct EngagementController {
    store: Arc<dyn SessionStore>,
    bus: Arc<dyn EventBus>,
    detector: ScamDetectorEngine,
    orchestrator: Orchestrator,
    callback: CallbackDispatcher,
    settings: EngineSettings,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EngagementController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        bus: Arc<dyn EventBus>,
        detector: ScamDetectorEngine,
        orchestrator: Orchestrator,
        callback: CallbackDispatcher,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            bus,
            detector,
            orchestrator,
            callback,
            settings,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.session_locks
            .lock()
            .await
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn terminal_outcome(session: &Session) -> ProcessOutcome {
        let status = match session.stage {
            SessionStage::Completed => ResponseStatus::Completed,
            _ => ResponseStatus::Continue,
        };
        ProcessOutcome {
            status,
            reply: Some("This session has concluded.".to_string()),
            session_state: session.stage,
            turn_number: session.turn_number,
            scam_detected: session.is_scam,
            confidence_score: session.scam_score,
        }
    }

    /// The single public operation (spec.md §4.1). Per-session turns are
    /// serialized by an in-process lock keyed on `session_id`, held across
    /// the full `get → mutate → save` sequence.
    #[instrument(skip(self, prior_history), fields(session_id, turn_number))]
    pub async fn process_message(
        &self,
        session_id: &str,
        incoming: IncomingMessage,
        prior_history: &[IncomingMessage],
    ) -> Result<ProcessOutcome> {
        if !self.settings.feature_engagement_enabled {
            info!("engagement disabled via feature flag");
            return Ok(ProcessOutcome {
                status: ResponseStatus::Disabled,
                reply: None,
                session_state: SessionStage::Idle,
                turn_number: 0,
                scam_detected: false,
                confidence_score: 0.0,
            });
        }

        let lock = self.lock_for(session_id).await;
        let _guard = lock.lock().await;

        let mut session = match self.store.get(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                info!(session_id, "creating new session");
                Session::new(session_id, self.settings.default_persona_id.clone())
            }
            Err(e) => {
                warn!(session_id, error = %e, "session load failed, starting fresh");
                Session::new(session_id, self.settings.default_persona_id.clone())
            }
        };

        if session.stage.is_terminal() {
            info!(session_id, stage = ?session.stage, "session already concluded");
            return Ok(Self::terminal_outcome(&session));
        }

        if matches!(session.stage, SessionStage::Idle | SessionStage::Detecting) {
            let signal = self.detector.detect(&incoming.text, session.scam_score);

            if signal.scam_detected {
                session.raise_score(signal.confidence_score);
                session.advance(SessionStage::Engaging);

                // This branch only runs while stage is idle/detecting, and the
                // transition above leaves that pair for good, so this fires
                // exactly once per session.
                self.bus
                    .publish(Event::new(
                        SCAM_DETECTED,
                        serde_json::json!({
                            "session_id": session_id,
                            "confidence_score": session.scam_score,
                            "sender": incoming.sender,
                            "text": incoming.text,
                        }),
                    ))
                    .await
                    .unwrap_or_else(|e| warn!(session_id, error = %e, "scam.detected publish failed"));
            } else {
                session.advance(SessionStage::Safe);
                self.persist(&session).await;
                return Ok(ProcessOutcome {
                    status: ResponseStatus::Continue,
                    reply: Some("Thanks for your message!".to_string()),
                    session_state: session.stage,
                    turn_number: session.turn_number,
                    scam_detected: session.is_scam,
                    confidence_score: session.scam_score,
                });
            }
        }

        let extracted = cipher_intel::extract(&incoming.text);
        session.intel_buffer.merge(&extracted);

        let mut history: Vec<cipher_llm::ChatMessage> = prior_history
            .iter()
            .chain(std::iter::once(&incoming))
            .map(|m| {
                if m.sender == AGENT_SENDER {
                    cipher_llm::ChatMessage::assistant(m.text.clone())
                } else {
                    cipher_llm::ChatMessage::user(m.text.clone())
                }
            })
            .collect();
        if history.is_empty() {
            history.push(cipher_llm::ChatMessage::user(incoming.text.clone()));
        }

        let risk_level = cipher_detection::RiskLevel::from_confidence(session.scam_score);
        let outcome = self
            .orchestrator
            .generate_reply(GenerateRequest {
                persona_id: session.persona_id.clone(),
                history,
                turn_number: session.turn_number,
                max_messages: self.settings.max_turns,
                missing_entities: session.intel_buffer.missing_categories(),
                confidence_score: session.scam_score,
                risk_level,
            })
            .await;

        session.turn_number += 1;

        if session.stage == SessionStage::Engaging {
            if session.turn_number >= self.settings.max_turns || outcome.disengage_requested {
                session.advance(SessionStage::Completing);
            } else {
                session.advance(SessionStage::Engaging);
            }
        }

        self.bus
            .publish(Event::new(
                ENGAGEMENT_TURN,
                serde_json::json!({
                    "session_id": session_id,
                    "turn_number": session.turn_number,
                    "sender": incoming.sender,
                    "reply": outcome.reply,
                    "intel_buffer_snapshot": session.intel_buffer,
                }),
            ))
            .await
            .unwrap_or_else(|e| warn!(session_id, error = %e, "engagement.turn publish failed"));

        // Gated on `callback_sent`, not just `stage == Completing`: if the
        // end-of-turn `persist()` below fails, the next turn reloads the
        // pre-completion session (still `Engaging`) and would otherwise
        // walk this branch again, re-emitting `engagement.completed` and
        // re-firing the callback (spec.md §5(b), §8 property 6).
        if session.stage == SessionStage::Completing && !session.callback_sent {
            info!(session_id, "session completing, firing callback");
            self.bus
                .publish(Event::new(
                    ENGAGEMENT_COMPLETED,
                    serde_json::json!({ "session_id": session_id, "turn_number": session.turn_number }),
                ))
                .await
                .unwrap_or_else(|e| warn!(session_id, error = %e, "engagement.completed publish failed"));

            self.callback.dispatch(&session).await;
            session.callback_sent = true;
            session.advance(SessionStage::Completed);
        }

        self.persist(&session).await;

        Ok(ProcessOutcome {
            status: if session.stage == SessionStage::Completed {
                ResponseStatus::Completed
            } else {
                ResponseStatus::Continue
            },
            reply: Some(outcome.reply),
            session_state: session.stage,
            turn_number: session.turn_number,
            scam_detected: session.is_scam,
            confidence_score: session.scam_score,
        })
    }

    async fn persist(&self, session: &Session) {
        if let Err(e) = self.store.save(session).await {
            warn!(session_id = %session.session_id, error = %e, "session save failed, reply still returned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cipher_callback::CallbackSchema;
    use cipher_events::InMemoryEventBus;
    use cipher_llm::{ChatMessage, Generator};
    use cipher_persona::PersonaEngine;
    use cipher_session::InMemorySessionStore;
    use std::time::Duration;

    struct ScriptedGenerator;

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, _messages: &[ChatMessage], _temperature: f32) -> Result<String> {
            Ok(serde_json::json!({
                "internal_reasoning": {
                    "situation_analysis": "They are pressuring for payment information urgently.",
                    "strategy_selection": "Ask a naive clarifying question to stall for time.",
                    "persona_alignment_check": "Consistent with an elderly, low-tech persona."
                },
                "final_response": "Oh my, which app do I open for that?"
            })
            .to_string())
        }
    }

    fn persona_dir() -> std::path::PathBuf {
        std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../persona/personas")
    }

    fn make_controller(max_turns: u64) -> EngagementController {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let orchestrator = Orchestrator::new(
            Arc::new(PersonaEngine::new(persona_dir())),
            Arc::new(ScriptedGenerator),
            3,
            Duration::from_secs(8),
            10,
        );
        let callback = CallbackDispatcher::new(None, 3, 0.01, Duration::from_secs(1), CallbackSchema::Cipher);
        EngagementController::new(
            store,
            bus,
            ScamDetectorEngine::default(),
            orchestrator,
            callback,
            EngineSettings {
                max_turns,
                default_persona_id: "margaret_72".to_string(),
                feature_engagement_enabled: true,
            },
        )
    }

    fn msg(sender: &str, text: &str) -> IncomingMessage {
        IncomingMessage { sender: sender.to_string(), text: text.to_string(), timestamp: 0 }
    }

    #[tokio::test]
    async fn benign_message_resolves_to_safe() {
        let controller = make_controller(20);
        let outcome = controller
            .process_message("s1", msg("+919876543210", "Hey, how are you?"), &[])
            .await
            .unwrap();
        assert_eq!(outcome.session_state, SessionStage::Safe);
        assert!(!outcome.scam_detected);
        assert!(outcome.confidence_score <= 0.1);
    }

    #[tokio::test]
    async fn obvious_scam_engages_and_replies() {
        let controller = make_controller(20);
        let outcome = controller
            .process_message(
                "s2",
                msg(
                    "+919876543210",
                    "URGENT! Your account is blocked. Share OTP and pay to scammer@ybl immediately",
                ),
                &[],
            )
            .await
            .unwrap();
        assert!(outcome.scam_detected);
        assert!(outcome.confidence_score >= 0.5);
        assert_eq!(outcome.session_state, SessionStage::Engaging);
        assert!(!outcome.reply.unwrap().is_empty());
    }

    #[tokio::test]
    async fn max_turns_drives_completion_and_terminal_followups() {
        let controller = make_controller(3);
        let scam_text = "URGENT! Your account is blocked. Share OTP and pay to scammer@ybl immediately";

        let first = controller.process_message("s3", msg("+91999", scam_text), &[]).await.unwrap();
        assert_eq!(first.session_state, SessionStage::Engaging);

        let second = controller.process_message("s3", msg("+91999", "okay tell me more"), &[]).await.unwrap();
        assert_eq!(second.session_state, SessionStage::Engaging);

        let third = controller.process_message("s3", msg("+91999", "what next"), &[]).await.unwrap();
        assert_eq!(third.session_state, SessionStage::Completed);
        assert_eq!(third.status, ResponseStatus::Completed);

        let fourth = controller.process_message("s3", msg("+91999", "hello?"), &[]).await.unwrap();
        assert_eq!(fourth.session_state, SessionStage::Completed);
        assert_eq!(fourth.reply.as_deref(), Some("This session has concluded."));
    }

    #[tokio::test]
    async fn feature_flag_disables_without_touching_store() {
        let mut controller = make_controller(20);
        controller.settings.feature_engagement_enabled = false;
        let outcome = controller.process_message("s4", msg("+91999", "hi"), &[]).await.unwrap();
        assert_eq!(outcome.status, ResponseStatus::Disabled);
        assert!(outcome.reply.is_none());
    }

    #[tokio::test]
    async fn intelligence_extraction_merges_into_buffer_across_turns() {
        let controller = make_controller(20);
        let outcome = controller
            .process_message(
                "s5",
                msg(
                    "+91999",
                    "My a/c is 123456789012, otp was 4455, link https://bit.ly/x and pay to user@paytm",
                ),
                &[],
            )
            .await
            .unwrap();
        assert!(outcome.scam_detected);
    }
}
