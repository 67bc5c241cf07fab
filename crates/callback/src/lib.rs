//! Completion Callback Invariant: bounded-retry outbound HTTP POST fired
//! exactly once per session, on the `engaging → completing` edge.

use std::time::Duration;

use chrono::Utc;
use cipher_session::Session;
use serde_json::json;
use tracing::{error, info, warn};

/// Selects the outbound wire schema. `Cipher` is spec.md §4.7's generic
/// shape; `Legacy` reproduces the GUVI evaluation-server schema the
/// original prototype hard-coded (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackSchema {
    Cipher,
    Legacy,
}

impl Default for CallbackSchema {
    fn default() -> Self {
        CallbackSchema::Cipher
    }
}

pub struct CallbackDispatcher {
    client: reqwest::Client,
    url: Option<String>,
    max_retries: usize,
    base_backoff: Duration,
    schema: CallbackSchema,
}

impl CallbackDispatcher {
    pub fn new(
        url: Option<String>,
        max_retries: usize,
        base_backoff_seconds: f64,
        request_timeout: Duration,
        schema: CallbackSchema,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url,
            max_retries,
            base_backoff: Duration::from_secs_f64(base_backoff_seconds.max(0.0)),
            schema,
        }
    }

    fn build_payload(&self, session: &Session) -> serde_json::Value {
        let buffer = &session.intel_buffer;
        match self.schema {
            CallbackSchema::Cipher => json!({
                "session_id": session.session_id,
                "scam_detected": session.is_scam,
                "confidence_score": session.scam_score,
                "intelligence": buffer,
                "turn_count": session.turn_number,
                "completed_at": Utc::now().to_rfc3339(),
            }),
            CallbackSchema::Legacy => json!({
                "sessionId": session.session_id,
                "scamDetected": session.is_scam,
                "totalMessagesExchanged": session.turn_number,
                "extractedIntelligence": {
                    "bankAccounts": buffer.bank_accounts,
                    "upiIds": buffer.upi_ids,
                    "phishingLinks": buffer.phishing_links,
                    "phoneNumbers": buffer.phone_numbers,
                    "suspiciousKeywords": buffer.suspicious_keywords,
                },
                "agentNotes": format!(
                    "{} turns exchanged, confidence {:.2}",
                    session.turn_number, session.scam_score
                ),
            }),
        }
    }

    /// Unconfigured URL or a session that never crossed the scam threshold
    /// short-circuits to a no-op returning `false` (spec.md §4.7). Callers
    /// must only invoke this on the `engaging → completing` edge — the
    /// idempotence guarantee is the caller's, not this type's.
    pub async fn dispatch(&self, session: &Session) -> bool {
        let Some(url) = self.url.as_deref() else {
            return false;
        };
        if !session.is_scam {
            return false;
        }

        let payload = self.build_payload(session);

        for attempt in 0..self.max_retries {
            match self.client.post(url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(session_id = %session.session_id, attempt = attempt + 1, "callback delivered");
                    return true;
                }
                Ok(response) => {
                    warn!(
                        session_id = %session.session_id,
                        attempt = attempt + 1,
                        status = %response.status(),
                        "callback received non-2xx response"
                    );
                }
                Err(e) => {
                    warn!(session_id = %session.session_id, attempt = attempt + 1, error = %e, "callback request failed");
                }
            }

            if attempt + 1 < self.max_retries {
                let delay = self.base_backoff * 2u32.pow(attempt as u32);
                tokio::time::sleep(delay).await;
            }
        }

        error!(session_id = %session.session_id, critical = true, "callback exhausted all retries");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipher_session::SessionStage;

    fn scam_session() -> Session {
        let mut session = Session::new("s1", "margaret_72");
        session.advance(SessionStage::Completing);
        session.raise_score(0.9);
        session.turn_number = 20;
        session
    }

    #[tokio::test]
    async fn unconfigured_url_short_circuits() {
        let dispatcher = CallbackDispatcher::new(None, 3, 0.01, Duration::from_millis(50), CallbackSchema::Cipher);
        assert!(!dispatcher.dispatch(&scam_session()).await);
    }

    #[tokio::test]
    async fn non_scam_session_short_circuits() {
        let dispatcher = CallbackDispatcher::new(
            Some("https://example.test/callback".to_string()),
            3,
            0.01,
            Duration::from_millis(50),
            CallbackSchema::Cipher,
        );
        let session = Session::new("s2", "margaret_72");
        assert!(!dispatcher.dispatch(&session).await);
    }

    #[tokio::test]
    async fn exhausts_retries_against_an_unreachable_host() {
        let dispatcher = CallbackDispatcher::new(
            Some("http://127.0.0.1:1".to_string()),
            2,
            0.001,
            Duration::from_millis(200),
            CallbackSchema::Cipher,
        );
        assert!(!dispatcher.dispatch(&scam_session()).await);
    }

    #[test]
    fn legacy_payload_matches_guvi_field_names() {
        let dispatcher = CallbackDispatcher::new(None, 1, 0.0, Duration::from_secs(1), CallbackSchema::Legacy);
        let payload = dispatcher.build_payload(&scam_session());
        assert!(payload.get("sessionId").is_some());
        assert!(payload.get("extractedIntelligence").is_some());
        assert!(payload.get("agentNotes").is_some());
    }

    #[test]
    fn cipher_payload_matches_spec_field_names() {
        let dispatcher = CallbackDispatcher::new(None, 1, 0.0, Duration::from_secs(1), CallbackSchema::Cipher);
        let payload = dispatcher.build_payload(&scam_session());
        assert!(payload.get("session_id").is_some());
        assert!(payload.get("confidence_score").is_some());
        assert!(payload.get("turn_count").is_some());
    }
}
