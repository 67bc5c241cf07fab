//! Session aggregate and the `SessionStore` capability trait.
//!
//! A `Session` is the only state that survives across turns of a single
//! conversation. Everything else (detection signals, LLM output) is
//! transient and derived fresh each turn.

mod memory;
mod redis_store;

pub use memory::InMemorySessionStore;
pub use redis_store::RedisSessionStore;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-turn lifecycle. Transitions are enforced by the engagement controller,
/// not by this type — `Session` just carries the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStage {
    Idle,
    Detecting,
    Engaging,
    Safe,
    Completing,
    Completed,
}

impl SessionStage {
    /// True for the two terminal stages: no further state advances, no LLM
    /// call is made.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStage::Completed | SessionStage::Safe)
    }

    pub fn agent_active(self) -> bool {
        matches!(self, SessionStage::Engaging | SessionStage::Completing)
    }
}

impl Default for SessionStage {
    fn default() -> Self {
        SessionStage::Idle
    }
}

/// The five fixed categories of extracted intelligence. Deduplicated,
/// unordered sets — serialized as sorted lists for a deterministic
/// round-trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntelBuffer {
    #[serde(default)]
    pub bank_accounts: BTreeSet<String>,
    #[serde(default)]
    pub upi_ids: BTreeSet<String>,
    #[serde(default)]
    pub phishing_links: BTreeSet<String>,
    #[serde(default)]
    pub phone_numbers: BTreeSet<String>,
    #[serde(default)]
    pub suspicious_keywords: BTreeSet<String>,
}

impl IntelBuffer {
    /// Set-union merge, per category. Idempotent and commutative: merging
    /// the same extraction twice, or merging two buffers in either order,
    /// yields the same result.
    pub fn merge(&mut self, other: &IntelBuffer) {
        self.bank_accounts.extend(other.bank_accounts.iter().cloned());
        self.upi_ids.extend(other.upi_ids.iter().cloned());
        self.phishing_links.extend(other.phishing_links.iter().cloned());
        self.phone_numbers.extend(other.phone_numbers.iter().cloned());
        self.suspicious_keywords
            .extend(other.suspicious_keywords.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.bank_accounts.is_empty()
            && self.upi_ids.is_empty()
            && self.phishing_links.is_empty()
            && self.phone_numbers.is_empty()
            && self.suspicious_keywords.is_empty()
    }

    /// Categories with no entries yet — fed to the prompt builder as
    /// `missing_entities`.
    pub fn missing_categories(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.bank_accounts.is_empty() {
            missing.push("bankAccounts");
        }
        if self.upi_ids.is_empty() {
            missing.push("upiIds");
        }
        if self.phishing_links.is_empty() {
            missing.push("phishingLinks");
        }
        if self.phone_numbers.is_empty() {
            missing.push("phoneNumbers");
        }
        if self.suspicious_keywords.is_empty() {
            missing.push("suspiciousKeywords");
        }
        missing
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(default)]
    pub turn_number: u64,
    #[serde(default)]
    pub stage: SessionStage,
    #[serde(default)]
    pub scam_score: f64,
    #[serde(default)]
    pub is_scam: bool,
    #[serde(default)]
    pub agent_active: bool,
    #[serde(default = "default_persona_id")]
    pub persona_id: String,
    #[serde(default)]
    pub intel_buffer: IntelBuffer,
    #[serde(default)]
    pub callback_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_persona_id() -> String {
    String::new()
}

impl Session {
    pub fn new(session_id: impl Into<String>, persona_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            turn_number: 0,
            stage: SessionStage::Idle,
            scam_score: 0.0,
            is_scam: false,
            agent_active: false,
            persona_id: persona_id.into(),
            intel_buffer: IntelBuffer::default(),
            callback_sent: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance to `next`, keeping `agent_active` consistent with the new
    /// stage. Callers are responsible for only passing transitions that
    /// the state table allows.
    pub fn advance(&mut self, next: SessionStage) {
        self.stage = next;
        self.agent_active = next.agent_active();
        self.touch();
    }

    /// `scam_score` is monotone non-decreasing; `is_scam` latches true once
    /// the threshold is crossed and never reverts.
    pub fn raise_score(&mut self, confidence: f64) {
        if confidence > self.scam_score {
            self.scam_score = confidence;
        }
        if self.scam_score >= 0.50 {
            self.is_scam = true;
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> anyhow::Result<Option<Session>>;
    async fn save(&self, session: &Session) -> anyhow::Result<()>;
    async fn exists(&self, session_id: &str) -> anyhow::Result<bool>;
    async fn delete(&self, session_id: &str) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_monotone_and_latches() {
        let mut session = Session::new("s1", "margaret_72");
        session.raise_score(0.3);
        assert!(!session.is_scam);
        session.raise_score(0.2);
        assert_eq!(session.scam_score, 0.3, "score must not decrease");
        session.raise_score(0.5);
        assert!(session.is_scam);
        session.raise_score(0.1);
        assert!(session.is_scam, "is_scam must not un-latch");
        assert_eq!(session.scam_score, 0.5);
    }

    #[test]
    fn intel_buffer_merge_is_idempotent_and_commutative() {
        let mut a = IntelBuffer::default();
        a.upi_ids.insert("scammer@ybl".to_string());
        let mut b = IntelBuffer::default();
        b.upi_ids.insert("scammer@ybl".to_string());
        b.phone_numbers.insert("+919999999999".to_string());

        let mut merged_ab = a.clone();
        merged_ab.merge(&b);
        let mut merged_ba = b.clone();
        merged_ba.merge(&a);
        assert_eq!(merged_ab, merged_ba);

        let mut twice = merged_ab.clone();
        twice.merge(&b);
        assert_eq!(twice, merged_ab);
    }

    #[test]
    fn session_json_round_trip_preserves_fields() {
        let mut session = Session::new("abc123", "rajesh_45");
        session.turn_number = 4;
        session.advance(SessionStage::Engaging);
        session.raise_score(0.72);
        session.intel_buffer.upi_ids.insert("fraud@paytm".to_string());

        let json = serde_json::to_string(&session).unwrap();
        let restored: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.session_id, session.session_id);
        assert_eq!(restored.turn_number, session.turn_number);
        assert_eq!(restored.stage, session.stage);
        assert_eq!(restored.scam_score, session.scam_score);
        assert_eq!(restored.intel_buffer, session.intel_buffer);
    }
}
