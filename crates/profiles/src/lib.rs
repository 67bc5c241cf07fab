//! Durable per-sender profiles built from the event bus. The aggregator
//! never touches `Session` directly — it only ever sees what crosses
//! `scam.detected` and `engagement.turn`, exactly like any other
//! subscriber would.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cipher_events::{Event, EventBus, ENGAGEMENT_TURN, SCAM_DETECTED};
use cipher_session::IntelBuffer;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// The sender alias the controller uses for its own outbound turns;
/// excluded from profiling as its own spec.md §4.6 requires.
pub const AGENT_SENDER: &str = "agent";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderProfile {
    pub sender: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub total_engagements: u64,
    #[serde(default)]
    pub total_turns: u64,
    #[serde(default)]
    pub risk_score: f64,
    #[serde(default)]
    pub scam_categories: BTreeSet<String>,
    #[serde(default)]
    pub extracted_entities: IntelBuffer,
    #[serde(default)]
    pub tactics_observed: BTreeSet<String>,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "active".to_string()
}

impl SenderProfile {
    fn new(sender: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            sender: sender.into(),
            first_seen: now,
            last_seen: now,
            total_engagements: 0,
            total_turns: 0,
            risk_score: 0.0,
            scam_categories: BTreeSet::new(),
            extracted_entities: IntelBuffer::default(),
            tactics_observed: BTreeSet::new(),
            status: default_status(),
        }
    }

    fn entity_count(&self) -> usize {
        self.extracted_entities.bank_accounts.len()
            + self.extracted_entities.upi_ids.len()
            + self.extracted_entities.phishing_links.len()
            + self.extracted_entities.phone_numbers.len()
            + self.extracted_entities.suspicious_keywords.len()
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, sender: &str) -> anyhow::Result<Option<SenderProfile>>;
    async fn save(&self, profile: &SenderProfile) -> anyhow::Result<()>;
    async fn list(&self, limit: usize, status: Option<&str>) -> anyhow::Result<Vec<SenderProfile>>;
}

/// Lock-protected hash map store; production deployments would swap in a
/// Postgres/SQLite-backed implementation behind the same trait.
#[derive(Default)]
pub struct InMemoryProfileStore {
    inner: Mutex<HashMap<String, SenderProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, sender: &str) -> anyhow::Result<Option<SenderProfile>> {
        Ok(self.inner.lock().await.get(sender).cloned())
    }

    async fn save(&self, profile: &SenderProfile) -> anyhow::Result<()> {
        self.inner.lock().await.insert(profile.sender.clone(), profile.clone());
        Ok(())
    }

    async fn list(&self, limit: usize, status: Option<&str>) -> anyhow::Result<Vec<SenderProfile>> {
        let store = self.inner.lock().await;
        let mut profiles: Vec<SenderProfile> = store
            .values()
            .filter(|p| status.map(|s| p.status == s).unwrap_or(true))
            .cloned()
            .collect();
        profiles.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        profiles.truncate(limit);
        Ok(profiles)
    }
}

/// Event-bus consumer that keeps `SenderProfile`s current. Construct once,
/// then `spawn` against a bus to start its background consumer loops.
pub struct ProfileAggregator {
    store: Arc<dyn ProfileStore>,
    new_engagement_gap_seconds: i64,
}

impl ProfileAggregator {
    pub fn new(store: Arc<dyn ProfileStore>, new_engagement_gap_seconds: i64) -> Self {
        Self { store, new_engagement_gap_seconds }
    }

    /// Subscribes to `scam.detected` and `engagement.turn` and spawns a
    /// background task per topic. Each task isolates per-event failures:
    /// a handler error is logged and the consumer keeps running.
    pub async fn spawn(self: Arc<Self>, bus: &dyn EventBus) -> anyhow::Result<()> {
        {
            let aggregator = self.clone();
            let mut rx = bus.subscribe(SCAM_DETECTED).await?;
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    if let Err(e) = aggregator.handle_scam_detected(event).await {
                        error!(error = %e, "profile update for scam.detected failed, rolled back");
                    }
                }
            });
        }
        {
            let aggregator = self.clone();
            let mut rx = bus.subscribe(ENGAGEMENT_TURN).await?;
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    if let Err(e) = aggregator.handle_engagement_turn(event).await {
                        error!(error = %e, "profile update for engagement.turn failed, rolled back");
                    }
                }
            });
        }
        Ok(())
    }

    pub async fn handle_scam_detected(&self, event: Event) -> anyhow::Result<()> {
        let sender = match event.payload.get("sender").and_then(|v| v.as_str()) {
            Some(s) if s != AGENT_SENDER => s.to_string(),
            _ => return Ok(()),
        };
        let confidence = event.payload.get("confidence_score").and_then(|v| v.as_f64()).unwrap_or(0.0);

        let now = Utc::now();
        let mut profile = match self.store.get(&sender).await? {
            Some(mut existing) => {
                let gap = (now - existing.last_seen).num_seconds();
                if gap > self.new_engagement_gap_seconds {
                    existing.total_engagements += 1;
                }
                existing.last_seen = now;
                existing.risk_score = existing.risk_score.max(confidence);
                existing
            }
            None => {
                let mut fresh = SenderProfile::new(&sender, now);
                fresh.total_engagements = 1;
                fresh.risk_score = confidence;
                fresh
            }
        };
        profile.last_seen = now;
        self.store.save(&profile).await?;
        info!(sender = %sender, risk_score = profile.risk_score, "profile updated on scam.detected");
        Ok(())
    }

    pub async fn handle_engagement_turn(&self, event: Event) -> anyhow::Result<()> {
        let sender = match event.payload.get("sender").and_then(|v| v.as_str()) {
            Some(s) if s != AGENT_SENDER => s.to_string(),
            _ => return Ok(()),
        };

        let now = Utc::now();
        let mut profile = match self.store.get(&sender).await? {
            Some(existing) => existing,
            None => {
                warn!(sender = %sender, "engagement.turn for a sender with no prior scam.detected profile");
                SenderProfile::new(&sender, now)
            }
        };
        profile.total_turns += 1;
        profile.last_seen = now;

        if let Some(snapshot) = event.payload.get("intel_buffer_snapshot") {
            if let Ok(extracted) = serde_json::from_value::<IntelBuffer>(snapshot.clone()) {
                profile.extracted_entities.merge(&extracted);
            }
        }

        let entity_score = profile.entity_count() as f64 * 0.05;
        let turn_score = profile.total_turns as f64 * 0.01;
        profile.risk_score = (entity_score + turn_score).clamp(0.0, 1.0);

        self.store.save(&profile).await?;
        info!(sender = %sender, total_turns = profile.total_turns, risk_score = profile.risk_score, "profile updated on engagement.turn");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipher_events::InMemoryEventBus;

    fn scam_event(sender: &str, confidence: f64) -> Event {
        Event::new(SCAM_DETECTED, serde_json::json!({"sender": sender, "confidence_score": confidence}))
    }

    fn turn_event(sender: &str, intel: serde_json::Value) -> Event {
        Event::new(
            ENGAGEMENT_TURN,
            serde_json::json!({"sender": sender, "turn_number": 1, "intel_buffer_snapshot": intel}),
        )
    }

    #[tokio::test]
    async fn scam_detected_creates_a_profile() {
        let store = Arc::new(InMemoryProfileStore::new());
        let aggregator = ProfileAggregator::new(store.clone(), 3600);
        aggregator.handle_scam_detected(scam_event("+919876543210", 0.9)).await.unwrap();

        let profile = store.get("+919876543210").await.unwrap().unwrap();
        assert_eq!(profile.total_engagements, 1);
        assert_eq!(profile.risk_score, 0.9);
    }

    #[tokio::test]
    async fn agent_sender_is_excluded() {
        let store = Arc::new(InMemoryProfileStore::new());
        let aggregator = ProfileAggregator::new(store.clone(), 3600);
        aggregator.handle_scam_detected(scam_event(AGENT_SENDER, 0.9)).await.unwrap();
        assert!(store.get(AGENT_SENDER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn engagement_turn_merges_entities_and_recomputes_risk() {
        let store = Arc::new(InMemoryProfileStore::new());
        let aggregator = ProfileAggregator::new(store.clone(), 3600);
        aggregator.handle_scam_detected(scam_event("scammer@ybl", 0.6)).await.unwrap();

        let mut intel = IntelBuffer::default();
        intel.upi_ids.insert("scammer@ybl".to_string());
        intel.suspicious_keywords.insert("otp".to_string());
        aggregator
            .handle_engagement_turn(turn_event("scammer@ybl", serde_json::to_value(&intel).unwrap()))
            .await
            .unwrap();

        let profile = store.get("scammer@ybl").await.unwrap().unwrap();
        assert_eq!(profile.total_turns, 1);
        assert_eq!(profile.extracted_entities.upi_ids.len(), 1);
        assert!((profile.risk_score - 0.11).abs() < 1e-9);
    }

    #[tokio::test]
    async fn spawn_wires_up_live_subscriptions() {
        let bus = InMemoryEventBus::new();
        let store = Arc::new(InMemoryProfileStore::new());
        let aggregator = Arc::new(ProfileAggregator::new(store.clone(), 3600));
        aggregator.clone().spawn(&bus).await.unwrap();

        bus.publish(scam_event("+919999999999", 0.75)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let profile = store.get("+919999999999").await.unwrap().unwrap();
        assert_eq!(profile.risk_score, 0.75);
    }
}
