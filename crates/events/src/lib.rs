//! Internal pub/sub bus. `scam.detected`, `engagement.turn`, and
//! `engagement.completed` are published here; the Profile Aggregator and any
//! external websocket bridge subscribe.

mod memory;
mod redis_stream;

pub use memory::InMemoryEventBus;
pub use redis_stream::RedisStreamEventBus;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub const SCAM_DETECTED: &str = "scam.detected";
pub const ENGAGEMENT_TURN: &str = "engagement.turn";
pub const ENGAGEMENT_COMPLETED: &str = "engagement.completed";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

/// Subscribers receive events over a bounded channel rather than a
/// registered callback — keeps each subscriber's processing independent and
/// lets a slow subscriber's backpressure stay local to it.
pub type EventReceiver = mpsc::Receiver<Event>;

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: Event) -> anyhow::Result<()>;
    async fn subscribe(&self, event_type: &str) -> anyhow::Result<EventReceiver>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_bus_delivers_to_subscriber() {
        let bus = InMemoryEventBus::new();
        let mut rx = bus.subscribe(SCAM_DETECTED).await.unwrap();
        bus.publish(Event::new(SCAM_DETECTED, serde_json::json!({"session_id": "s1"})))
            .await
            .unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, SCAM_DETECTED);
    }
}
