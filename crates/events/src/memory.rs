use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::{Event, EventBus, EventReceiver};

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

/// Fan-out bus for local development and tests. A slow or dropped
/// subscriber never blocks `publish` for the others — sends are best
/// effort per subscriber.
#[derive(Default)]
pub struct InMemoryEventBus {
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<Event>>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: Event) -> anyhow::Result<()> {
        debug!(event_type = %event.event_type, "publishing event");
        let mut subscribers = self.subscribers.lock().await;
        if let Some(senders) = subscribers.get_mut(&event.event_type) {
            senders.retain(|tx| match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(event_type = %event.event_type, "subscriber channel full, dropping event");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
        }
        Ok(())
    }

    async fn subscribe(&self, event_type: &str) -> anyhow::Result<EventReceiver> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.subscribers
            .lock()
            .await
            .entry(event_type.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
