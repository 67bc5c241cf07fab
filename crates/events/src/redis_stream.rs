use async_trait::async_trait;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::{Event, EventBus, EventReceiver};

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

/// Durable bus backed by Redis Streams. Each subscriber gets its own
/// consumer loop starting at `$` (new messages only, matching the
/// in-memory bus's "subscribe now, see future events" semantics).
pub struct RedisStreamEventBus {
    client: redis::Client,
    stream_maxlen: usize,
}

impl RedisStreamEventBus {
    pub fn new(redis_url: &str, stream_maxlen: usize) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            stream_maxlen,
        })
    }

    fn stream_key(event_type: &str) -> String {
        format!("cipher:events:{event_type}")
    }
}

#[async_trait]
impl EventBus for RedisStreamEventBus {
    async fn publish(&self, event: Event) -> anyhow::Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(&event.payload)?;
        let _: String = conn
            .xadd_maxlen(
                Self::stream_key(&event.event_type),
                redis::streams::StreamMaxlen::Approx(self.stream_maxlen),
                "*",
                &[("payload", payload)],
            )
            .await?;
        debug!(event_type = %event.event_type, "published event to redis stream");
        Ok(())
    }

    async fn subscribe(&self, event_type: &str) -> anyhow::Result<EventReceiver> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let client = self.client.clone();
        let event_type = event_type.to_string();

        tokio::spawn(async move {
            let stream_key = RedisStreamEventBus::stream_key(&event_type);
            let mut last_id = "$".to_string();
            loop {
                let conn = client.get_multiplexed_async_connection().await;
                let mut conn = match conn {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(error = %e, "redis connection failed, retrying");
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        continue;
                    }
                };

                let opts = StreamReadOptions::default().count(10).block(5000);
                let reply: Result<StreamReadReply, _> =
                    conn.xread_options(&[&stream_key], &[&last_id], &opts).await;

                match reply {
                    Ok(reply) => {
                        for stream in reply.keys {
                            for entry in stream.ids {
                                last_id = entry.id.clone();
                                let payload = entry
                                    .map
                                    .get("payload")
                                    .and_then(|v| redis::from_redis_value::<String>(v).ok())
                                    .and_then(|s| serde_json::from_str(&s).ok())
                                    .unwrap_or(serde_json::Value::Null);
                                let event = Event::new(event_type.clone(), payload);
                                if tx.send(event).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "redis stream read failed");
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(rx)
    }
}
