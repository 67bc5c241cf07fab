use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::error;

use crate::{Session, SessionStore};

/// Redis-backed store for production deployments. Sessions expire via
/// `SETEX`; a lost TTL simply means the next message starts a fresh
/// session, which is an acceptable failure mode for this workload.
pub struct RedisSessionStore {
    client: redis::Client,
    prefix: String,
    ttl_seconds: u64,
}

impl RedisSessionStore {
    pub fn new(redis_url: &str, prefix: impl Into<String>, ttl_seconds: u64) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            prefix: prefix.into(),
            ttl_seconds,
        })
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.prefix, session_id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    /// Returns "absent" cleanly both on a genuine cache miss and on a
    /// transport error — the latter is logged, never propagated, per
    /// spec.md §4.8.
    async fn get(&self, session_id: &str) -> anyhow::Result<Option<Session>> {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, session_id, "redis connection failed, treating session as absent");
                return Ok(None);
            }
        };
        let raw: Option<String> = match conn.get(self.key(session_id)).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, session_id, "redis get failed, treating session as absent");
                return Ok(None);
            }
        };
        match raw {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, session: &Session) -> anyhow::Result<()> {
        let mut session = session.clone();
        session.touch();
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(&session)?;
        let _: () = conn
            .set_ex(self.key(&session.session_id), payload, self.ttl_seconds)
            .await
            .map_err(|e| {
                error!(error = %e, session_id = %session.session_id, "redis save failed");
                e
            })?;
        Ok(())
    }

    async fn exists(&self, session_id: &str) -> anyhow::Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let exists: bool = conn.exists(self.key(session_id)).await?;
        Ok(exists)
    }

    async fn delete(&self, session_id: &str) -> anyhow::Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(self.key(session_id)).await?;
        Ok(())
    }
}
