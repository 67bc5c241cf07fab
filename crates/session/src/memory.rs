use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{Session, SessionStore};

/// Lock-protected hash map store. Good for tests and single-process
/// deployments; the mutex also doubles as the per-session serialization
/// point the engagement controller relies on.
#[derive(Default)]
pub struct InMemorySessionStore {
    inner: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> anyhow::Result<Option<Session>> {
        Ok(self.inner.lock().await.get(session_id).cloned())
    }

    async fn save(&self, session: &Session) -> anyhow::Result<()> {
        let mut session = session.clone();
        session.touch();
        self.inner
            .lock()
            .await
            .insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn exists(&self, session_id: &str) -> anyhow::Result<bool> {
        Ok(self.inner.lock().await.contains_key(session_id))
    }

    async fn delete(&self, session_id: &str) -> anyhow::Result<()> {
        self.inner.lock().await.remove(session_id);
        Ok(())
    }
}

/// Convenience alias used by composition roots that want a shared handle.
pub type SharedInMemorySessionStore = Arc<InMemorySessionStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionStage;

    #[tokio::test]
    async fn round_trips_through_the_store() {
        let store = InMemorySessionStore::new();
        assert!(!store.exists("s1").await.unwrap());

        let mut session = Session::new("s1", "margaret_72");
        session.advance(SessionStage::Detecting);
        store.save(&session).await.unwrap();

        assert!(store.exists("s1").await.unwrap());
        let fetched = store.get("s1").await.unwrap().unwrap();
        assert_eq!(fetched.stage, SessionStage::Detecting);

        store.delete("s1").await.unwrap();
        assert!(store.get("s1").await.unwrap().is_none());
    }
}
