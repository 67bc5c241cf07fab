use std::sync::Arc;

use cipher_engine::EngagementController;
use cipher_events::EventBus;
use cipher_profiles::ProfileStore;

/// Shared, cloneable application state. Every field is already an `Arc`
/// (or cheap to clone), so `AppState` itself derives `Clone` the way axum's
/// `State` extractor expects.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<EngagementController>,
    pub profile_store: Arc<dyn ProfileStore>,
    pub event_bus: Arc<dyn EventBus>,
    pub api_key: Arc<String>,
}
