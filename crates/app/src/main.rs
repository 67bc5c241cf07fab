mod auth;
mod routes;
mod state;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use cipher_callback::{CallbackDispatcher, CallbackSchema as CipherCallbackSchema};
use cipher_config::{AppConfig, CallbackSchema as ConfigCallbackSchema};
use cipher_detection::ScamDetectorEngine;
use cipher_detection::StubSemanticClassifier;
use cipher_engine::{EngagementController, EngineSettings};
use cipher_events::{EventBus, InMemoryEventBus, RedisStreamEventBus};
use cipher_llm::{Generator, OllamaGenerator, OpenRouterGenerator};
use cipher_orchestrator::Orchestrator;
use cipher_persona::PersonaEngine;
use cipher_profiles::{InMemoryProfileStore, ProfileAggregator, ProfileStore};
use cipher_session::{InMemorySessionStore, RedisSessionStore, SessionStore};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level)))
        .init();

    let session_store: Arc<dyn SessionStore> = match config.session.redis_url.as_deref() {
        Some(url) => Arc::new(RedisSessionStore::new(
            url,
            config.session.redis_key_prefix.clone(),
            config.session.redis_session_ttl_seconds,
        )?),
        None => Arc::new(InMemorySessionStore::new()),
    };

    let event_bus: Arc<dyn EventBus> = match config.events.redis_url.as_deref() {
        Some(url) => Arc::new(RedisStreamEventBus::new(url, config.events.stream_maxlen)?),
        None => Arc::new(InMemoryEventBus::new()),
    };

    let detector = ScamDetectorEngine::new(Box::new(StubSemanticClassifier), config.detection.alpha);

    let persona_engine = Arc::new(PersonaEngine::new(&config.server.persona_dir));

    let generator: Arc<dyn Generator> = if config.llm.provider.eq_ignore_ascii_case("openrouter") {
        Arc::new(OpenRouterGenerator::new(
            config.llm.openrouter_api_key.clone(),
            config.llm.openrouter_model.clone(),
            Duration::from_secs(config.llm.request_timeout_seconds),
        ))
    } else {
        Arc::new(OllamaGenerator::new(
            config.llm.ollama_base_url.clone(),
            config.llm.ollama_model.clone(),
            Duration::from_secs(config.llm.request_timeout_seconds),
        ))
    };

    let orchestrator = Orchestrator::new(
        persona_engine,
        generator,
        config.orchestration.max_retries,
        Duration::from_secs(config.llm.generation_timeout_seconds),
        config.orchestration.max_turns_retained,
    );

    let profile_store: Arc<dyn ProfileStore> = Arc::new(InMemoryProfileStore::new());
    let profile_aggregator = Arc::new(ProfileAggregator::new(
        profile_store.clone(),
        config.profile.new_engagement_gap_seconds,
    ));
    profile_aggregator.spawn(event_bus.as_ref()).await?;

    let callback_schema = match config.callback.schema {
        ConfigCallbackSchema::Cipher => CipherCallbackSchema::Cipher,
        ConfigCallbackSchema::Legacy => CipherCallbackSchema::Legacy,
    };
    let callback = CallbackDispatcher::new(
        config.callback.url.clone(),
        config.callback.max_retries,
        config.callback.base_backoff_seconds,
        Duration::from_secs(config.callback.request_timeout_seconds),
        callback_schema,
    );

    let controller = Arc::new(EngagementController::new(
        session_store,
        event_bus.clone(),
        detector,
        orchestrator,
        callback,
        EngineSettings {
            max_turns: config.session.max_session_messages as u64,
            default_persona_id: config.agent.default_persona.clone(),
            feature_engagement_enabled: config.features.engagement_enabled,
        },
    ));

    let state = AppState {
        controller,
        profile_store,
        event_bus,
        api_key: Arc::new(config.auth.api_key.clone()),
    };

    if state.api_key.is_empty() {
        tracing::warn!("CIPHER_API_KEY unset — running without request authentication");
    }

    let protected = Router::new()
        .route("/api/v1/engage", post(routes::engage))
        .route("/api/v1/profile/:sender", get(routes::get_profile))
        .route("/api/v1/profiles", get(routes::list_profiles))
        .route("/ws", get(ws::ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    let public = Router::new().route("/healthz", get(routes::healthz));

    let app = Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!(addr = %config.server.bind_address, "cipher-app listening");
    axum::serve(listener, app).await?;

    Ok(())
}
