//! HTTP surface (spec.md §6, SPEC_FULL.md §5.4).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cipher_engine::IncomingMessage;
use serde::Deserialize;
use tracing::{error, instrument};

use crate::state::AppState;

/// Wraps any failure the engine surfaces into spec.md §6's `error` status.
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "status": "error",
                "reply": null,
                "error": self.0.to_string(),
            })),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> Self {
        AppError(e.into())
    }
}

#[derive(Debug, Deserialize)]
pub struct EngageMetadata {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EngageRequest {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub message: IncomingMessage,
    #[serde(default, rename = "conversationHistory")]
    pub conversation_history: Vec<IncomingMessage>,
    #[serde(default)]
    #[allow(dead_code)]
    pub metadata: Option<EngageMetadata>,
}

#[instrument(skip(state, payload), fields(session_id = %payload.session_id))]
pub async fn engage(
    State(state): State<AppState>,
    Json(payload): Json<EngageRequest>,
) -> Result<Json<cipher_engine::ProcessOutcome>, AppError> {
    let outcome = state
        .controller
        .process_message(&payload.session_id, payload.message, &payload.conversation_history)
        .await?;
    Ok(Json(outcome))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(sender): Path<String>,
) -> Result<Response, AppError> {
    match state.profile_store.get(&sender).await? {
        Some(profile) => Ok(Json(profile).into_response()),
        None => Ok((StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "no such sender" }))).into_response()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListProfilesQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub status: Option<String>,
}

fn default_limit() -> usize {
    100
}

pub async fn list_profiles(
    State(state): State<AppState>,
    Query(query): Query<ListProfilesQuery>,
) -> Result<Json<Vec<cipher_profiles::SenderProfile>>, AppError> {
    let profiles = state.profile_store.list(query.limit, query.status.as_deref()).await?;
    Ok(Json(profiles))
}

pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
