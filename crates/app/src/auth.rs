//! Bearer-token auth middleware (spec.md §1 "authentication header check").
//!
//! An empty `CIPHER_API_KEY` disables the check entirely (dev mode); this
//! mirrors the teacher's `require_api_token` in
//! `crates/gateway/src/api/auth.rs`, minus the SHA-256/constant-time
//! comparison — a plain string compare is a deliberate simplification for
//! this system, recorded in DESIGN.md.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::state::AppState;

pub async fn require_api_key(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if state.api_key.is_empty() {
        return next.run(req).await;
    }

    let provided = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided != Some(state.api_key.as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "invalid or missing API key" })),
        )
            .into_response();
    }

    next.run(req).await
}
