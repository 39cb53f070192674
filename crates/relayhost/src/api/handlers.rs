//! HTTP request handlers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::instrument;

use crate::session::{HostRequest, HostResult, TeardownRequest};

use super::error::ApiResult;
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// A result passed through with 200 when ok, 502 otherwise.
fn with_status(result: HostResult) -> (StatusCode, Json<HostResult>) {
    let status = if result.ok {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(result))
}

/// Host a game session. The body is optional.
#[instrument(skip(state, body))]
pub async fn host_session(
    State(state): State<AppState>,
    body: Option<Json<HostRequest>>,
) -> ApiResult<(StatusCode, Json<HostResult>)> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let result = state.sessions.host(&request).await?;
    Ok(with_status(result))
}

/// Tear down a game session.
#[instrument(skip(state, body))]
pub async fn teardown_session(
    State(state): State<AppState>,
    body: Option<Json<TeardownRequest>>,
) -> ApiResult<(StatusCode, Json<HostResult>)> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let result = state.sessions.teardown(request.host_id()).await?;
    Ok(with_status(result))
}
