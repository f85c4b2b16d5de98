//! Axum Handlers
//!
//! The voice platform posts every request envelope to a single endpoint; the
//! handler checks the addressed application id and hands the envelope to the
//! skill, which always produces a response.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use fastpass_core::envelope::{RequestEnvelope, ResponseEnvelope};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::state::AppState;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub enum ApiError {
    Forbidden(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Forbidden(message) => {
                (StatusCode::FORBIDDEN, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}

/// Rejects envelopes addressed to a different skill when an id is configured.
fn verify_application_id(
    expected: Option<&str>,
    envelope: &RequestEnvelope,
) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match envelope.application_id() {
        Some(actual) if actual == expected => Ok(()),
        actual => {
            warn!(expected, actual = ?actual, "Rejecting request for another application");
            Err(ApiError::Forbidden(
                "Request is not addressed to this skill".to_string(),
            ))
        }
    }
}

/// Answer one voice platform request.
pub async fn handle_skill_request(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<RequestEnvelope>,
) -> Result<Json<ResponseEnvelope>, ApiError> {
    verify_application_id(state.skill_id.as_deref(), &envelope)?;
    Ok(Json(state.skill.handle(envelope).await))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
