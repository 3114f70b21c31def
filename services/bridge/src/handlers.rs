//! Axum Handlers for the bridge endpoint
//!
//! `POST /` hands text to the device process and answers at once; `OPTIONS /`
//! lets clients probe for a running bridge.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    models::{ErrorResponse, SpeakPayload, SpeakResponse, StatusResponse},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(error) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let error = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { error }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Pulls the text out of a request body, rejecting anything without a
/// non-blank string `text` field.
fn extract_text(body: &[u8]) -> Result<String, ApiError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| ApiError::BadRequest("Invalid JSON".to_string()))?;
    match value.get("text").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(ApiError::BadRequest("No text provided".to_string())),
    }
}

/// Make the robot say some text.
///
/// Returns once the text is queued; the device process runs in the background.
#[utoipa::path(
    post,
    path = "/",
    request_body = SpeakPayload,
    responses(
        (status = 200, description = "Text handed to the robot", body = SpeakResponse),
        (status = 400, description = "Body is not JSON or has no text", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn speak(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SpeakResponse>, ApiError> {
    let text = extract_text(&body).inspect_err(|_| warn!("Rejected speech request"))?;

    info!(
        robot = %state.config.robot_address,
        chars = text.chars().count(),
        "Forwarding speech"
    );
    state.forwarder.dispatch(&text).await?;

    Ok(Json(SpeakResponse { success: true }))
}

/// Probe for a running bridge.
#[utoipa::path(
    options,
    path = "/",
    responses(
        (status = 200, description = "Bridge is up", body = StatusResponse)
    )
)]
pub async fn preflight() -> Json<StatusResponse> {
    Json(StatusResponse::ok())
}
