//! HTTP delivery endpoint
//!
//! # Endpoints
//!
//! - `POST <url_prefix>/{identifier}` - run a delivered durable task
//!
//! The identifier only labels the request (and shows up in logs); the
//! payload's path decides what runs.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::dispatch::{DispatchError, DispatchHandler, DispatchStatus};

#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub status: &'static str,
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (code, message) = match &self {
            DispatchError::MalformedPayload(_) => ("MALFORMED_PAYLOAD", self.to_string()),
            DispatchError::MissingPath => ("MISSING_PATH", self.to_string()),
            DispatchError::InvalidPath(_) => ("INVALID_PATH", self.to_string()),
            DispatchError::TaskFailed { path, .. } => {
                // Task errors stay in the logs
                tracing::error!(error = %self, "Deferred task failed");
                ("TASK_FAILED", format!("Task '{}' failed", path))
            }
        };
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Handler: POST <url_prefix>/{identifier}
pub async fn deliver_handler(
    State(handler): State<Arc<DispatchHandler>>,
    Path(identifier): Path<String>,
    body: Bytes,
) -> Result<Json<DeliveryResponse>, DispatchError> {
    tracing::debug!(identifier = %identifier, body_len = body.len(), "Deferred delivery");

    let status = match handler.handle(&body).await? {
        DispatchStatus::Accepted => "accepted",
        DispatchStatus::PermanentFailure => "permanent_failure",
    };
    Ok(Json(DeliveryResponse { status }))
}

/// Build the delivery routes for inclusion in an application router
///
/// # Example
///
/// ```ignore
/// let app = Router::new()
///     .merge(delivery_routes(handler, &config.url_prefix));
/// ```
pub fn delivery_routes(handler: Arc<DispatchHandler>, url_prefix: &str) -> axum::Router {
    let route = format!("{}/{{identifier}}", url_prefix.trim_end_matches('/'));
    axum::Router::new()
        .route(&route, post(deliver_handler))
        .with_state(handler)
}
