//! Request-boundary error taxonomy.
//!
//! Every handler returns `Result<_, ApiError>`; the `IntoResponse` impl is
//! the single place where failures become HTTP status codes and JSON bodies.
//! Internal detail is logged server-side and never echoed to the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

// ---

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request input: blank identifiers, bad custom date bounds.
    /// Rejected before any fetch happens.
    #[error("{0}")]
    Validation(String),

    /// An expected empty business outcome, not a crash: nothing stored for
    /// the identifiers, or nothing inside the resolved window.
    #[error("{0}")]
    NotFound(String),

    /// Store/query failure.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    /// Anything else unexpected.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let (status, message) = match self {
            ApiError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Database(err) => {
                tracing::error!("database error while serving request: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            ApiError::Internal(err) => {
                tracing::error!("internal error while serving request: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        // ---
        let response =
            ApiError::Validation("BuildingId and FloorPlanId are required".to_string())
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_maps_to_404() {
        // ---
        let response = ApiError::NotFound("No sensor readings found".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_maps_to_500_with_generic_body() {
        // ---
        let response = ApiError::Internal(anyhow::anyhow!("connection reset")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
