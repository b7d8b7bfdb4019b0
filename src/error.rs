//! Error taxonomy for the EcoMonitor backend.
//!
//! Every handler returns [`AppError`], which maps onto the terse
//! machine-readable `{"error": ...}` JSON bodies the guard devices expect:
//! - `Validation` → 400 (malformed/missing input, no side effects)
//! - `NotFound`   → 404 (unknown device or ownership mismatch)
//! - `Conflict`   → 409 (duplicate device registration)
//! - everything else → 500 with a sanitized message

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Application-level error type for HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed or missing required input.
    #[error("{0}")]
    Validation(String),

    /// Unknown device, or a device-scoped resource the caller does not own.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate device registration.
    #[error("{0}")]
    Conflict(String),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An unexpected internal failure with a human-readable message.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Database(err) => classify_sqlx_error(err),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

/// Classify a sqlx error into an HTTP status and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (PostgreSQL code 23505) map to 409; the
///   only unique constraint in this schema is `devices.device_id`.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, String) {
    match err {
        sqlx::Error::RowNotFound => (StatusCode::NOT_FOUND, "Resource not found".to_string()),
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => (
            StatusCode::CONFLICT,
            "Device with this id is already registered".to_string(),
        ),
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred".to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn validation_error_displays_message() {
        let err = AppError::Validation("device_id is required".to_string());
        assert_eq!(err.to_string(), "device_id is required");
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let (status, _) = classify_sqlx_error(&sqlx::Error::RowNotFound);
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
