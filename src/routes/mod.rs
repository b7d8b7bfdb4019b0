use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::Router;
use sqlx::PgPool;

use crate::error::AppError;
use crate::notify::Notifier;
use crate::Config;

mod checkin;
mod commands;
mod devices;
mod health;

// ---

/// Shared state handed to every route: DB pool, config snapshot and the
/// outbound notifier.
pub type AppState = (PgPool, Config, Notifier);

pub fn router(pool: PgPool, config: Config) -> Router {
    // ---
    Router::new()
        .merge(checkin::router())
        .merge(commands::router())
        .merge(devices::router())
        .merge(health::router())
        .with_state((pool, config, Notifier::new()))
}

/// Caller's operator account id, taken from the `x-operator-id` header.
///
/// Authentication itself is out of scope; an upstream auth layer is trusted
/// to have set this header. Operator-facing endpoints reject requests
/// without it.
pub struct OperatorId(pub String);

impl<S> FromRequestParts<S> for OperatorId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // ---
        parts
            .headers
            .get("x-operator-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| OperatorId(v.to_string()))
            .ok_or_else(|| AppError::Validation("x-operator-id header is required".to_string()))
    }
}
