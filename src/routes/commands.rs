//! Operator command submission and history.
//!
//! Commands join the device's FIFO queue and are delivered one per check-in;
//! see `routes/checkin.rs` for the delivery side.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{AppState, OperatorId};
use crate::error::{AppError, AppResult};
use crate::models::{Command, CommandType, Device};
use crate::queue;
use crate::registry;

/// History responses are capped regardless of the requested limit.
const MAX_HISTORY_LIMIT: i64 = 100;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route(
        "/devices/{device_id}/commands",
        post(submit_command).get(command_history),
    )
}

#[derive(Debug, Deserialize)]
struct SubmitCommandRequest {
    // ---
    command_type: Option<String>,
    #[serde(default)]
    payload: Option<String>,
}

/// Handle `POST /devices/{device_id}/commands`.
///
/// Queues a command for the caller's device. The type must be one of the
/// closed command set; the payload is free-form and delivered back to the
/// device byte-for-byte.
async fn submit_command(
    State((pool, _config, _notifier)): State<AppState>,
    OperatorId(operator): OperatorId,
    Path(device_id): Path<String>,
    Json(body): Json<SubmitCommandRequest>,
) -> AppResult<impl IntoResponse> {
    // ---
    let command_type = body
        .command_type
        .as_deref()
        .ok_or_else(|| AppError::Validation("command_type is required".to_string()))?;
    let command_type = CommandType::parse(command_type).ok_or_else(|| {
        AppError::Validation(format!("unrecognized command type '{command_type}'"))
    })?;

    let device = find_owned_or_404(&pool, &device_id, &operator).await?;

    let command = queue::enqueue(
        &pool,
        &device,
        command_type,
        body.payload.as_deref().unwrap_or(""),
    )
    .await?;

    info!(
        "POST /devices/{}/commands - queued {} (id {})",
        device.device_id,
        command_type.as_str(),
        command.id
    );

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "command_queued",
            "command_id": command.id,
            "device": device.device_id,
        })),
    ))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

/// Handle `GET /devices/{device_id}/commands`.
///
/// Most-recent-first command history, delivered and pending alike.
async fn command_history(
    State((pool, _config, _notifier)): State<AppState>,
    OperatorId(operator): OperatorId,
    Path(device_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<Command>>> {
    // ---
    let device = find_owned_or_404(&pool, &device_id, &operator).await?;
    let limit = query.limit.unwrap_or(20).clamp(1, MAX_HISTORY_LIMIT);

    let commands = queue::history(&pool, &device, limit).await?;
    Ok(Json(commands))
}

/// Resolve a device the caller owns, or 404. Another owner's device and a
/// missing device are deliberately indistinguishable.
pub(super) async fn find_owned_or_404(
    pool: &sqlx::PgPool,
    device_id: &str,
    operator: &str,
) -> AppResult<Device> {
    // ---
    registry::find_owned(pool, device_id, operator)
        .await?
        .ok_or_else(|| AppError::NotFound("Device not found".to_string()))
}
