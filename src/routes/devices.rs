//! Operator-facing device management: registration, listing, detail,
//! readings history and per-device settings.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::commands::find_owned_or_404;
use super::{AppState, OperatorId};
use crate::error::{AppError, AppResult};
use crate::models::{Device, SensorReading};
use crate::registry::{self, SettingsUpdate};

/// Reading history responses are capped regardless of the requested limit.
const MAX_READINGS_LIMIT: i64 = 100;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/devices", post(register_device).get(list_devices))
        .route("/devices/{device_id}", get(device_detail).delete(unregister_device))
        .route(
            "/devices/{device_id}/readings",
            get(readings_history).delete(clear_readings),
        )
        .route("/devices/{device_id}/settings", patch(update_settings))
}

/// A device as returned to operators: all stored fields plus the derived
/// online flag, computed at response time.
#[derive(Debug, Serialize)]
struct DeviceView {
    // ---
    #[serde(flatten)]
    device: Device,
    is_online: bool,
}

impl From<Device> for DeviceView {
    fn from(device: Device) -> Self {
        let is_online = device.is_online();
        DeviceView { device, is_online }
    }
}

#[derive(Debug, Deserialize)]
struct RegisterDeviceRequest {
    // ---
    device_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Handle `POST /devices`.
///
/// Registers a device to the calling operator. Fails with 409 if the
/// `device_id` already exists under any owner; the existing registration is
/// untouched.
async fn register_device(
    State((pool, _config, _notifier)): State<AppState>,
    OperatorId(operator): OperatorId,
    Json(body): Json<RegisterDeviceRequest>,
) -> AppResult<impl IntoResponse> {
    // ---
    let device_id = body
        .device_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("device_id is required".to_string()))?;

    let device = registry::register(&pool, &operator, device_id, body.name.as_deref()).await?;

    info!(
        "POST /devices - registered {} ({}) for {}",
        device.device_id,
        device.classification.as_str(),
        operator
    );

    Ok((StatusCode::CREATED, Json(DeviceView::from(device))))
}

/// Handle `GET /devices` - the caller's devices, most recent first.
async fn list_devices(
    State((pool, _config, _notifier)): State<AppState>,
    OperatorId(operator): OperatorId,
) -> AppResult<Json<Vec<DeviceView>>> {
    // ---
    let devices = registry::list_for_owner(&pool, &operator).await?;
    Ok(Json(devices.into_iter().map(DeviceView::from).collect()))
}

/// Handle `GET /devices/{device_id}` - detail with latest reading and count.
async fn device_detail(
    State((pool, _config, _notifier)): State<AppState>,
    OperatorId(operator): OperatorId,
    Path(device_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    // ---
    let device = find_owned_or_404(&pool, &device_id, &operator).await?;
    let (latest_reading, reading_count) = registry::reading_stats(&pool, &device).await?;

    Ok(Json(json!({
        "device": DeviceView::from(device),
        "latest_reading": latest_reading,
        "reading_count": reading_count,
    })))
}

/// Handle `DELETE /devices/{device_id}` - unregister; readings and commands
/// cascade.
async fn unregister_device(
    State((pool, _config, _notifier)): State<AppState>,
    OperatorId(operator): OperatorId,
    Path(device_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    // ---
    let device = find_owned_or_404(&pool, &device_id, &operator).await?;
    registry::unregister(&pool, &device).await?;

    info!("DELETE /devices/{} - unregistered", device.device_id);
    Ok(Json(json!({ "status": "unregistered", "device": device.device_id })))
}

#[derive(Debug, Deserialize)]
struct ReadingsQuery {
    limit: Option<i64>,
}

/// Handle `GET /devices/{device_id}/readings` - most recent first.
async fn readings_history(
    State((pool, _config, _notifier)): State<AppState>,
    OperatorId(operator): OperatorId,
    Path(device_id): Path<String>,
    Query(query): Query<ReadingsQuery>,
) -> AppResult<Json<Vec<SensorReading>>> {
    // ---
    let device = find_owned_or_404(&pool, &device_id, &operator).await?;
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_READINGS_LIMIT);

    let readings = registry::recent_readings(&pool, &device, limit).await?;
    Ok(Json(readings))
}

/// Handle `DELETE /devices/{device_id}/readings` - clear all readings.
async fn clear_readings(
    State((pool, _config, _notifier)): State<AppState>,
    OperatorId(operator): OperatorId,
    Path(device_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    // ---
    let device = find_owned_or_404(&pool, &device_id, &operator).await?;
    let cleared = registry::clear_readings(&pool, &device).await?;

    info!(
        "DELETE /devices/{}/readings - cleared {} readings",
        device.device_id, cleared
    );
    Ok(Json(json!({ "status": "cleared", "readings": cleared })))
}

/// Handle `PATCH /devices/{device_id}/settings`.
///
/// Partial update; each supplied field is validated and applied on its own.
/// Rejected fields come back as `warnings` while the rest still commit.
async fn update_settings(
    State((pool, _config, _notifier)): State<AppState>,
    OperatorId(operator): OperatorId,
    Path(device_id): Path<String>,
    Json(update): Json<SettingsUpdate>,
) -> AppResult<impl IntoResponse> {
    // ---
    let device = find_owned_or_404(&pool, &device_id, &operator).await?;
    let (device, warnings) = registry::update_settings(&pool, &device, update).await?;

    Ok(Json(json!({
        "status": "updated",
        "device": DeviceView::from(device),
        "warnings": warnings,
    })))
}
