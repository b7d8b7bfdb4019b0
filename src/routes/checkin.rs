//! Device check-in endpoint: `POST /sensor-readings`.
//!
//! One check-in is one HTTP exchange in which a device reports a reading
//! and/or receives a pending command. The handler walks a fixed sequence of
//! contracts:
//!
//! 1. `device_id` must be present and non-empty (400 otherwise).
//! 2. The device must already be registered — unknown devices are rejected
//!    with 404 and are never auto-created.
//! 3. Liveness is touched exactly once.
//! 4. The oldest pending command, if any, is atomically drained and returned
//!    as the response; no reading is recorded on a command delivery.
//! 5. Otherwise the reading is validated and persisted; a missing or
//!    non-finite `value` is a 400, never a silent success.
//! 6. Threshold alerts are evaluated and handed to the notification sink
//!    fire-and-forget; sink failures never affect the response.
//!
//! The whole sequence runs under a request-scoped deadline so a slow
//! database surfaces as a clear error to the device instead of a hang.

use std::time::Duration;

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, response::Response, routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info, warn};

use super::AppState;
use crate::error::{AppError, AppResult};
use crate::models::CommandType;
use crate::notify::Notifier;
use crate::{alerts, queue, registry};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/sensor-readings", post(handler))
}

/// Check-in request body. `raw_value` and `voltage` are deprecated
/// diagnostics older firmware still sends.
#[derive(Debug, Deserialize)]
struct CheckinRequest {
    // ---
    device_id: Option<String>,
    value: Option<f64>,
    raw_value: Option<i32>,
    voltage: Option<f64>,
}

/// Response when a pending command is delivered instead of a reading accept.
#[derive(Debug, Serialize)]
struct CommandDelivery {
    command: CommandType,
    payload: String,
}

/// Response when a reading was persisted.
#[derive(Debug, Serialize)]
struct ReadingAccepted {
    status: &'static str,
    reading_id: i64,
}

async fn handler(
    State((pool, config, notifier)): State<AppState>,
    Json(body): Json<CheckinRequest>,
) -> AppResult<Response> {
    // ---
    let deadline = Duration::from_secs(config.checkin_timeout_secs as u64);

    match tokio::time::timeout(deadline, process_checkin(&pool, &notifier, body)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("POST /sensor-readings - deadline exceeded");
            Err(AppError::Internal("Check-in deadline exceeded".to_string()))
        }
    }
}

async fn process_checkin(
    pool: &PgPool,
    notifier: &Notifier,
    body: CheckinRequest,
) -> AppResult<Response> {
    // ---
    // Step 1: validate identity
    let device_id = body
        .device_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("device_id is required".to_string()))?;

    info!("POST /sensor-readings - check-in from {}", device_id);

    // Step 2: registration gate. Telemetry from unknown devices is rejected;
    // registration happens through the operator flow only.
    let device = registry::find_by_device_id(pool, device_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(
                "Device not registered. Please register this device on the website first"
                    .to_string(),
            )
        })?;

    // Step 3: liveness
    registry::touch_liveness(pool, &device).await?;

    // Step 4: drain one pending command, if any
    if let Some(command) = queue::drain_next_pending(pool, &device).await? {
        info!(
            "POST /sensor-readings - delivering command {} (id {}) to {}",
            command.command_type.as_str(),
            command.id,
            device.device_id
        );
        return Ok(Json(CommandDelivery {
            command: command.command_type,
            payload: command.payload,
        })
        .into_response());
    }

    // Step 5: accept the reading
    let value = body
        .value
        .filter(|v| v.is_finite())
        .ok_or_else(|| AppError::Validation("value must be a finite number".to_string()))?;

    let reading = registry::insert_reading(pool, &device, value, body.raw_value, body.voltage)
        .await?;

    debug!(
        "POST /sensor-readings - stored reading {} for {}",
        reading.id, device.device_id
    );

    // Step 6: evaluate thresholds; delivery is fire-and-forget
    if let Some(alert) = alerts::evaluate(&device, value) {
        info!(
            "POST /sensor-readings - threshold alert for {} (value {})",
            device.device_id, value
        );
        notifier.dispatch(&device, &alert);
    }

    // Step 7: acknowledge with the persisted reading's id
    Ok((
        StatusCode::OK,
        Json(ReadingAccepted {
            status: "success",
            reading_id: reading.id,
        }),
    )
        .into_response())
}
