//! Per-device FIFO queue of pending operator commands.
//!
//! A command is queued on creation and leaves the queue through
//! [`drain_next_pending`], which claims and marks it executed in one atomic
//! statement. Delivery to the device is fire-and-forget: from the server's
//! point of view delivered and executed are the same transition.

use sqlx::PgPool;

use crate::models::{Command, CommandType, Device};

// ---

/// Append a command to the tail of the device's pending queue.
pub async fn enqueue(
    pool: &PgPool,
    device: &Device,
    command_type: CommandType,
    payload: &str,
) -> Result<Command, sqlx::Error> {
    // ---
    sqlx::query_as::<_, Command>(
        r#"
        INSERT INTO device_commands (device_id, command_type, payload)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(device.id)
    .bind(command_type.as_str())
    .bind(payload)
    .fetch_one(pool)
    .await
}

/// Atomically claim the oldest queued command for a device, if any.
///
/// The claim, the `executed` flip and the `executed_at` stamp are a single
/// conditional UPDATE, so two concurrent check-ins from the same device can
/// never both receive one command. `FOR UPDATE SKIP LOCKED` makes a
/// concurrent claimant move on to the next-oldest row instead of blocking
/// on this one. FIFO order is `created_at` ascending, ties broken by
/// insertion order.
pub async fn drain_next_pending(
    pool: &PgPool,
    device: &Device,
) -> Result<Option<Command>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, Command>(
        r#"
        UPDATE device_commands
        SET executed = TRUE, executed_at = NOW()
        WHERE id = (
            SELECT id FROM device_commands
            WHERE device_id = $1 AND NOT executed
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING *
        "#,
    )
    .bind(device.id)
    .fetch_optional(pool)
    .await
}

/// Command history for a device, most recent first.
pub async fn history(
    pool: &PgPool,
    device: &Device,
    limit: i64,
) -> Result<Vec<Command>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, Command>(
        "SELECT * FROM device_commands WHERE device_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
    )
    .bind(device.id)
    .bind(limit)
    .fetch_all(pool)
    .await
}
