//! Database schema management for the EcoMonitor backend.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `devices`, `sensor_readings` and `device_commands` tables.
/// Safe to call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Device registry. `device_id` is the manufacturer-assigned identifier
    // and is globally unique across all owners.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            id                  BIGSERIAL PRIMARY KEY,
            device_id           TEXT        NOT NULL,
            classification      TEXT        NOT NULL,
            name                TEXT        NOT NULL,
            owner_id            TEXT,
            sampling_interval   INTEGER     NOT NULL DEFAULT 15 CHECK (sampling_interval >= 1),
            min_limit           DOUBLE PRECISION NOT NULL,
            max_limit           DOUBLE PRECISION NOT NULL,
            telegram_user_id    TEXT,
            telegram_bot_token  TEXT,
            last_seen           TIMESTAMPTZ,
            created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT uq_devices_device_id UNIQUE (device_id)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Readings pushed by devices; rows are immutable once inserted.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_readings (
            id          BIGSERIAL PRIMARY KEY,
            device_id   BIGINT      NOT NULL REFERENCES devices (id) ON DELETE CASCADE,
            value       DOUBLE PRECISION NOT NULL,
            raw_value   INTEGER,
            voltage     DOUBLE PRECISION,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Per-device FIFO of operator commands. Delivery marks `executed` and
    // `executed_at` in the same statement that claims the row.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_commands (
            id            BIGSERIAL PRIMARY KEY,
            device_id     BIGINT      NOT NULL REFERENCES devices (id) ON DELETE CASCADE,
            command_type  TEXT        NOT NULL,
            payload       TEXT        NOT NULL DEFAULT '',
            executed      BOOLEAN     NOT NULL DEFAULT FALSE,
            created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            executed_at   TIMESTAMPTZ
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Basic indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_readings_device_created
            ON sensor_readings (device_id, created_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Supports the drain query's oldest-pending-first scan.
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_device_commands_pending
            ON device_commands (device_id, created_at, id)
            WHERE NOT executed;
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_devices_owner_id
            ON devices (owner_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
