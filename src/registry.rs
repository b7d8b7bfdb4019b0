//! Device registry: identity, liveness and per-device settings.
//!
//! All device mutation goes through these functions; handlers never issue
//! ad hoc SQL. Duplicate registration is enforced by the unique constraint
//! on `devices.device_id`, not by a racy pre-check.

use serde::Deserialize;
use sqlx::PgPool;

use crate::models::{Classification, CommandType, Device, SensorReading};
use crate::queue;

// ---

/// Look up a device by its manufacturer-assigned identifier.
pub async fn find_by_device_id(
    pool: &PgPool,
    device_id: &str,
) -> Result<Option<Device>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE device_id = $1")
        .bind(device_id)
        .fetch_optional(pool)
        .await
}

/// Look up a device by identifier, restricted to the given owner.
///
/// Used by operator-facing endpoints; an unowned device or another owner's
/// device is indistinguishable from a missing one (the caller sees 404).
pub async fn find_owned(
    pool: &PgPool,
    device_id: &str,
    owner_id: &str,
) -> Result<Option<Device>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE device_id = $1 AND owner_id = $2")
        .bind(device_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await
}

/// Register a device to an operator account.
///
/// Classification and default threshold limits are derived from the
/// `device_id` prefix once, here, and stored. A duplicate `device_id` under
/// *any* owner fails with a unique violation, which the error layer maps
/// to a 409 conflict.
pub async fn register(
    pool: &PgPool,
    owner_id: &str,
    device_id: &str,
    name: Option<&str>,
) -> Result<Device, sqlx::Error> {
    // ---
    let classification = Classification::from_device_id(device_id);
    let (min_limit, max_limit) = classification.default_limits();

    let name = match name {
        Some(n) if !n.trim().is_empty() => n.trim().to_string(),
        _ => default_device_name(device_id),
    };

    sqlx::query_as::<_, Device>(
        r#"
        INSERT INTO devices (device_id, classification, name, owner_id, min_limit, max_limit)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(device_id)
    .bind(classification.as_str())
    .bind(&name)
    .bind(owner_id)
    .bind(min_limit)
    .bind(max_limit)
    .fetch_one(pool)
    .await
}

/// Display name given to devices registered without one.
fn default_device_name(device_id: &str) -> String {
    // ---
    let chars = device_id.chars().count();
    let tail: String = device_id.chars().skip(chars.saturating_sub(6)).collect();
    format!("My device {tail}")
}

/// Record a successful check-in by setting `last_seen = now()`.
///
/// Called exactly once per check-in, before the command drain or reading
/// accept. Online-ness is always derived from this timestamp at read time.
pub async fn touch_liveness(pool: &PgPool, device: &Device) -> Result<(), sqlx::Error> {
    // ---
    sqlx::query("UPDATE devices SET last_seen = NOW() WHERE id = $1")
        .bind(device.id)
        .execute(pool)
        .await?;
    Ok(())
}

/// All devices registered to an owner, most recently created first.
pub async fn list_for_owner(pool: &PgPool, owner_id: &str) -> Result<Vec<Device>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, Device>(
        "SELECT * FROM devices WHERE owner_id = $1 ORDER BY created_at DESC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

/// Delete a device; readings and commands cascade.
pub async fn unregister(pool: &PgPool, device: &Device) -> Result<(), sqlx::Error> {
    // ---
    sqlx::query("DELETE FROM devices WHERE id = $1")
        .bind(device.id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Persist one reading for a device with a server-assigned timestamp.
pub async fn insert_reading(
    pool: &PgPool,
    device: &Device,
    value: f64,
    raw_value: Option<i32>,
    voltage: Option<f64>,
) -> Result<SensorReading, sqlx::Error> {
    // ---
    sqlx::query_as::<_, SensorReading>(
        r#"
        INSERT INTO sensor_readings (device_id, value, raw_value, voltage)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(device.id)
    .bind(value)
    .bind(raw_value)
    .bind(voltage)
    .fetch_one(pool)
    .await
}

/// Most recent readings for a device, newest first.
pub async fn recent_readings(
    pool: &PgPool,
    device: &Device,
    limit: i64,
) -> Result<Vec<SensorReading>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, SensorReading>(
        "SELECT * FROM sensor_readings WHERE device_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
    )
    .bind(device.id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Latest reading and total reading count, for the device detail view.
pub async fn reading_stats(
    pool: &PgPool,
    device: &Device,
) -> Result<(Option<SensorReading>, i64), sqlx::Error> {
    // ---
    let latest = sqlx::query_as::<_, SensorReading>(
        "SELECT * FROM sensor_readings WHERE device_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .bind(device.id)
    .fetch_optional(pool)
    .await?;

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sensor_readings WHERE device_id = $1")
            .bind(device.id)
            .fetch_one(pool)
            .await?;

    Ok((latest, count))
}

/// Delete all readings for a device.
pub async fn clear_readings(pool: &PgPool, device: &Device) -> Result<u64, sqlx::Error> {
    // ---
    let result = sqlx::query("DELETE FROM sensor_readings WHERE device_id = $1")
        .bind(device.id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// ---

/// Partial settings update. Absent fields are left untouched; present fields
/// are validated and applied independently of each other.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsUpdate {
    // ---
    pub name: Option<String>,
    /// Accepted as a JSON number or numeric string; must be a positive
    /// integer or only this field is rejected.
    pub sampling_interval: Option<serde_json::Value>,
    pub min_limit: Option<f64>,
    pub max_limit: Option<f64>,
    pub telegram_user_id: Option<String>,
    pub telegram_bot_token: Option<String>,
}

/// Apply a partial settings update to a device.
///
/// Each present field is validated and written on its own; a malformed
/// `sampling_interval` produces a warning and leaves the other fields'
/// updates intact. A successful `sampling_interval` change also enqueues a
/// `change_reading_time` command so the device picks the new interval up on
/// its next check-in.
///
/// Returns the re-read device and any per-field warnings.
pub async fn update_settings(
    pool: &PgPool,
    device: &Device,
    update: SettingsUpdate,
) -> Result<(Device, Vec<String>), sqlx::Error> {
    // ---
    let mut warnings = Vec::new();

    if let Some(name) = update.name.as_deref().map(str::trim) {
        if name.is_empty() {
            warnings.push("name must not be empty".to_string());
        } else {
            sqlx::query("UPDATE devices SET name = $2 WHERE id = $1")
                .bind(device.id)
                .bind(name)
                .execute(pool)
                .await?;
        }
    }

    if let Some(raw) = &update.sampling_interval {
        match parse_sampling_interval(raw) {
            Some(interval) => {
                sqlx::query("UPDATE devices SET sampling_interval = $2 WHERE id = $1")
                    .bind(device.id)
                    .bind(interval)
                    .execute(pool)
                    .await?;
                // The device only learns its new interval on a check-in.
                queue::enqueue(
                    pool,
                    device,
                    CommandType::ChangeReadingTime,
                    &interval.to_string(),
                )
                .await?;
            }
            None => warnings.push("sampling_interval must be a positive integer".to_string()),
        }
    }

    if let Some(min_limit) = update.min_limit {
        if min_limit.is_finite() {
            sqlx::query("UPDATE devices SET min_limit = $2 WHERE id = $1")
                .bind(device.id)
                .bind(min_limit)
                .execute(pool)
                .await?;
        } else {
            warnings.push("min_limit must be a finite number".to_string());
        }
    }

    if let Some(max_limit) = update.max_limit {
        if max_limit.is_finite() {
            sqlx::query("UPDATE devices SET max_limit = $2 WHERE id = $1")
                .bind(device.id)
                .bind(max_limit)
                .execute(pool)
                .await?;
        } else {
            warnings.push("max_limit must be a finite number".to_string());
        }
    }

    if let Some(user_id) = update.telegram_user_id.as_deref().map(str::trim) {
        if !user_id.is_empty() {
            sqlx::query("UPDATE devices SET telegram_user_id = $2 WHERE id = $1")
                .bind(device.id)
                .bind(user_id)
                .execute(pool)
                .await?;
        }
    }

    if let Some(token) = update.telegram_bot_token.as_deref().map(str::trim) {
        if !token.is_empty() {
            sqlx::query("UPDATE devices SET telegram_bot_token = $2 WHERE id = $1")
                .bind(device.id)
                .bind(token)
                .execute(pool)
                .await?;
        }
    }

    let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = $1")
        .bind(device.id)
        .fetch_one(pool)
        .await?;

    Ok((device, warnings))
}

/// Parse a sampling interval from a JSON number or numeric string.
///
/// Returns `None` for anything that is not an integer >= 1.
fn parse_sampling_interval(value: &serde_json::Value) -> Option<i32> {
    // ---
    match value {
        serde_json::Value::Number(n) => {
            let n = n.as_i64()?;
            i32::try_from(n).ok().filter(|n| *n >= 1)
        }
        serde_json::Value::String(s) => s.trim().parse::<i32>().ok().filter(|n| *n >= 1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_device_name_uses_id_tail() {
        // ---
        assert_eq!(default_device_name("GG-A5080814"), "My device 080814");
        assert_eq!(default_device_name("TG-1"), "My device TG-1");
    }

    #[test]
    fn test_parse_sampling_interval() {
        // ---
        assert_eq!(parse_sampling_interval(&json!(30)), Some(30));
        assert_eq!(parse_sampling_interval(&json!("30")), Some(30));
        assert_eq!(parse_sampling_interval(&json!(" 15 ")), Some(15));
        assert_eq!(parse_sampling_interval(&json!(0)), None);
        assert_eq!(parse_sampling_interval(&json!(-5)), None);
        assert_eq!(parse_sampling_interval(&json!(12.5)), None);
        assert_eq!(parse_sampling_interval(&json!("soon")), None);
        assert_eq!(parse_sampling_interval(&json!(null)), None);
    }
}
