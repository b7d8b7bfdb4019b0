//! Domain models for the EcoMonitor device fleet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device checking in within this many seconds of `now` counts as online.
pub const ONLINE_WINDOW_SECS: i64 = 300;

// ---

/// Device classification, fixed at registration from the `device_id` prefix.
///
/// The classification is a creation-time snapshot stored with the device; it
/// is never re-derived from the identifier afterwards. All prefix branching
/// lives here so threshold defaulting and alert evaluation stay in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    GasGuard,
    TempGuard,
    HumidGuard,
    Unknown,
}

impl Classification {
    /// Derive the classification from a manufacturer-assigned device id.
    ///
    /// Called once, at registration. `GG` → GasGuard, `TG` → TempGuard,
    /// `HG` → HumidGuard, anything else → Unknown.
    pub fn from_device_id(device_id: &str) -> Self {
        // ---
        if device_id.starts_with("GG") {
            Classification::GasGuard
        } else if device_id.starts_with("TG") {
            Classification::TempGuard
        } else if device_id.starts_with("HG") {
            Classification::HumidGuard
        } else {
            Classification::Unknown
        }
    }

    /// Default `(min_limit, max_limit)` threshold bounds for new devices.
    pub fn default_limits(self) -> (f64, f64) {
        // ---
        match self {
            Classification::GasGuard => (0.0, 100.0),
            Classification::TempGuard => (18.0, 26.0),
            Classification::HumidGuard => (30.0, 60.0),
            Classification::Unknown => (0.0, 0.0),
        }
    }

    /// Stable name stored in the `devices.classification` column.
    pub fn as_str(self) -> &'static str {
        // ---
        match self {
            Classification::GasGuard => "GasGuard",
            Classification::TempGuard => "TempGuard",
            Classification::HumidGuard => "HumidGuard",
            Classification::Unknown => "Unknown",
        }
    }
}

/// A stored classification name that is not part of the closed set.
#[derive(Debug, thiserror::Error)]
#[error("unrecognized classification '{0}'")]
pub struct ParseClassificationError(String);

impl TryFrom<String> for Classification {
    type Error = ParseClassificationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "GasGuard" => Ok(Classification::GasGuard),
            "TempGuard" => Ok(Classification::TempGuard),
            "HumidGuard" => Ok(Classification::HumidGuard),
            "Unknown" => Ok(Classification::Unknown),
            _ => Err(ParseClassificationError(value)),
        }
    }
}

// ---

/// Operator command types a guard device understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Restart,
    CalibrateSensor,
    ChangeReadingTime,
    DisplayMessage,
    EnableScreen,
    DisableScreen,
    UpdateApiUrl,
    ClearEeprom,
    FactoryReset,
    Reboot,
}

impl CommandType {
    /// Wire/database name of the command type.
    pub fn as_str(self) -> &'static str {
        // ---
        match self {
            CommandType::Restart => "restart",
            CommandType::CalibrateSensor => "calibrate_sensor",
            CommandType::ChangeReadingTime => "change_reading_time",
            CommandType::DisplayMessage => "display_message",
            CommandType::EnableScreen => "enable_screen",
            CommandType::DisableScreen => "disable_screen",
            CommandType::UpdateApiUrl => "update_api_url",
            CommandType::ClearEeprom => "clear_eeprom",
            CommandType::FactoryReset => "factory_reset",
            CommandType::Reboot => "reboot",
        }
    }

    /// Parse a wire name into a command type, rejecting anything outside the
    /// closed set.
    pub fn parse(value: &str) -> Option<Self> {
        // ---
        match value {
            "restart" => Some(CommandType::Restart),
            "calibrate_sensor" => Some(CommandType::CalibrateSensor),
            "change_reading_time" => Some(CommandType::ChangeReadingTime),
            "display_message" => Some(CommandType::DisplayMessage),
            "enable_screen" => Some(CommandType::EnableScreen),
            "disable_screen" => Some(CommandType::DisableScreen),
            "update_api_url" => Some(CommandType::UpdateApiUrl),
            "clear_eeprom" => Some(CommandType::ClearEeprom),
            "factory_reset" => Some(CommandType::FactoryReset),
            "reboot" => Some(CommandType::Reboot),
            _ => None,
        }
    }
}

/// A stored command-type name that is not part of the closed set.
#[derive(Debug, thiserror::Error)]
#[error("unrecognized command type '{0}'")]
pub struct ParseCommandTypeError(String);

impl TryFrom<String> for CommandType {
    type Error = ParseCommandTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CommandType::parse(&value).ok_or(ParseCommandTypeError(value))
    }
}

// ---

/// A registered guard device.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Device {
    // ---
    pub id: i64,
    pub device_id: String,
    #[sqlx(try_from = "String")]
    pub classification: Classification,
    pub name: String,
    pub owner_id: Option<String>,
    pub sampling_interval: i32,
    pub min_limit: f64,
    pub max_limit: f64,
    pub telegram_user_id: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// Whether the device checked in within the last [`ONLINE_WINDOW_SECS`]
    /// seconds of `now`. Derived on every read; never stored.
    pub fn is_online_at(&self, now: DateTime<Utc>) -> bool {
        // ---
        self.last_seen
            .map(|seen| (now - seen).num_seconds() < ONLINE_WINDOW_SECS)
            .unwrap_or(false)
    }

    pub fn is_online(&self) -> bool {
        self.is_online_at(Utc::now())
    }
}

/// One measurement pushed by a device.
///
/// `raw_value` and `voltage` are deprecated diagnostic fields kept for wire
/// compatibility with deployed firmware.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SensorReading {
    // ---
    pub id: i64,
    pub device_id: i64,
    pub value: f64,
    pub raw_value: Option<i32>,
    pub voltage: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// An operator-issued command for a device.
///
/// Lifecycle: queued (`executed = false`) until drained by a check-in, at
/// which point delivery and execution are marked in one atomic step.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Command {
    // ---
    pub id: i64,
    pub device_id: i64,
    #[sqlx(try_from = "String")]
    pub command_type: CommandType,
    pub payload: String,
    pub executed: bool,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn create_test_device(last_seen: Option<DateTime<Utc>>) -> Device {
        // ---
        Device {
            id: 1,
            device_id: "GG-A5080814".to_string(),
            classification: Classification::GasGuard,
            name: "Garage".to_string(),
            owner_id: Some("op-1".to_string()),
            sampling_interval: 15,
            min_limit: 0.0,
            max_limit: 100.0,
            telegram_user_id: None,
            telegram_bot_token: None,
            last_seen,
            created_at: Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap(),
        }
    }

    #[test]
    fn test_classification_from_prefix() {
        // ---
        assert_eq!(
            Classification::from_device_id("GG-A5080814"),
            Classification::GasGuard
        );
        assert_eq!(
            Classification::from_device_id("TG-001"),
            Classification::TempGuard
        );
        assert_eq!(
            Classification::from_device_id("HG-77"),
            Classification::HumidGuard
        );
        assert_eq!(
            Classification::from_device_id("XX-123"),
            Classification::Unknown
        );
        assert_eq!(Classification::from_device_id(""), Classification::Unknown);
    }

    #[test]
    fn test_default_limits_per_classification() {
        // ---
        assert_eq!(Classification::GasGuard.default_limits(), (0.0, 100.0));
        assert_eq!(Classification::TempGuard.default_limits(), (18.0, 26.0));
        assert_eq!(Classification::HumidGuard.default_limits(), (30.0, 60.0));
        assert_eq!(Classification::Unknown.default_limits(), (0.0, 0.0));
    }

    #[test]
    fn test_classification_is_a_stored_snapshot() {
        // ---
        // A device whose identifier would parse differently today keeps the
        // classification it was created with.
        let mut device = create_test_device(None);
        device.device_id = "TG-relabelled".to_string();
        assert_eq!(device.classification, Classification::GasGuard);

        let stored: Classification = "GasGuard".to_string().try_into().unwrap();
        assert_eq!(stored, Classification::GasGuard);
    }

    #[test]
    fn test_command_type_round_trip() {
        // ---
        for name in [
            "restart",
            "calibrate_sensor",
            "change_reading_time",
            "display_message",
            "enable_screen",
            "disable_screen",
            "update_api_url",
            "clear_eeprom",
            "factory_reset",
            "reboot",
        ] {
            let parsed = CommandType::parse(name).expect(name);
            assert_eq!(parsed.as_str(), name);
        }
        assert_eq!(CommandType::parse("self_destruct"), None);
    }

    #[test]
    fn test_is_online_window() {
        // ---
        let now = Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap();

        // Never seen - offline
        assert!(!create_test_device(None).is_online_at(now));

        // Seen just now - online
        assert!(create_test_device(Some(now)).is_online_at(now));

        // Seen 299s ago - still online
        let recent = create_test_device(Some(now - Duration::seconds(299)));
        assert!(recent.is_online_at(now));

        // Seen exactly 300s ago - offline
        let stale = create_test_device(Some(now - Duration::seconds(300)));
        assert!(!stale.is_online_at(now));
    }
}
