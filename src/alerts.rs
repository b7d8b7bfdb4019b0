//! Threshold alert evaluation.
//!
//! Pure decision logic: maps a device's classification, threshold limits and
//! one reading to at most one alert. No I/O happens here; whether the alert
//! ever reaches a notification channel is the sink's problem.

use crate::models::{Classification, Device};

// ---

/// Direction of a threshold violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// Gas concentration above the limit. Gas has no meaningful lower bound.
    Excess,
    TooHigh,
    TooLow,
}

/// An out-of-bounds reading, with everything the sink needs to render a
/// human message: which device, what it measured, which limit it violated.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdAlert {
    // ---
    pub device_id: String,
    pub device_name: String,
    pub classification: Classification,
    pub kind: AlertKind,
    pub value: f64,
    pub limit: f64,
}

/// Evaluate one reading against a device's thresholds.
///
/// - GasGuard: excess iff `value > max_limit`; values below `min_limit`
///   never alert.
/// - TempGuard / HumidGuard: too high iff `value > max_limit`, too low iff
///   `value < min_limit`; the two are mutually exclusive per reading.
/// - Unknown devices never alert.
pub fn evaluate(device: &Device, value: f64) -> Option<ThresholdAlert> {
    // ---
    let (kind, limit) = match device.classification {
        Classification::GasGuard => upper_bound_only(value, device.max_limit)?,
        Classification::TempGuard | Classification::HumidGuard => {
            banded(value, device.min_limit, device.max_limit)?
        }
        Classification::Unknown => return None,
    };

    Some(ThresholdAlert {
        device_id: device.device_id.clone(),
        device_name: device.name.clone(),
        classification: device.classification,
        kind,
        value,
        limit,
    })
}

fn upper_bound_only(value: f64, max: f64) -> Option<(AlertKind, f64)> {
    (value > max).then_some((AlertKind::Excess, max))
}

fn banded(value: f64, min: f64, max: f64) -> Option<(AlertKind, f64)> {
    // ---
    if value > max {
        Some((AlertKind::TooHigh, max))
    } else if value < min {
        Some((AlertKind::TooLow, min))
    } else {
        None
    }
}

impl ThresholdAlert {
    /// Render the warning message sent to the notification channel.
    ///
    /// Texts use Telegram Markdown; the CO message includes the evacuation
    /// notice the gas guards shipped with.
    pub fn render(&self) -> String {
        // ---
        match (self.classification, self.kind) {
            (Classification::GasGuard, _) => format!(
                "⚠️ WARNING! ⚠️\n\n\
                 Device \"*{name}*\" detected excess CO!\n\
                 Current CO level: *{value} ppm*\n\
                 CO Limit: {limit} ppm\n\
                 Evacuate everyone to fresh air and call emergency services from the outside!\n\n\
                 Device ID: {id}.",
                name = self.device_name,
                value = self.value,
                limit = self.limit,
                id = self.device_id,
            ),
            (Classification::TempGuard, AlertKind::TooLow) => format!(
                "🌡️ WARNING! 🌡️\n\n\
                 Device \"*{name}*\" has detected a temperature that is too low.\n\
                 Current temperature: *{value}°C*\n\
                 The lowest safe temperature: {limit}°C",
                name = self.device_name,
                value = self.value,
                limit = self.limit,
            ),
            (Classification::TempGuard, _) => format!(
                "🌡️ WARNING! 🌡️\n\n\
                 Device \"*{name}*\" has detected a temperature that is too high.\n\
                 Current temperature: *{value}°C*\n\
                 The highest safe temperature: {limit}°C",
                name = self.device_name,
                value = self.value,
                limit = self.limit,
            ),
            (Classification::HumidGuard, AlertKind::TooLow) => format!(
                "☁️ WARNING! ☁️\n\n\
                 Device \"*{name}*\" has detected a humidity that is too low.\n\
                 Current humidity: *{value}% RH*\n\
                 The lowest safe humidity: {limit}% RH",
                name = self.device_name,
                value = self.value,
                limit = self.limit,
            ),
            (Classification::HumidGuard, _) => format!(
                "☁️ WARNING! ☁️\n\n\
                 Device \"*{name}*\" has detected a humidity that is too high.\n\
                 Current humidity: *{value}% RH*\n\
                 The highest safe humidity: {limit}% RH",
                name = self.device_name,
                value = self.value,
                limit = self.limit,
            ),
            (Classification::Unknown, _) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::Utc;

    fn create_test_device(classification: Classification, min: f64, max: f64) -> Device {
        // ---
        let device_id = match classification {
            Classification::GasGuard => "GG-001",
            Classification::TempGuard => "TG-001",
            Classification::HumidGuard => "HG-001",
            Classification::Unknown => "XX-001",
        };
        Device {
            id: 1,
            device_id: device_id.to_string(),
            classification,
            name: "Test guard".to_string(),
            owner_id: None,
            sampling_interval: 15,
            min_limit: min,
            max_limit: max,
            telegram_user_id: None,
            telegram_bot_token: None,
            last_seen: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_gas_guard_upper_bound_only() {
        // ---
        let device = create_test_device(Classification::GasGuard, 0.0, 100.0);

        // At the limit - no alert
        assert_eq!(evaluate(&device, 100.0), None);

        // Just above - excess
        let alert = evaluate(&device, 100.01).unwrap();
        assert_eq!(alert.kind, AlertKind::Excess);
        assert_eq!(alert.limit, 100.0);

        // Zero never alerts: gas has no lower bound
        assert_eq!(evaluate(&device, 0.0), None);
        assert_eq!(evaluate(&device, -3.0), None);
    }

    #[test]
    fn test_temp_guard_band() {
        // ---
        let device = create_test_device(Classification::TempGuard, 18.0, 26.0);

        assert_eq!(evaluate(&device, 26.0), None);
        assert_eq!(evaluate(&device, 18.0), None);

        let high = evaluate(&device, 26.1).unwrap();
        assert_eq!(high.kind, AlertKind::TooHigh);
        assert_eq!(high.limit, 26.0);

        let low = evaluate(&device, 17.9).unwrap();
        assert_eq!(low.kind, AlertKind::TooLow);
        assert_eq!(low.limit, 18.0);
    }

    #[test]
    fn test_humid_guard_band() {
        // ---
        let device = create_test_device(Classification::HumidGuard, 30.0, 60.0);

        assert_eq!(evaluate(&device, 45.0), None);
        assert_eq!(evaluate(&device, 60.5).unwrap().kind, AlertKind::TooHigh);
        assert_eq!(evaluate(&device, 29.9).unwrap().kind, AlertKind::TooLow);
    }

    #[test]
    fn test_unknown_never_alerts() {
        // ---
        let device = create_test_device(Classification::Unknown, 0.0, 0.0);
        assert_eq!(evaluate(&device, 1e9), None);
        assert_eq!(evaluate(&device, -1e9), None);
    }

    #[test]
    fn test_rendered_message_carries_value_and_limit() {
        // ---
        let device = create_test_device(Classification::GasGuard, 0.0, 100.0);
        let message = evaluate(&device, 142.5).unwrap().render();
        assert!(message.contains("142.5 ppm"));
        assert!(message.contains("CO Limit: 100 ppm"));
        assert!(message.contains("GG-001"));
    }
}
