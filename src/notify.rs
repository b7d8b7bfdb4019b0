//! Outbound alert delivery to the Telegram Bot API.
//!
//! Delivery is best-effort and fully decoupled from the check-in response:
//! the handler hands a rendered alert to [`Notifier::dispatch`], which spawns
//! a background send and returns immediately. Failures are logged and
//! swallowed; a dead bot token must never fail a device's check-in.

use std::time::Duration;

use crate::alerts::ThresholdAlert;
use crate::models::Device;

/// HTTP timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---

/// Error type for notification delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The messaging API returned a non-2xx status code.
    #[error("Telegram API returned HTTP {0}")]
    HttpStatus(u16),
}

/// Sends threshold alerts to per-device Telegram chats.
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
}

impl Notifier {
    /// Create a notifier with a pre-configured HTTP client.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { client }
    }

    /// Fire-and-forget delivery of an alert for a device.
    ///
    /// Devices without notification credentials are skipped. The actual send
    /// runs on a spawned task; the caller never waits on it and never sees
    /// its outcome.
    pub fn dispatch(&self, device: &Device, alert: &ThresholdAlert) {
        // ---
        let (Some(token), Some(chat_id)) = (
            device.telegram_bot_token.clone(),
            device.telegram_user_id.clone(),
        ) else {
            tracing::debug!(
                device_id = %device.device_id,
                "Alert raised but device has no notification credentials"
            );
            return;
        };

        let message = alert.render();
        let client = self.client.clone();
        let device_id = device.device_id.clone();

        tokio::spawn(async move {
            if let Err(e) = send_message(&client, &token, &chat_id, &message).await {
                tracing::warn!(device_id = %device_id, error = %e, "Alert delivery failed");
            }
        });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute a single `sendMessage` call against the Telegram Bot API.
async fn send_message(
    client: &reqwest::Client,
    token: &str,
    chat_id: &str,
    text: &str,
) -> Result<(), NotifyError> {
    // ---
    let url = format!("https://api.telegram.org/bot{token}/sendMessage");
    let response = client
        .post(&url)
        .form(&[
            ("chat_id", chat_id),
            ("text", text),
            ("parse_mode", "Markdown"),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(NotifyError::HttpStatus(response.status().as_u16()));
    }
    Ok(())
}
