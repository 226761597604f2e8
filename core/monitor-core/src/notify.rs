//! Operator notifications.
//!
//! Delivery is best-effort: a sink reports success or failure and the caller
//! logs it. Nothing is queued or retried.

use std::time::Duration;

use reqwest::blocking::Client;

const REQUEST_TIMEOUT_SECS: u64 = 10;

pub trait NotificationSink {
    /// Sends one notification. Must return rather than block indefinitely.
    fn deliver(&self, title: &str, body: &str) -> bool;
}

/// Publishes to an ntfy topic over HTTP.
pub struct NtfySink {
    client: Client,
    url: String,
}

impl NtfySink {
    /// `server` may be a bare host (`ntfy.example.com`, https is assumed) or a
    /// full base URL (`http://10.0.0.5:8080`).
    pub fn new(server: &str, topic: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "Failed to build HTTP client; using defaults");
                Client::new()
            });
        Self {
            client,
            url: topic_url(server, topic),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl NotificationSink for NtfySink {
    fn deliver(&self, title: &str, body: &str) -> bool {
        let response = self
            .client
            .post(&self.url)
            .header("Title", title)
            .header("Priority", "high")
            .header("Tags", "computer,white_check_mark")
            .body(body.to_string())
            .send();

        match response {
            Ok(response) if response.status().is_success() => {
                tracing::info!(title, "Notification sent");
                true
            }
            Ok(response) => {
                let status = response.status();
                let text = response.text().unwrap_or_default();
                tracing::error!(%status, body = %text, "Failed to send notification");
                false
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to send notification");
                false
            }
        }
    }
}

pub fn topic_url(server: &str, topic: &str) -> String {
    let server = server.trim_end_matches('/');
    let topic = topic.trim_start_matches('/');
    if server.starts_with("http://") || server.starts_with("https://") {
        format!("{server}/{topic}")
    } else {
        format!("https://{server}/{topic}")
    }
}
