//! Webhook alert channel.

use docward_types::Notifier;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Posts `{"text": message}` to a URL, chat-webhook style.
///
/// Each message is sent on its own task; failures are logged and dropped.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, message: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime, dropping alert: {message}");
            return;
        };
        let request = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": message }));
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => debug!("alert delivered"),
                Ok(response) => warn!(status = %response.status(), "alert rejected by webhook"),
                Err(e) => warn!("alert delivery failed: {e}"),
            }
        });
    }
}
