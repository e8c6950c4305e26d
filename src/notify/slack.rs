use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;

use super::{AlertChannel, Permission};
use crate::error::NotifyError;

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
}

impl SlackNotifier {
    /// Reads `SLACK_WEBHOOK_URL`; `None` when unset or blank.
    pub fn from_env() -> Option<Self> {
        std::env::var("SLACK_WEBHOOK_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .map(Self::new)
    }

    pub fn new(url: String) -> Self {
        Self {
            webhook_url: url,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl AlertChannel for SlackNotifier {
    async fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    async fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let text = format!("*{title}*\n{body}");
        let payload = serde_json::json!({ "text": text });

        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}
