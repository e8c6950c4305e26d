// src/notify/mod.rs
pub mod discord;
pub mod dispatcher;
pub mod email;
pub mod slack;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::NotifyError;

pub use dispatcher::{NotificationDispatcher, NotifyContext};

/// Outcome of asking a channel whether it may deliver alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    Unsupported,
}

/// Something that can show an alert to the operator.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn request_permission(&self) -> Permission;
    async fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError>;
    fn name(&self) -> &'static str;
}

/// Writes alerts to the log only.
pub struct LogChannel;

#[async_trait]
impl AlertChannel for LogChannel {
    async fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    async fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        tracing::info!(target: "notify", %title, %body, "alert");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Platform without any alert capability.
pub struct DisabledChannel;

#[async_trait]
impl AlertChannel for DisabledChannel {
    async fn request_permission(&self) -> Permission {
        Permission::Unsupported
    }

    async fn notify(&self, _title: &str, _body: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Unsupported)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Fans an alert out to every configured channel.
#[derive(Clone, Default)]
pub struct NotifierMux {
    channels: Vec<Arc<dyn AlertChannel>>,
}

impl NotifierMux {
    pub fn new(channels: Vec<Arc<dyn AlertChannel>>) -> Self {
        Self { channels }
    }

    /// Discord / Slack / email from env; the log channel is always present.
    pub fn from_env() -> Self {
        let mut channels: Vec<Arc<dyn AlertChannel>> = vec![Arc::new(LogChannel)];
        if let Some(d) = discord::DiscordNotifier::from_env() {
            channels.push(Arc::new(d));
        }
        if let Some(s) = slack::SlackNotifier::from_env() {
            channels.push(Arc::new(s));
        }
        match email::EmailNotifier::from_env() {
            Ok(Some(e)) => channels.push(Arc::new(e)),
            Ok(None) => tracing::debug!(target: "notify", "email disabled (no SMTP_HOST)"),
            Err(e) => tracing::warn!(target: "notify", error = %e, "email channel misconfigured"),
        }
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[async_trait]
impl AlertChannel for NotifierMux {
    async fn request_permission(&self) -> Permission {
        let mut any_denied = false;
        for ch in &self.channels {
            match ch.request_permission().await {
                Permission::Granted => return Permission::Granted,
                Permission::Denied => any_denied = true,
                Permission::Unsupported => {}
            }
        }
        if any_denied {
            Permission::Denied
        } else {
            Permission::Unsupported
        }
    }

    async fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        if self.channels.is_empty() {
            return Err(NotifyError::Unsupported);
        }
        let mut delivered = 0usize;
        let mut last_err = None;
        for ch in &self.channels {
            match ch.notify(title, body).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(target: "notify", channel = ch.name(), error = %e, "channel failed");
                    last_err = Some(e);
                }
            }
        }
        match (delivered, last_err) {
            (0, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "mux"
    }
}
