// src/notify/dispatcher.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use metrics::counter;

use super::{AlertChannel, Permission};
use crate::ingest::types::Listing;

pub const DEAL_ALERT_TITLE: &str = "New Deal Found! 🎯";

/// Flags sampled by the poll loop at merge time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyContext {
    pub armed: bool,
    pub opted_in: bool,
}

/// Decides per merge whether the operator gets an alert.
/// Delivery runs on a detached task; failures are logged and dropped.
pub struct NotificationDispatcher {
    channel: Arc<dyn AlertChannel>,
    opted_in: AtomicBool,
    max_per_merge: usize,
}

impl NotificationDispatcher {
    pub fn new(channel: Arc<dyn AlertChannel>, max_per_merge: usize) -> Self {
        Self {
            channel,
            opted_in: AtomicBool::new(false),
            max_per_merge: max_per_merge.max(1),
        }
    }

    pub fn opted_in(&self) -> bool {
        self.opted_in.load(Ordering::Acquire)
    }

    /// Ask the channel for permission and opt in when granted.
    pub async fn enable(&self) -> Permission {
        let permission = self.channel.request_permission().await;
        match permission {
            Permission::Granted => {
                let already = self.opted_in.swap(true, Ordering::AcqRel);
                if !already {
                    self.deliver(
                        "SniperAI".to_string(),
                        "Notifications enabled for new deals!".to_string(),
                    );
                }
            }
            other => {
                tracing::info!(target: "notify", channel = self.channel.name(), permission = ?other, "alerts not enabled");
            }
        }
        permission
    }

    pub fn disable(&self) {
        self.opted_in.store(false, Ordering::Release);
    }

    /// Raise alerts for the head of `accepted`. Returns how many were dispatched.
    pub fn maybe_notify(&self, accepted: &[Listing], ctx: NotifyContext) -> usize {
        if !(ctx.armed && ctx.opted_in) || accepted.is_empty() {
            return 0;
        }
        let picked = &accepted[..accepted.len().min(self.max_per_merge)];
        for listing in picked {
            let (title, body) = deal_alert(listing);
            self.deliver(title, body);
        }
        picked.len()
    }

    fn deliver(&self, title: String, body: String) {
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(target: "notify", "no runtime, alert dropped");
            return;
        };
        let channel = Arc::clone(&self.channel);
        rt.spawn(async move {
            match channel.notify(&title, &body).await {
                Ok(()) => counter!("alerts_sent_total").increment(1),
                Err(e) => {
                    tracing::debug!(target: "notify", channel = channel.name(), error = %e, "alert not delivered")
                }
            }
        });
    }
}

/// Title and body for a newly found listing.
pub fn deal_alert(listing: &Listing) -> (String, String) {
    (
        DEAL_ALERT_TITLE.to_string(),
        format!("{} - {}€", listing.title, listing.price),
    )
}
