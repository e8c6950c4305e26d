// src/monitor.rs
//! Wires feed, poll scheduler, dispatcher, sequencer and operator shell.

use std::sync::Arc;

use crate::acquisition::{AcquisitionSequencer, SequencerCfg, SessionHandle, SettlementHook};
use crate::config::MonitorConfig;
use crate::error::AcquireError;
use crate::feed::FeedStore;
use crate::ingest::scheduler::{PollScheduler, PollSchedulerCfg};
use crate::ingest::types::ListingProvider;
use crate::notify::{AlertChannel, NotificationDispatcher};
use crate::operator::{OperatorSettlement, OperatorState};

pub struct Monitor {
    pub feed: Arc<FeedStore>,
    pub scheduler: PollScheduler,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub sequencer: AcquisitionSequencer,
    pub operator: Arc<OperatorState>,
}

impl Monitor {
    /// Standard wiring: completed acquisitions settle into the operator shell.
    pub fn new(
        cfg: &MonitorConfig,
        provider: Arc<dyn ListingProvider>,
        channel: Arc<dyn AlertChannel>,
    ) -> Self {
        let operator = Arc::new(OperatorState::new());
        let hook = Arc::new(OperatorSettlement::new(Arc::clone(&operator)));
        Self::with_hook(cfg, provider, channel, operator, hook)
    }

    pub fn with_hook(
        cfg: &MonitorConfig,
        provider: Arc<dyn ListingProvider>,
        channel: Arc<dyn AlertChannel>,
        operator: Arc<OperatorState>,
        hook: Arc<dyn SettlementHook>,
    ) -> Self {
        let feed = Arc::new(FeedStore::with_capacity(cfg.feed.capacity));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            channel,
            cfg.notify.max_alerts_per_merge,
        ));
        let scheduler = PollScheduler::new(
            PollSchedulerCfg {
                interval: cfg.poll_interval(),
                rule: cfg.exceptional_rule(),
            },
            provider,
            Arc::clone(&feed),
            Arc::clone(&dispatcher),
            cfg.default_criteria(),
        );
        let sequencer = AcquisitionSequencer::new(
            SequencerCfg {
                step_interval: cfg.step_interval(),
                settle_delay: cfg.settle_delay(),
            },
            hook,
        );
        Self {
            feed,
            scheduler,
            dispatcher,
            sequencer,
            operator,
        }
    }

    /// Start the checkout sequence for a listing currently in the feed.
    pub fn acquire(&self, listing_id: &str) -> Result<SessionHandle, AcquireError> {
        let listing = self
            .feed
            .get(listing_id)
            .ok_or_else(|| AcquireError::UnknownListing(listing_id.to_string()))?;
        self.sequencer.start(listing)
    }
}
