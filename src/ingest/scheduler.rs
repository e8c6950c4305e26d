// src/ingest/scheduler.rs
//! Poll loop: query the provider on a fixed cadence while armed, merge into
//! the feed, hand accepted listings to the dispatcher.
//!
//! Each `arm` captures an immutable criteria snapshot plus an epoch number.
//! A response is merged only if the scheduler is still armed at that same
//! epoch, so `disarm` and criteria changes invalidate late responses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::feed::FeedStore;
use crate::ingest::types::{FilterCriteria, ListingProvider};
use crate::ingest::{ensure_metrics_described, map_batch, ExceptionalRule};
use crate::notify::{NotificationDispatcher, NotifyContext};

#[derive(Clone, Copy, Debug)]
pub struct PollSchedulerCfg {
    pub interval: Duration,
    pub rule: ExceptionalRule,
}

impl Default for PollSchedulerCfg {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(6),
            rule: ExceptionalRule::default(),
        }
    }
}

/// What happened to a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Merged { accepted: usize, alerted: usize },
    /// A previous query was still in flight.
    Skipped,
    /// Disarmed or criteria changed while the query was running.
    Stale,
    /// Not armed.
    Idle,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub armed: bool,
    pub querying: bool,
    pub epoch: u64,
    pub interval_secs: u64,
    pub criteria: FilterCriteria,
}

#[derive(Clone)]
struct Snapshot {
    epoch: u64,
    criteria: Arc<FilterCriteria>,
}

struct Control {
    epoch: u64,
    armed: bool,
    criteria: Arc<FilterCriteria>,
    timer: Option<JoinHandle<()>>,
}

struct Shared {
    cfg: PollSchedulerCfg,
    provider: Arc<dyn ListingProvider>,
    feed: Arc<FeedStore>,
    dispatcher: Arc<NotificationDispatcher>,
    control: Mutex<Control>,
    querying: AtomicBool,
}

pub struct PollScheduler {
    shared: Arc<Shared>,
}

impl PollScheduler {
    pub fn new(
        cfg: PollSchedulerCfg,
        provider: Arc<dyn ListingProvider>,
        feed: Arc<FeedStore>,
        dispatcher: Arc<NotificationDispatcher>,
        criteria: FilterCriteria,
    ) -> Self {
        ensure_metrics_described();
        Self {
            shared: Arc::new(Shared {
                cfg,
                provider,
                feed,
                dispatcher,
                control: Mutex::new(Control {
                    epoch: 0,
                    armed: false,
                    criteria: Arc::new(criteria),
                    timer: None,
                }),
                querying: AtomicBool::new(false),
            }),
        }
    }

    /// Start polling with `criteria`: one cycle now, then one per interval.
    /// Arming while already armed restarts the timer with the new snapshot.
    /// Must be called from within a tokio runtime.
    pub fn arm(&self, criteria: FilterCriteria) {
        let mut ctl = self.shared.control.lock();
        restart_locked(&self.shared, &mut ctl, Arc::new(criteria));
    }

    /// Arm with the currently stored criteria.
    pub fn arm_current(&self) {
        let mut ctl = self.shared.control.lock();
        let criteria = Arc::clone(&ctl.criteria);
        restart_locked(&self.shared, &mut ctl, criteria);
    }

    /// Stop polling. Returns false if already idle.
    pub fn disarm(&self) -> bool {
        let mut ctl = self.shared.control.lock();
        if !ctl.armed {
            return false;
        }
        if let Some(t) = ctl.timer.take() {
            t.abort();
        }
        ctl.epoch += 1;
        ctl.armed = false;
        tracing::info!(target: "poll", epoch = ctl.epoch, "monitor disarmed");
        true
    }

    /// Replace the criteria. While armed this is disarm + arm; while idle the
    /// criteria are stored for the next `arm_current`.
    pub fn update_criteria(&self, criteria: FilterCriteria) {
        let mut ctl = self.shared.control.lock();
        let criteria = Arc::new(criteria);
        if ctl.armed {
            restart_locked(&self.shared, &mut ctl, criteria);
        } else {
            ctl.criteria = criteria;
        }
    }

    /// Run one cycle right away with the current snapshot.
    pub async fn poll_now(&self) -> CycleOutcome {
        let snap = {
            let ctl = self.shared.control.lock();
            if !ctl.armed {
                return CycleOutcome::Idle;
            }
            Snapshot {
                epoch: ctl.epoch,
                criteria: Arc::clone(&ctl.criteria),
            }
        };
        run_cycle(Arc::clone(&self.shared), snap).await
    }

    pub fn is_armed(&self) -> bool {
        self.shared.control.lock().armed
    }

    pub fn is_querying(&self) -> bool {
        self.shared.querying.load(Ordering::Acquire)
    }

    pub fn criteria(&self) -> FilterCriteria {
        (*self.shared.control.lock().criteria).clone()
    }

    pub fn status(&self) -> SchedulerStatus {
        let ctl = self.shared.control.lock();
        SchedulerStatus {
            armed: ctl.armed,
            querying: self.is_querying(),
            epoch: ctl.epoch,
            interval_secs: self.shared.cfg.interval.as_secs(),
            criteria: (*ctl.criteria).clone(),
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(t) = self.shared.control.lock().timer.take() {
            t.abort();
        }
    }
}

fn restart_locked(shared: &Arc<Shared>, ctl: &mut Control, criteria: Arc<FilterCriteria>) {
    if let Some(t) = ctl.timer.take() {
        t.abort();
    }
    ctl.epoch += 1;
    ctl.armed = true;
    ctl.criteria = criteria;

    let snap = Snapshot {
        epoch: ctl.epoch,
        criteria: Arc::clone(&ctl.criteria),
    };
    tracing::info!(
        target: "poll",
        epoch = snap.epoch,
        ceiling = snap.criteria.price_ceiling,
        brands = snap.criteria.brands.len(),
        "monitor armed"
    );
    ctl.timer = Some(tokio::spawn(timer_loop(Arc::clone(shared), snap)));
}

async fn timer_loop(shared: Arc<Shared>, snap: Snapshot) {
    let mut ticker = tokio::time::interval(shared.cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        // Detached so that aborting the timer never cancels a running query.
        tokio::spawn(run_cycle(Arc::clone(&shared), snap.clone()));
    }
}

/// Clears the in-flight flag when the cycle ends, however it ends.
struct QueryGuard<'a>(&'a AtomicBool);

impl<'a> QueryGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for QueryGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn run_cycle(shared: Arc<Shared>, snap: Snapshot) -> CycleOutcome {
    let Some(_guard) = QueryGuard::try_acquire(&shared.querying) else {
        counter!("poll_skipped_total").increment(1);
        tracing::debug!(target: "poll", epoch = snap.epoch, "query in flight, cycle skipped");
        return CycleOutcome::Skipped;
    };
    counter!("poll_cycles_total").increment(1);

    let raw = match shared.provider.query(&snap.criteria).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(target: "poll", provider = shared.provider.name(), error = %e, "provider query failed");
            counter!("provider_errors_total").increment(1);
            Vec::new()
        }
    };
    let listings = map_batch(raw, &snap.criteria, shared.cfg.rule, Utc::now());

    let accepted = {
        let ctl = shared.control.lock();
        if !ctl.armed || ctl.epoch != snap.epoch {
            counter!("poll_stale_total").increment(1);
            tracing::debug!(
                target: "poll",
                cycle_epoch = snap.epoch,
                current_epoch = ctl.epoch,
                "stale response discarded"
            );
            return CycleOutcome::Stale;
        }
        shared.feed.merge(listings)
    };

    let ctx = NotifyContext {
        armed: true,
        opted_in: shared.dispatcher.opted_in(),
    };
    let alerted = shared.dispatcher.maybe_notify(&accepted, ctx);

    tracing::info!(
        target: "poll",
        epoch = snap.epoch,
        accepted = accepted.len(),
        exceptional = accepted.iter().filter(|l| l.is_exceptional).count(),
        feed_len = shared.feed.len(),
        "cycle merged"
    );
    CycleOutcome::Merged {
        accepted: accepted.len(),
        alerted,
    }
}
