//! acquisition.rs: simulated checkout as an explicit state machine.
//!
//! `Inactive -> Running(cursor) -> Settling -> Inactive`. One session at a time
//! system-wide. The step timer is a task tied to a session id; cancelling the
//! session aborts it, and a timer that wakes for a session that no longer
//! exists does nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::error::AcquireError;
use crate::ingest::types::Listing;

/// Consumer hook run once per completed (not cancelled) session.
pub trait SettlementHook: Send + Sync {
    fn on_acquired(&self, listing: &Listing);
}

impl<F> SettlementHook for F
where
    F: Fn(&Listing) + Send + Sync,
{
    fn on_acquired(&self, listing: &Listing) {
        self(listing)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SequencerCfg {
    pub step_interval: Duration,
    pub settle_delay: Duration,
}

impl Default for SequencerCfg {
    fn default() -> Self {
        Self {
            step_interval: Duration::from_millis(300),
            settle_delay: Duration::from_millis(800),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Inactive,
    Running { cursor: usize },
    Settling,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionStatus {
    #[serde(flatten)]
    pub phase: Phase,
    pub listing_id: Option<String>,
    pub steps_total: usize,
    pub log: Vec<String>,
}

struct Session {
    id: u64,
    listing: Listing,
    script: Vec<String>,
    cursor: usize,
    log: Vec<String>,
    settling: bool,
    timer: Option<JoinHandle<()>>,
}

struct Shared {
    cfg: SequencerCfg,
    hook: Arc<dyn SettlementHook>,
    active: Mutex<Option<Session>>,
    next_id: AtomicU64,
}

impl Shared {
    /// Remove the active session if it is `id`, aborting its timer.
    fn discard(&self, id: u64) -> bool {
        let mut g = self.active.lock();
        if g.as_ref().is_some_and(|s| s.id == id) {
            if let Some(mut s) = g.take() {
                if let Some(t) = s.timer.take() {
                    t.abort();
                }
                tracing::info!(target: "acquire", session = id, listing = %s.listing.id, step = s.cursor, "session cancelled");
                counter!("acquisitions_cancelled_total").increment(1);
            }
            return true;
        }
        false
    }
}

#[derive(Clone)]
pub struct AcquisitionSequencer {
    shared: Arc<Shared>,
}

/// Identifies one started session. Dropping it does not cancel the session.
#[derive(Clone)]
pub struct SessionHandle {
    id: u64,
    listing_id: String,
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn listing_id(&self) -> &str {
        &self.listing_id
    }

    /// Cancel this session. Returns false if it already finished or was cancelled.
    pub fn cancel(&self) -> bool {
        self.shared.discard(self.id)
    }

    pub fn is_active(&self) -> bool {
        self.shared
            .active
            .lock()
            .as_ref()
            .is_some_and(|s| s.id == self.id)
    }
}

/// Checkout steps shown for `listing`.
pub fn default_script(listing: &Listing) -> Vec<String> {
    let short: String = listing.title.chars().take(20).collect();
    let item_ref = listing.id.split('-').nth(1).unwrap_or(&listing.id);
    vec![
        format!("Target acquired: {short}..."),
        format!("Checking availability for item ID: {item_ref}..."),
        "Availability confirmed. Status: OK".to_string(),
        "Generating checkout token...".to_string(),
        "Applying session cookies...".to_string(),
        "Sending add_to_cart request...".to_string(),
        "SUCCESS: Item added to cart.".to_string(),
        "Redirecting to payment gateway...".to_string(),
    ]
}

impl AcquisitionSequencer {
    pub fn new(cfg: SequencerCfg, hook: Arc<dyn SettlementHook>) -> Self {
        Self {
            shared: Arc::new(Shared {
                cfg,
                hook,
                active: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn start(&self, listing: Listing) -> Result<SessionHandle, AcquireError> {
        let script = default_script(&listing);
        self.start_with_script(listing, script)
    }

    /// Start a session playing `script`. Rejected while another session is
    /// running or settling. Must be called from within a tokio runtime.
    pub fn start_with_script(
        &self,
        listing: Listing,
        script: Vec<String>,
    ) -> Result<SessionHandle, AcquireError> {
        let mut g = self.shared.active.lock();
        if let Some(s) = g.as_ref() {
            return Err(AcquireError::Busy {
                active: s.listing.id.clone(),
            });
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let listing_id = listing.id.clone();
        tracing::info!(target: "acquire", session = id, listing = %listing_id, steps = script.len(), "initializing checkout sequence");

        let timer = tokio::spawn(drive(Arc::clone(&self.shared), id));
        *g = Some(Session {
            id,
            listing,
            script,
            cursor: 0,
            log: Vec::new(),
            settling: false,
            timer: Some(timer),
        });

        Ok(SessionHandle {
            id,
            listing_id,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Cancel whatever session is active. Returns false if none was.
    pub fn cancel_active(&self) -> bool {
        let id = self.shared.active.lock().as_ref().map(|s| s.id);
        id.is_some_and(|id| self.shared.discard(id))
    }

    pub fn is_busy(&self) -> bool {
        self.shared.active.lock().is_some()
    }

    pub fn status(&self) -> AcquisitionStatus {
        let g = self.shared.active.lock();
        match g.as_ref() {
            None => AcquisitionStatus {
                phase: Phase::Inactive,
                listing_id: None,
                steps_total: 0,
                log: Vec::new(),
            },
            Some(s) => AcquisitionStatus {
                phase: if s.settling {
                    Phase::Settling
                } else {
                    Phase::Running { cursor: s.cursor }
                },
                listing_id: Some(s.listing.id.clone()),
                steps_total: s.script.len(),
                log: s.log.clone(),
            },
        }
    }
}

/// Timer task for session `id`: one step per interval, then settle.
async fn drive(shared: Arc<Shared>, id: u64) {
    loop {
        {
            let mut g = shared.active.lock();
            let Some(s) = g.as_mut().filter(|s| s.id == id) else {
                return;
            };
            if s.cursor >= s.script.len() {
                s.settling = true;
                break;
            }
        }

        tokio::time::sleep(shared.cfg.step_interval).await;

        let mut g = shared.active.lock();
        let Some(s) = g.as_mut().filter(|s| s.id == id) else {
            return;
        };
        let step = s.script[s.cursor].clone();
        tracing::debug!(target: "acquire", session = id, cursor = s.cursor, %step, "step");
        s.log.push(step);
        s.cursor += 1;
    }

    tokio::time::sleep(shared.cfg.settle_delay).await;

    let finished = {
        let mut g = shared.active.lock();
        if g.as_ref().is_some_and(|s| s.id == id) {
            g.take()
        } else {
            None
        }
    };
    let Some(session) = finished else {
        return;
    };

    tracing::info!(target: "acquire", session = id, listing = %session.listing.id, "settled");
    counter!("acquisitions_completed_total").increment(1);
    shared.hook.on_acquired(&session.listing);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Condition;
    use chrono::Utc;

    fn listing() -> Listing {
        Listing {
            id: "real-1700000000000-3".into(),
            title: "Carhartt Double Knee Pants W32".into(),
            brand: "Carhartt".into(),
            size: "32x32".into(),
            price: 35.0,
            currency: "EUR".into(),
            condition: Condition::VeryGood,
            discovered_at: Utc::now(),
            source_link: None,
            is_exceptional: false,
        }
    }

    #[test]
    fn default_script_mentions_listing() {
        let s = default_script(&listing());
        assert_eq!(s.len(), 8);
        assert_eq!(s[0], "Target acquired: Carhartt Double Knee...");
        assert_eq!(s[1], "Checking availability for item ID: 1700000000000...");
        assert!(s[6].starts_with("SUCCESS"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_script_settles_without_steps() {
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        let seq = AcquisitionSequencer::new(
            SequencerCfg::default(),
            Arc::new(move |_: &Listing| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        seq.start_with_script(listing(), Vec::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seq.status().phase, Phase::Settling);
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!seq.is_busy());
    }
}
