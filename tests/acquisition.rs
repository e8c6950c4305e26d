// tests/acquisition.rs
//
// Checkout sequencer timing under a paused clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use snipe_monitor::acquisition::{AcquisitionSequencer, Phase, SequencerCfg};
use snipe_monitor::{AcquireError, Condition, Listing};

fn listing(id: &str) -> Listing {
    Listing {
        id: id.to_string(),
        title: "Vintage Nike Spellout Hoodie".into(),
        brand: "Nike".into(),
        size: "L".into(),
        price: 15.0,
        currency: "EUR".into(),
        condition: Condition::Good,
        discovered_at: Utc::now(),
        source_link: Some(format!("https://v/{id}")),
        is_exceptional: true,
    }
}

fn six_steps() -> Vec<String> {
    (1..=6).map(|i| format!("step {i}")).collect()
}

/// Sequencer whose hook records the id of every settled listing.
fn recording() -> (AcquisitionSequencer, Arc<Mutex<Vec<String>>>) {
    let settled = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&settled);
    let seq = AcquisitionSequencer::new(
        SequencerCfg::default(),
        Arc::new(move |l: &Listing| sink.lock().push(l.id.clone())),
    );
    (seq, settled)
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn steps_appear_in_order_then_hook_runs_once() {
    let (seq, settled) = recording();
    seq.start_with_script(listing("a"), six_steps()).unwrap();

    advance(650).await;
    let st = seq.status();
    assert_eq!(st.phase, Phase::Running { cursor: 2 });
    assert_eq!(st.log, vec!["step 1", "step 2"]);
    assert_eq!(st.steps_total, 6);

    advance(1_200).await;
    let st = seq.status();
    assert_eq!(st.phase, Phase::Settling);
    assert_eq!(st.log, six_steps());
    assert!(settled.lock().is_empty());

    advance(800).await;
    assert_eq!(*settled.lock(), vec!["a".to_string()]);
    let st = seq.status();
    assert_eq!(st.phase, Phase::Inactive);
    assert!(st.log.is_empty());
    assert!(st.listing_id.is_none());

    advance(5_000).await;
    assert_eq!(settled.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_run_stops_steps_and_hook() {
    let (seq, settled) = recording();
    let handle = seq.start_with_script(listing("a"), six_steps()).unwrap();

    advance(650).await;
    assert!(handle.is_active());
    assert!(handle.cancel());
    assert!(!handle.is_active());
    assert_eq!(seq.status().phase, Phase::Inactive);

    advance(5_000).await;
    assert!(settled.lock().is_empty());
    assert!(seq.status().log.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_while_settling_skips_hook() {
    let (seq, settled) = recording();
    seq.start_with_script(listing("a"), six_steps()).unwrap();

    advance(1_900).await;
    assert_eq!(seq.status().phase, Phase::Settling);
    assert!(seq.cancel_active());
    assert!(!seq.cancel_active());

    advance(2_000).await;
    assert!(settled.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_while_busy() {
    let (seq, settled) = recording();
    seq.start_with_script(listing("a"), six_steps()).unwrap();

    let err = seq
        .start_with_script(listing("b"), six_steps())
        .err()
        .expect("second start must be rejected");
    assert_eq!(
        err,
        AcquireError::Busy {
            active: "a".to_string()
        }
    );

    advance(300).await;
    // Still rejected during settle.
    advance(1_550).await;
    assert_eq!(seq.status().phase, Phase::Settling);
    assert!(seq.start(listing("b")).is_err());

    advance(800).await;
    assert!(!seq.is_busy());
    seq.start_with_script(listing("b"), vec!["only".into()]).unwrap();
    advance(1_200).await;
    assert_eq!(*settled.lock(), vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn stale_handle_does_not_touch_new_session() {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    let seq = AcquisitionSequencer::new(
        SequencerCfg::default(),
        Arc::new(move |_: &Listing| {
            h.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let old = seq.start_with_script(listing("a"), six_steps()).unwrap();
    advance(400).await;
    assert!(old.cancel());

    let new = seq.start_with_script(listing("b"), six_steps()).unwrap();
    assert_ne!(old.id(), new.id());
    assert!(!old.cancel(), "old session is gone");
    assert!(new.is_active());

    advance(2_700).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!new.is_active());
    assert!(!new.cancel());
}

#[tokio::test(start_paused = true)]
async fn default_script_runs_eight_steps() {
    let (seq, settled) = recording();
    let handle = seq.start(listing("real-1700000000000-0")).unwrap();
    assert_eq!(handle.listing_id(), "real-1700000000000-0");

    advance(8 * 300 + 50).await;
    let st = seq.status();
    assert_eq!(st.phase, Phase::Settling);
    assert_eq!(st.log.len(), 8);
    assert_eq!(st.log[0], "Target acquired: Vintage Nike Spellou...");

    advance(800).await;
    assert_eq!(settled.lock().len(), 1);
}
