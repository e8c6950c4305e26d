//! Offline demo: polls the demo provider for a few cycles, then runs the
//! checkout sequence on the cheapest listing and prints the step log.

use std::sync::Arc;
use std::time::Duration;

use snipe_monitor::config::MonitorConfig;
use snipe_monitor::ingest::providers::DemoProvider;
use snipe_monitor::notify::LogChannel;
use snipe_monitor::{telemetry, Monitor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let mut cfg = MonitorConfig::load_default()?;
    cfg.poll.interval_secs = 2;

    let monitor = Monitor::new(&cfg, Arc::new(DemoProvider::new(3)), Arc::new(LogChannel));
    monitor.operator.login("demo");
    monitor.dispatcher.enable().await;
    monitor.scheduler.arm_current();

    tokio::time::sleep(Duration::from_secs(5)).await;
    monitor.scheduler.disarm();

    let feed = monitor.feed.snapshot();
    println!("feed: {} listings", feed.len());
    for l in &feed {
        let tag = if l.is_exceptional { "SNIPE" } else { "     " };
        println!("  {tag} {:>6.2}€  {}  [{}]", l.price, l.title, l.id);
    }

    let Some(target) = feed
        .iter()
        .min_by(|a, b| a.price.total_cmp(&b.price))
        .cloned()
    else {
        println!("nothing to acquire");
        return Ok(());
    };

    let handle = monitor.acquire(&target.id)?;
    let mut printed = 0;
    while handle.is_active() {
        let status = monitor.sequencer.status();
        for line in status.log.iter().skip(printed) {
            println!("  > {line}");
        }
        printed = status.log.len();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    println!("settlement: {:?}", monitor.operator.snapshot().last_settlement);
    println!("monitor-demo done");
    Ok(())
}
