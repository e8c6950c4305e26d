//! Snipe monitor service: binary entrypoint.
//! Boots the Axum HTTP server with the poll loop, dispatcher and sequencer wired in.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;

use snipe_monitor::api::{self, AppState};
use snipe_monitor::config::MonitorConfig;
use snipe_monitor::ingest::providers::{build_analyzer, build_provider};
use snipe_monitor::metrics::Metrics;
use snipe_monitor::{telemetry, Monitor, NotifierMux};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    telemetry::init_tracing();

    let cfg = MonitorConfig::load_default().context("loading monitor config")?;
    let provider = build_provider(&cfg);
    let channel = Arc::new(NotifierMux::from_env());
    tracing::info!(
        provider = provider.name(),
        channels = channel.len(),
        interval_secs = cfg.poll.interval_secs,
        "monitor configured"
    );

    let monitor = Monitor::new(&cfg, provider, channel);
    if cfg.poll.auto_arm {
        monitor.scheduler.arm_current();
    }

    let metrics = Metrics::init()?;
    let state = AppState::new(monitor).with_analyzer(build_analyzer(&cfg));
    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
