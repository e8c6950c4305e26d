// src/telemetry.rs
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "snipe_monitor=info,poll=info,acquire=info,notify=info,warn";

/// Install the global subscriber. `RUST_LOG` overrides the default filter;
/// `MONITOR_LOG_JSON=1` switches to JSON lines. Safe to call more than once
/// (later calls are no-ops, e.g. when the host runtime already installed one).
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var("MONITOR_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };

    if result.is_ok() {
        tracing::debug!(json, "tracing initialized");
    }
}
