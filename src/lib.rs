// src/lib.rs
// Public library surface for the service binary, the demo and integration tests.

pub mod acquisition;
pub mod analyze;
pub mod api;
pub mod config;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod metrics;
pub mod monitor;
pub mod notify;
pub mod operator;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::acquisition::{AcquisitionSequencer, SessionHandle, SettlementHook};
pub use crate::analyze::{DealAnalysis, DealAnalyzer, DealQuery};
pub use crate::api::router;
pub use crate::error::{AcquireError, CriteriaError, NotifyError, ProviderError};
pub use crate::feed::FeedStore;
pub use crate::ingest::scheduler::{CycleOutcome, PollScheduler};
pub use crate::ingest::types::{Condition, FilterCriteria, Listing, ListingProvider, RawListing};
pub use crate::monitor::Monitor;
pub use crate::notify::{AlertChannel, NotificationDispatcher, NotifierMux, Permission};
