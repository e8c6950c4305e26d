// src/config/mod.rs
pub mod monitor;

pub use monitor::{
    AcquisitionSection, CriteriaSection, FeedSection, MonitorConfig, NotifySection, PollSection,
    ProviderKind, ProviderSection,
};
