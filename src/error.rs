// src/error.rs
use thiserror::Error;

/// Failures of a single provider query. Always transient: the poll loop logs
/// them and treats the cycle as an empty batch.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("provider api key missing")]
    MissingApiKey,
    #[error("provider disabled")]
    Disabled,
    /// Response body could not be read as a listing array.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::Malformed(e.to_string())
    }
}

/// Alert delivery problems. Never propagated past the dispatcher.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification permission denied")]
    PermissionDenied,
    #[error("notifications unsupported on this platform")]
    Unsupported,
    #[error("alert delivery failed: {0}")]
    Delivery(#[from] anyhow::Error),
}

/// Caller-visible rejections from the acquisition sequencer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AcquireError {
    #[error("acquisition already in progress for listing {active}")]
    Busy { active: String },
    #[error("listing {0} is not in the feed")]
    UnknownListing(String),
}

/// Rejected monitor filter.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CriteriaError {
    #[error("price_ceiling must be a non-negative number, got {0}")]
    InvalidCeiling(f64),
}
