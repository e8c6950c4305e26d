// src/ingest/providers/mod.rs
pub mod demo;
pub mod gemini;

use std::sync::Arc;

use crate::analyze::{DealAnalyzer, DisabledAnalyzer};
use crate::config::{MonitorConfig, ProviderKind};
use crate::ingest::types::ListingProvider;

pub use demo::{DemoProvider, DisabledProvider};
pub use gemini::GeminiProvider;

/// Build the configured provider. Falls back to the disabled provider if the
/// HTTP client cannot be constructed.
pub fn build_provider(cfg: &MonitorConfig) -> Arc<dyn ListingProvider> {
    match cfg.provider.kind {
        ProviderKind::Gemini => {
            match GeminiProvider::new(cfg.provider.api_key.clone(), cfg.provider.model.clone()) {
                Ok(p) => Arc::new(p),
                Err(e) => {
                    tracing::warn!(error = %e, "gemini provider unavailable, polling disabled");
                    Arc::new(DisabledProvider)
                }
            }
        }
        ProviderKind::Demo => Arc::new(DemoProvider::default()),
        ProviderKind::Disabled => Arc::new(DisabledProvider),
    }
}

/// Deal analysis needs the search-grounded backend; other provider kinds get
/// the disabled analyzer, which always answers with the failure result.
pub fn build_analyzer(cfg: &MonitorConfig) -> Arc<dyn DealAnalyzer> {
    match cfg.provider.kind {
        ProviderKind::Gemini => {
            match GeminiProvider::new(cfg.provider.api_key.clone(), cfg.provider.model.clone()) {
                Ok(p) => Arc::new(p),
                Err(e) => {
                    tracing::warn!(error = %e, "gemini analyzer unavailable");
                    Arc::new(DisabledAnalyzer)
                }
            }
        }
        ProviderKind::Demo | ProviderKind::Disabled => Arc::new(DisabledAnalyzer),
    }
}
