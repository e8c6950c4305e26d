//! Deal analysis: ask a search-grounded model whether a listing is worth buying.
//!
//! Callers go through [`analyze_or_fallback`], which never fails: any provider
//! error turns into [`DealAnalysis::failed`].

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::ingest::strip_code_fences;

/// Base64 image sent along with the description.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub data_base64: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DealQuery {
    pub description: String,
    pub price: f64,
    pub image: Option<InlineImage>,
}

impl DealQuery {
    pub fn text(description: impl Into<String>, price: f64) -> Self {
        Self {
            description: description.into(),
            price,
            image: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchLink {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DealAnalysis {
    /// 0..=100
    pub score: u8,
    pub estimated_value: f64,
    pub reasoning: String,
    pub is_good_deal: bool,
    pub search_links: Vec<SearchLink>,
}

impl DealAnalysis {
    /// Result shown when the analysis could not be produced.
    pub fn failed() -> Self {
        Self {
            score: 0,
            estimated_value: 0.0,
            reasoning: "Analysis failed. Try again.".to_string(),
            is_good_deal: false,
            search_links: Vec::new(),
        }
    }
}

/// Model output as requested in the prompt.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    #[serde(default)]
    score: f64,
    #[serde(default)]
    estimated_value: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    is_good_deal: bool,
}

/// Parse the model's JSON object. An empty body is an error, as is anything
/// that is not an object.
pub fn parse_analysis(text: &str, search_links: Vec<SearchLink>) -> Result<DealAnalysis, ProviderError> {
    let body = strip_code_fences(text);
    if body.is_empty() {
        return Err(ProviderError::Malformed("empty analysis response".into()));
    }
    let value: serde_json::Value = serde_json::from_str(body)?;
    if !value.is_object() {
        return Err(ProviderError::Malformed("expected a JSON object".into()));
    }
    let raw: RawAnalysis = serde_json::from_value(value)?;
    let score = if raw.score.is_finite() {
        raw.score.clamp(0.0, 100.0).round() as u8
    } else {
        0
    };
    Ok(DealAnalysis {
        score,
        estimated_value: if raw.estimated_value.is_finite() {
            raw.estimated_value.max(0.0)
        } else {
            0.0
        },
        reasoning: raw.reasoning.trim().to_string(),
        is_good_deal: raw.is_good_deal,
        search_links,
    })
}

#[async_trait]
pub trait DealAnalyzer: Send + Sync {
    async fn analyze(&self, query: &DealQuery) -> Result<DealAnalysis, ProviderError>;
    fn name(&self) -> &'static str;
}

/// Used when no analysis backend is configured.
pub struct DisabledAnalyzer;

#[async_trait]
impl DealAnalyzer for DisabledAnalyzer {
    async fn analyze(&self, _query: &DealQuery) -> Result<DealAnalysis, ProviderError> {
        Err(ProviderError::Disabled)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

pub async fn analyze_or_fallback(analyzer: &dyn DealAnalyzer, query: &DealQuery) -> DealAnalysis {
    match analyzer.analyze(query).await {
        Ok(a) => {
            tracing::info!(
                analyzer = analyzer.name(),
                score = a.score,
                good = a.is_good_deal,
                "deal analyzed"
            );
            a
        }
        Err(e) => {
            tracing::warn!(analyzer = analyzer.name(), error = %e, "deal analysis failed");
            counter!("analysis_failures_total").increment(1);
            DealAnalysis::failed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_object_is_parsed_and_clamped() {
        let a = parse_analysis(
            "```json\n{\"score\": 130, \"estimatedValue\": 55.5, \"reasoning\": \" Resells well \", \"isGoodDeal\": true}\n```",
            vec![],
        )
        .unwrap();
        assert_eq!(a.score, 100);
        assert_eq!(a.estimated_value, 55.5);
        assert_eq!(a.reasoning, "Resells well");
        assert!(a.is_good_deal);
    }

    #[test]
    fn empty_or_non_object_is_malformed() {
        assert!(matches!(parse_analysis("  ", vec![]), Err(ProviderError::Malformed(_))));
        assert!(matches!(parse_analysis("[1,2]", vec![]), Err(ProviderError::Malformed(_))));
    }

    #[tokio::test]
    async fn disabled_analyzer_yields_failure_result() {
        let a = analyze_or_fallback(&DisabledAnalyzer, &DealQuery::text("Nike hoodie", 15.0)).await;
        assert_eq!(a, DealAnalysis::failed());
        assert_eq!(a.reasoning, "Analysis failed. Try again.");
    }
}
