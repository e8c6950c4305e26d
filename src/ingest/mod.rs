// src/ingest/mod.rs
pub mod providers;
pub mod scheduler;
pub mod types;

use crate::error::ProviderError;
use crate::ingest::types::{Condition, FilterCriteria, Listing, RawListing};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poll_cycles_total", "Poll cycles that reached the provider.");
        describe_counter!(
            "poll_skipped_total",
            "Cycles skipped because a query was still in flight."
        );
        describe_counter!(
            "poll_stale_total",
            "Provider responses discarded after disarm or criteria change."
        );
        describe_counter!(
            "provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_counter!("feed_accepted_total", "Listings accepted into the feed.");
        describe_gauge!("feed_len", "Listings currently held by the feed.");
        describe_counter!(
            "analysis_failures_total",
            "Deal analyses answered with the failure result."
        );
    });
}

/// Fraction of the ceiling below which a listing counts as exceptional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExceptionalRule {
    pub ratio: f64,
}

impl Default for ExceptionalRule {
    fn default() -> Self {
        Self { ratio: 0.8 }
    }
}

impl ExceptionalRule {
    pub fn is_exceptional(&self, price: f64, ceiling: f64) -> bool {
        price < ceiling * self.ratio
    }
}

/// Normalize a listing title: decode entities, collapse whitespace, cap length.
pub fn normalize_title(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("static regex"));
    let mut out = re_ws.replace_all(&decoded, " ").trim().to_string();

    if out.chars().count() > 200 {
        out = out.chars().take(200).collect();
    }
    out
}

/// Guess the condition from free text. Handles French and English listings.
pub fn detect_condition(text: &str) -> Condition {
    let lower = text.to_lowercase();
    if lower.contains("neuf") || lower.contains("new") || lower.contains("tag") {
        Condition::New
    } else if lower.contains("très bon") || lower.contains("very good") {
        Condition::VeryGood
    } else if lower.contains("bon") || lower.contains("good") {
        Condition::Good
    } else {
        Condition::Fair
    }
}

/// Remove markdown code fences some backends wrap around JSON.
pub fn strip_code_fences(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse a provider text body into raw listings.
/// Empty body means "nothing found"; anything that is not a JSON array is malformed.
pub fn parse_listing_array(text: &str) -> Result<Vec<RawListing>, ProviderError> {
    let body = strip_code_fences(text);
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let value: serde_json::Value = serde_json::from_str(body)?;
    if !value.is_array() {
        return Err(ProviderError::Malformed(format!(
            "expected JSON array, got {}",
            kind_of(&value)
        )));
    }
    Ok(serde_json::from_value(value)?)
}

fn kind_of(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Process-wide listing sequence; keeps ids unique across cycles that share a millisecond.
static LISTING_SEQ: AtomicU64 = AtomicU64::new(0);

/// Map a provider batch into canonical listings for the given snapshot.
pub fn map_batch(
    raw: Vec<RawListing>,
    criteria: &FilterCriteria,
    rule: ExceptionalRule,
    now: DateTime<Utc>,
) -> Vec<Listing> {
    let stamp = now.timestamp_millis();
    raw.into_iter()
        .enumerate()
        .map(|(index, item)| {
            let title = item
                .title
                .as_deref()
                .map(normalize_title)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| format!("Item {index}"));
            let price = item
                .price
                .as_ref()
                .and_then(|p| p.amount())
                .filter(|p| p.is_finite())
                .unwrap_or(0.0)
                .max(0.0);
            let brand = match criteria.only_brand() {
                Some(b) => b.to_string(),
                None => item
                    .title
                    .as_deref()
                    .and_then(|t| t.split_whitespace().next())
                    .unwrap_or("Unknown")
                    .to_string(),
            };
            let size = criteria.only_size().unwrap_or("See Listing").to_string();
            let source_link = item
                .link
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty());

            Listing {
                id: format!(
                    "real-{stamp}-{}",
                    LISTING_SEQ.fetch_add(1, Ordering::Relaxed)
                ),
                title,
                brand,
                size,
                price,
                currency: "EUR".to_string(),
                condition: detect_condition(item.description.as_deref().unwrap_or("")),
                discovered_at: now,
                source_link,
                is_exceptional: rule.is_exceptional(price, criteria.price_ceiling),
            }
        })
        .collect()
}
