// src/ingest/types.rs
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CriteriaError, ProviderError};

/// Item condition as advertised by the seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    New,
    VeryGood,
    Good,
    Fair,
}

/// Canonical listing held by the feed. Never mutated after mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub brand: String,
    pub size: String,
    pub price: f64,
    pub currency: String,
    pub condition: Condition,
    pub discovered_at: DateTime<Utc>,
    pub source_link: Option<String>,
    /// Fixed at mapping time against the ceiling of that cycle.
    pub is_exceptional: bool,
}

impl Listing {
    /// Non-empty link used as dedup identity.
    pub fn identity(&self) -> Option<&str> {
        self.source_link
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }
}

/// Monitor filter. Cycles see it as an immutable snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[serde(default)]
    pub brands: BTreeSet<String>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub sizes: BTreeSet<String>,
    pub price_ceiling: f64,
}

impl FilterCriteria {
    pub fn new(price_ceiling: f64) -> Self {
        Self {
            brands: BTreeSet::new(),
            categories: BTreeSet::new(),
            sizes: BTreeSet::new(),
            price_ceiling,
        }
    }

    pub fn with_brands<I, S>(mut self, brands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.brands = brands.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sizes<I, S>(mut self, sizes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sizes = sizes.into_iter().map(Into::into).collect();
        self
    }

    /// Check the filter before it reaches the poll loop.
    pub fn validate(&self) -> Result<(), CriteriaError> {
        let c = self.price_ceiling;
        if c.is_finite() && c >= 0.0 {
            Ok(())
        } else {
            Err(CriteriaError::InvalidCeiling(c))
        }
    }

    /// The single selected brand, if exactly one is set.
    pub fn only_brand(&self) -> Option<&str> {
        single(&self.brands)
    }

    pub fn only_size(&self) -> Option<&str> {
        single(&self.sizes)
    }
}

fn single(set: &BTreeSet<String>) -> Option<&str> {
    if set.len() == 1 {
        set.iter().next().map(String::as_str)
    } else {
        None
    }
}

/// Price as sent by search backends: usually a number, sometimes a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawPrice {
    Number(f64),
    Text(String),
}

impl RawPrice {
    pub fn amount(&self) -> Option<f64> {
        match self {
            RawPrice::Number(n) => Some(*n),
            RawPrice::Text(s) => {
                let cleaned: String = s
                    .chars()
                    .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
                    .collect();
                // The right-most separator is the decimal one; the other groups thousands.
                let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
                    (Some(dot), Some(comma)) if comma > dot => {
                        cleaned.replace('.', "").replace(',', ".")
                    }
                    (Some(_), Some(_)) => cleaned.replace(',', ""),
                    (None, Some(_)) => cleaned.replace(',', "."),
                    _ => cleaned,
                };
                match normalized.parse() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        tracing::debug!(target: "poll", raw = %s, "unparseable price text");
                        None
                    }
                }
            }
        }
    }
}

/// Provider-shaped listing before mapping. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawListing {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<RawPrice>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[async_trait::async_trait]
pub trait ListingProvider: Send + Sync {
    async fn query(&self, criteria: &FilterCriteria) -> Result<Vec<RawListing>, ProviderError>;
    fn name(&self) -> &'static str;
}
