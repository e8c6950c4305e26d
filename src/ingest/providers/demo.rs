use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rand::Rng;

use crate::error::ProviderError;
use crate::ingest::types::{FilterCriteria, ListingProvider, RawListing, RawPrice};

const BRANDS: &[&str] = &[
    "Nike",
    "Adidas",
    "Carhartt",
    "Ralph Lauren",
    "Stussy",
    "Arc'teryx",
    "Stone Island",
];
const ITEMS: &[&str] = &[
    "Vintage Spellout Hoodie",
    "Double Knee Pants",
    "8 Ball Tee",
    "Beta LT Jacket",
    "Logo Cap",
    "Track Jacket",
    "Crewneck Sweatshirt",
];
const CONDITIONS: &[&str] = &["Neuf avec étiquette", "Très bon état", "Bon état", "Satisfaisant"];

/// Offline provider producing plausible listings for the selected brands.
/// Every generated listing carries a fresh link, so each batch is novel.
pub struct DemoProvider {
    batch_size: usize,
    seq: AtomicU64,
}

impl DemoProvider {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            seq: AtomicU64::new(0),
        }
    }
}

impl Default for DemoProvider {
    fn default() -> Self {
        Self::new(4)
    }
}

#[async_trait]
impl ListingProvider for DemoProvider {
    async fn query(&self, criteria: &FilterCriteria) -> Result<Vec<RawListing>, ProviderError> {
        let brands: Vec<&str> = if criteria.brands.is_empty() {
            BRANDS.to_vec()
        } else {
            criteria.brands.iter().map(String::as_str).collect()
        };
        let ceiling = criteria.price_ceiling.max(1.0);

        let mut rng = rand::rng();
        let out = (0..self.batch_size)
            .map(|_| {
                let n = self.seq.fetch_add(1, Ordering::Relaxed);
                let brand = brands[rng.random_range(0..brands.len())];
                let item = ITEMS[rng.random_range(0..ITEMS.len())];
                let price = (rng.random_range(0.3..1.0) * ceiling * 2.0).round() / 2.0;
                RawListing {
                    title: Some(format!("{brand} {item}")),
                    price: Some(RawPrice::Number(price)),
                    link: Some(format!("https://www.vinted.fr/items/demo-{n}")),
                    description: Some(
                        CONDITIONS[rng.random_range(0..CONDITIONS.len())].to_string(),
                    ),
                }
            })
            .collect();
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "demo"
    }
}

/// Provider used when monitoring has no backend configured.
pub struct DisabledProvider;

#[async_trait]
impl ListingProvider for DisabledProvider {
    async fn query(&self, _criteria: &FilterCriteria) -> Result<Vec<RawListing>, ProviderError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}
