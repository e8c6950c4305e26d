// src/operator.rs
//! In-memory operator shell: login name, running stats, last settlement.
//! No real authentication; the name only gates simulated purchases.

use std::sync::Arc;

use parking_lot::RwLock;
use rand::Rng;
use serde::Serialize;

use crate::acquisition::SettlementHook;
use crate::ingest::types::Listing;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorStats {
    pub total_profit: f64,
    pub items_sniped: u32,
    pub active_monitors: u32,
    pub wallet_balance: f64,
}

impl Default for OperatorStats {
    fn default() -> Self {
        Self {
            total_profit: 1240.50,
            items_sniped: 24,
            active_monitors: 3,
            wallet_balance: 450.20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// Nobody logged in; nothing counted.
    LoginRequired { listing_id: String },
    /// Real listing: the shell should open the link.
    OpenLink { listing_id: String, url: String },
    /// No link: purely simulated purchase.
    Simulated { listing_id: String, title: String },
}

#[derive(Debug, Default)]
struct Inner {
    username: Option<String>,
    stats: OperatorStats,
    last_settlement: Option<SettlementOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperatorSnapshot {
    pub username: Option<String>,
    pub stats: OperatorStats,
    pub last_settlement: Option<SettlementOutcome>,
}

#[derive(Debug, Default)]
pub struct OperatorState {
    inner: RwLock<Inner>,
}

impl OperatorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false for a blank name.
    pub fn login(&self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.inner.write().username = Some(name.to_string());
        tracing::info!(user = name, "operator connected");
        true
    }

    pub fn logout(&self) {
        self.inner.write().username = None;
    }

    pub fn username(&self) -> Option<String> {
        self.inner.read().username.clone()
    }

    pub fn snapshot(&self) -> OperatorSnapshot {
        let g = self.inner.read();
        OperatorSnapshot {
            username: g.username.clone(),
            stats: g.stats.clone(),
            last_settlement: g.last_settlement.clone(),
        }
    }

    /// Apply a completed acquisition to the shell state.
    pub fn settle(&self, listing: &Listing) -> SettlementOutcome {
        let mut g = self.inner.write();
        let outcome = if g.username.is_none() {
            SettlementOutcome::LoginRequired {
                listing_id: listing.id.clone(),
            }
        } else if let Some(url) = listing.identity() {
            g.stats.items_sniped += 1;
            g.stats.total_profit += rand::rng().random_range(0.0..15.0);
            SettlementOutcome::OpenLink {
                listing_id: listing.id.clone(),
                url: url.to_string(),
            }
        } else {
            SettlementOutcome::Simulated {
                listing_id: listing.id.clone(),
                title: listing.title.clone(),
            }
        };
        g.last_settlement = Some(outcome.clone());
        outcome
    }
}

/// Settlement hook that forwards completed acquisitions to the shell.
pub struct OperatorSettlement {
    state: Arc<OperatorState>,
}

impl OperatorSettlement {
    pub fn new(state: Arc<OperatorState>) -> Self {
        Self { state }
    }
}

impl SettlementHook for OperatorSettlement {
    fn on_acquired(&self, listing: &Listing) {
        match self.state.settle(listing) {
            SettlementOutcome::LoginRequired { listing_id } => {
                tracing::warn!(target: "acquire", listing = %listing_id, "login required to complete purchase")
            }
            SettlementOutcome::OpenLink { listing_id, url } => {
                tracing::info!(target: "acquire", listing = %listing_id, %url, "open listing")
            }
            SettlementOutcome::Simulated { title, .. } => {
                tracing::info!(target: "acquire", %title, "simulated purchase initiated")
            }
        }
    }
}
