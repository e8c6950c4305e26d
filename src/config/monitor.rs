// src/config/monitor.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::ingest::types::FilterCriteria;
use crate::ingest::ExceptionalRule;

pub const ENV_CONFIG_PATH: &str = "MONITOR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/monitor.toml";

fn default_interval_secs() -> u64 {
    6
}
fn default_capacity() -> usize {
    50
}
fn default_ratio() -> f64 {
    0.8
}
fn default_max_alerts() -> usize {
    1
}
fn default_step_ms() -> u64 {
    300
}
fn default_settle_ms() -> u64 {
    800
}
fn default_ceiling() -> f64 {
    30.0
}
fn default_model() -> String {
    "gemini-3-flash-preview".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSection {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Start polling with the default criteria as soon as the service boots.
    #[serde(default)]
    pub auto_arm: bool,
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            auto_arm: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSection {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_ratio")]
    pub exceptional_ratio: f64,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            exceptional_ratio: default_ratio(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifySection {
    #[serde(default = "default_max_alerts")]
    pub max_alerts_per_merge: usize,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            max_alerts_per_merge: default_max_alerts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionSection {
    #[serde(default = "default_step_ms")]
    pub step_interval_ms: u64,
    #[serde(default = "default_settle_ms")]
    pub settle_delay_ms: u64,
}

impl Default for AcquisitionSection {
    fn default() -> Self {
        Self {
            step_interval_ms: default_step_ms(),
            settle_delay_ms: default_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriteriaSection {
    #[serde(default)]
    pub brands: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default = "default_ceiling")]
    pub price_ceiling: f64,
}

impl Default for CriteriaSection {
    fn default() -> Self {
        Self {
            brands: vec!["Nike".into()],
            categories: vec!["Hoodie".into()],
            sizes: vec!["L".into()],
            price_ceiling: default_ceiling(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    #[default]
    Demo,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from GEMINI_API_KEY.
    #[serde(default = "default_api_key")]
    pub api_key: String,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: default_model(),
            api_key: default_api_key(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub poll: PollSection,
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub notify: NotifySection,
    #[serde(default)]
    pub acquisition: AcquisitionSection,
    #[serde(default)]
    pub criteria: CriteriaSection,
    #[serde(default)]
    pub provider: ProviderSection,
}

impl MonitorConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading monitor config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: MonitorConfig = toml::from_str(s).context("parsing monitor config")?;
        cfg.sanitize();
        cfg.resolve_api_key();
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $MONITOR_CONFIG_PATH
    /// 2) config/monitor.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from_file(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from_file(&default_p);
        }
        let mut cfg = Self::default();
        cfg.resolve_api_key();
        Ok(cfg)
    }

    fn sanitize(&mut self) {
        if self.poll.interval_secs == 0 {
            self.poll.interval_secs = default_interval_secs();
        }
        if self.feed.capacity == 0 {
            self.feed.capacity = default_capacity();
        }
        let r = self.feed.exceptional_ratio;
        if !(r.is_finite() && r > 0.0 && r <= 1.0) {
            self.feed.exceptional_ratio = default_ratio();
        }
        if self.acquisition.step_interval_ms == 0 {
            self.acquisition.step_interval_ms = default_step_ms();
        }
        let c = self.criteria.price_ceiling;
        if !(c.is_finite() && c >= 0.0) {
            self.criteria.price_ceiling = default_ceiling();
        }
    }

    /// A missing env key is not an error here: the provider reports it per query.
    fn resolve_api_key(&mut self) {
        if self.provider.api_key.trim().eq_ignore_ascii_case("env") {
            self.provider.api_key = env::var("GEMINI_API_KEY").unwrap_or_default();
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_secs)
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.acquisition.step_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.acquisition.settle_delay_ms)
    }

    pub fn exceptional_rule(&self) -> ExceptionalRule {
        ExceptionalRule {
            ratio: self.feed.exceptional_ratio,
        }
    }

    pub fn default_criteria(&self) -> FilterCriteria {
        FilterCriteria::new(self.criteria.price_ceiling)
            .with_brands(clean_list(&self.criteria.brands))
            .with_categories(clean_list(&self.criteria.categories))
            .with_sizes(clean_list(&self.criteria.sizes))
    }
}

fn clean_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
