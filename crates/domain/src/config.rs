//! Runtime configuration — sectioned, serde-defaulted, embedder-supplied.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::SessionType;

/// Top-level configuration for the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle duration after which a session expires.
    #[serde(default = "d_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Candidate-search horizon when assigning a new item.
    #[serde(default = "d_join_window_secs")]
    pub join_window_secs: u64,

    /// Minimum membership confidence to join an existing session.
    #[serde(default = "d_join_min_confidence")]
    pub join_min_confidence: f64,

    /// Debounce between member additions and research start.
    #[serde(default = "d_research_debounce_ms")]
    pub research_debounce_ms: u64,

    /// Period of the expiration sweep task.
    #[serde(default = "d_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Max member-queries dispatched concurrently per session research.
    #[serde(default = "d_research_max_inflight")]
    pub research_max_inflight: usize,

    /// Session-type pairs treated as complementary (both directions).
    #[serde(default = "d_complementary_types")]
    pub complementary_types: Vec<(SessionType, SessionType)>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: d_idle_timeout_secs(),
            join_window_secs: d_join_window_secs(),
            join_min_confidence: d_join_min_confidence(),
            research_debounce_ms: d_research_debounce_ms(),
            sweep_interval_secs: d_sweep_interval_secs(),
            research_max_inflight: d_research_max_inflight(),
            complementary_types: d_complementary_types(),
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn join_window(&self) -> Duration {
        Duration::from_secs(self.join_window_secs)
    }

    pub fn research_debounce(&self) -> Duration {
        Duration::from_millis(self.research_debounce_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// True when the two types may share a session despite differing.
    pub fn are_complementary(&self, a: SessionType, b: SessionType) -> bool {
        self.complementary_types
            .iter()
            .any(|(x, y)| (*x == a && *y == b) || (*x == b && *y == a))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Global cap on in-flight model requests; excess callers wait.
    #[serde(default = "d_max_inflight")]
    pub max_inflight: usize,

    /// Retry budget for rate-limited / transient failures.
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,

    /// Exponential backoff base.
    #[serde(default = "d_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Jitter fraction applied symmetrically around each backoff delay.
    #[serde(default = "d_backoff_jitter")]
    pub backoff_jitter: f64,

    /// TTL of the vision cache.
    #[serde(default = "d_vision_cache_ttl_secs")]
    pub vision_cache_ttl_secs: u64,

    /// Max entries in the vision cache before LRU eviction.
    #[serde(default = "d_vision_cache_cap")]
    pub vision_cache_cap: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            max_inflight: d_max_inflight(),
            max_retries: d_max_retries(),
            backoff_base_ms: d_backoff_base_ms(),
            backoff_jitter: d_backoff_jitter(),
            vision_cache_ttl_secs: d_vision_cache_ttl_secs(),
            vision_cache_cap: d_vision_cache_cap(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Automation dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Minimum spacing between webhook POSTs for one session.
    #[serde(default = "d_rate_limit_secs")]
    pub rate_limit_secs: u64,

    /// Timeout of each webhook request.
    #[serde(default = "d_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Per session-type dispatch rules.
    #[serde(default)]
    pub rules: HashMap<SessionType, AutomationRule>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            rate_limit_secs: d_rate_limit_secs(),
            request_timeout_secs: d_request_timeout_secs(),
            rules: HashMap::new(),
        }
    }
}

impl AutomationConfig {
    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs(self.rate_limit_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRule {
    /// Member count at which dispatch becomes eligible. Must be ≥ 1.
    #[serde(default = "d_trigger_threshold")]
    pub trigger_threshold: u32,

    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "d_true")]
    pub enabled: bool,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_idle_timeout_secs() -> u64 {
    600
}
fn d_join_window_secs() -> u64 {
    1200
}
fn d_join_min_confidence() -> f64 {
    0.6
}
fn d_research_debounce_ms() -> u64 {
    1000
}
fn d_sweep_interval_secs() -> u64 {
    60
}
fn d_research_max_inflight() -> usize {
    2
}
fn d_complementary_types() -> Vec<(SessionType, SessionType)> {
    use SessionType::*;
    vec![
        (HotelResearch, RestaurantResearch),
        (HotelResearch, TravelResearch),
        (RestaurantResearch, TravelResearch),
        (ProductResearch, ServiceResearch),
    ]
}
fn d_max_inflight() -> usize {
    4
}
fn d_max_retries() -> u32 {
    3
}
fn d_backoff_base_ms() -> u64 {
    500
}
fn d_backoff_jitter() -> f64 {
    0.25
}
fn d_vision_cache_ttl_secs() -> u64 {
    120
}
fn d_vision_cache_cap() -> usize {
    128
}
fn d_rate_limit_secs() -> u64 {
    60
}
fn d_request_timeout_secs() -> u64 {
    30
}
fn d_trigger_threshold() -> u32 {
    1
}
fn d_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.session.idle_timeout(), Duration::from_secs(600));
        assert_eq!(cfg.session.join_window(), Duration::from_secs(1200));
        assert_eq!(cfg.session.join_min_confidence, 0.6);
        assert_eq!(cfg.session.research_debounce(), Duration::from_millis(1000));
        assert_eq!(cfg.model.max_inflight, 4);
        assert_eq!(cfg.model.max_retries, 3);
        assert_eq!(cfg.automation.rate_limit(), Duration::from_secs(60));
        assert_eq!(cfg.automation.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn complementary_is_symmetric() {
        let cfg = SessionConfig::default();
        assert!(cfg.are_complementary(SessionType::HotelResearch, SessionType::RestaurantResearch));
        assert!(cfg.are_complementary(SessionType::RestaurantResearch, SessionType::HotelResearch));
        assert!(!cfg.are_complementary(SessionType::HotelResearch, SessionType::AcademicResearch));
    }

    #[test]
    fn empty_json_deserializes_with_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.model.backoff_base_ms, 500);
        assert!(cfg.automation.rules.is_empty());
    }
}
