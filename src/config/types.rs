use crate::engine::{Algorithm, LimitConfig};
use serde::{Deserialize, Serialize};

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Named limit rules guarding the demo routes. Requests are matched by
    /// longest path prefix.
    #[serde(default = "default_rules")]
    pub rules: Vec<LimitRule>,

    #[serde(default)]
    pub eviction: EvictionConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            eviction: EvictionConfig::default(),
        }
    }
}

/// One guarded route: a path prefix, a key derivation mode, and the
/// per-call limit record handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitRule {
    pub name: String,

    #[serde(default = "default_rule_path")]
    pub path: String,

    /// Key derivation mode:
    /// - `"client_ip"` (default): per-client-IP counter
    /// - `"header"`:    value of the header named by `key_name`
    ///   (falls back to client IP when absent)
    /// - `"path"`:      per-URI-path counter (caution: dynamic paths cause
    ///   unbounded keys)
    /// - `"literal"`:   the fixed string in `key_name`, one shared counter
    #[serde(default = "default_key_source")]
    pub key: String,

    /// Header name for `"header"`, fixed value for `"literal"`.
    #[serde(default)]
    pub key_name: Option<String>,

    #[serde(flatten)]
    pub limit: LimitConfig,
}

fn default_rule_path() -> String {
    "/demo".to_string()
}

fn default_key_source() -> String {
    "client_ip".to_string()
}

fn default_rules() -> Vec<LimitRule> {
    vec![
        LimitRule {
            name: "demo-burst".to_string(),
            path: "/demo".to_string(),
            key: default_key_source(),
            key_name: None,
            limit: LimitConfig::bucket(Algorithm::TokenBucket, 5, 1.0),
        },
        LimitRule {
            name: "demo-window".to_string(),
            path: "/demo/window".to_string(),
            key: default_key_source(),
            key_name: None,
            limit: LimitConfig::windowed(Algorithm::SlidingWindowLog, 10, 60),
        },
    ]
}

/// Background idle-key eviction across the strategy maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictionConfig {
    #[serde(default = "default_eviction_enabled")]
    pub enabled: bool,

    /// How often the eviction pass runs (seconds).
    #[serde(default = "default_eviction_interval")]
    pub interval_secs: u64,

    /// Keys untouched for this long are dropped (seconds).
    #[serde(default = "default_eviction_idle")]
    pub idle_expire_secs: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            enabled: default_eviction_enabled(),
            interval_secs: default_eviction_interval(),
            idle_expire_secs: default_eviction_idle(),
        }
    }
}

fn default_eviction_enabled() -> bool {
    true
}

fn default_eviction_interval() -> u64 {
    60
}

fn default_eviction_idle() -> u64 {
    300
}
