pub mod clock;
mod fixed_window;
mod leaky_bucket;
mod sliding_counter;
mod sliding_log;
mod store;
mod token_bucket;

use crate::error::LimitError;
use fixed_window::FixedWindowLimiter;
use leaky_bucket::LeakyBucketLimiter;
use serde::{Deserialize, Serialize};
use sliding_counter::SlidingCounterLimiter;
use sliding_log::SlidingLogLimiter;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use token_bucket::TokenBucketLimiter;

/// The closed set of admission algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    TokenBucket,
    LeakyBucket,
    FixedWindowCounter,
    SlidingWindowLog,
    SlidingWindowCounter,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::TokenBucket,
        Algorithm::LeakyBucket,
        Algorithm::FixedWindowCounter,
        Algorithm::SlidingWindowLog,
        Algorithm::SlidingWindowCounter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::TokenBucket => "token_bucket",
            Algorithm::LeakyBucket => "leaky_bucket",
            Algorithm::FixedWindowCounter => "fixed_window_counter",
            Algorithm::SlidingWindowLog => "sliding_window_log",
            Algorithm::SlidingWindowCounter => "sliding_window_counter",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = LimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "token_bucket" => Ok(Algorithm::TokenBucket),
            "leaky_bucket" => Ok(Algorithm::LeakyBucket),
            "fixed_window_counter" => Ok(Algorithm::FixedWindowCounter),
            "sliding_window_log" => Ok(Algorithm::SlidingWindowLog),
            "sliding_window_counter" => Ok(Algorithm::SlidingWindowCounter),
            _ => Err(LimitError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Per-call configuration. The engine caches none of it: every call carries
/// the full record, and each algorithm validates the fields it needs before
/// touching any state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitConfig {
    pub algorithm: Algorithm,

    /// Max admissions per window (window algorithms).
    #[serde(default)]
    pub limit: Option<u64>,

    /// Window size in seconds (window algorithms).
    #[serde(default)]
    pub window_seconds: Option<u64>,

    /// Bucket size (token and leaky buckets).
    #[serde(default)]
    pub capacity: Option<u64>,

    /// Units per second: token refill for the token bucket, drain rate for
    /// the leaky bucket.
    #[serde(default)]
    pub refill_rate: Option<f64>,

    /// Token bucket only. When set, tokens are capped at
    /// `max(refill_rate * 60, capacity)` instead of `capacity`, reproducing
    /// the legacy accounting of the system this replaces.
    #[serde(default)]
    pub compat_refill_cap: bool,
}

impl LimitConfig {
    /// Window-algorithm config: `limit` admissions per `window_seconds`.
    pub fn windowed(algorithm: Algorithm, limit: u64, window_seconds: u64) -> Self {
        Self {
            algorithm,
            limit: Some(limit),
            window_seconds: Some(window_seconds),
            capacity: None,
            refill_rate: None,
            compat_refill_cap: false,
        }
    }

    /// Bucket-algorithm config: `capacity` units, `refill_rate` per second.
    pub fn bucket(algorithm: Algorithm, capacity: u64, refill_rate: f64) -> Self {
        Self {
            algorithm,
            limit: None,
            window_seconds: None,
            capacity: Some(capacity),
            refill_rate: Some(refill_rate),
            compat_refill_cap: false,
        }
    }

    /// Check the fields the chosen algorithm requires, without touching any
    /// state.
    pub fn validate(&self) -> Result<(), LimitError> {
        match self.algorithm {
            Algorithm::TokenBucket | Algorithm::LeakyBucket => self.bucket_params().map(|_| ()),
            Algorithm::FixedWindowCounter
            | Algorithm::SlidingWindowLog
            | Algorithm::SlidingWindowCounter => self.window_params().map(|_| ()),
        }
    }

    pub(crate) fn window_params(&self) -> Result<WindowParams, LimitError> {
        let limit = match self.limit {
            Some(n) if n > 0 => n,
            _ => {
                return Err(LimitError::InvalidConfig(format!(
                    "{} requires a positive limit",
                    self.algorithm
                )))
            }
        };
        let window_seconds = match self.window_seconds {
            Some(n) if n > 0 => n,
            _ => {
                return Err(LimitError::InvalidConfig(format!(
                    "{} requires a positive window_seconds",
                    self.algorithm
                )))
            }
        };
        Ok(WindowParams {
            limit,
            window_ms: window_seconds * 1000,
        })
    }

    pub(crate) fn bucket_params(&self) -> Result<BucketParams, LimitError> {
        let capacity = match self.capacity {
            Some(n) if n > 0 => n,
            _ => {
                return Err(LimitError::InvalidConfig(format!(
                    "{} requires a positive capacity",
                    self.algorithm
                )))
            }
        };
        let refill_rate = match self.refill_rate {
            Some(r) if r > 0.0 && r.is_finite() => r,
            _ => {
                return Err(LimitError::InvalidConfig(format!(
                    "{} requires a positive refill_rate",
                    self.algorithm
                )))
            }
        };
        Ok(BucketParams {
            capacity,
            refill_rate,
            compat_refill_cap: self.compat_refill_cap,
        })
    }
}

/// Validated view for the three window algorithms.
pub(crate) struct WindowParams {
    pub limit: u64,
    pub window_ms: u64,
}

/// Validated view for the two bucket algorithms.
pub(crate) struct BucketParams {
    pub capacity: u64,
    pub refill_rate: f64,
    pub compat_refill_cap: bool,
}

/// The uniform result of one admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub admitted: bool,
    /// Best-effort budget remaining after this call; zero when rejected.
    pub remaining: u64,
    /// Advisory delay until the next admission is likely possible; zero
    /// when admitted, at least 1 when rejected.
    pub retry_after_seconds: u64,
    pub message: &'static str,
}

impl Decision {
    pub(crate) fn admit(remaining: u64) -> Self {
        Self {
            admitted: true,
            remaining,
            retry_after_seconds: 0,
            message: "request allowed",
        }
    }

    pub(crate) fn reject(retry_after_seconds: u64, message: &'static str) -> Self {
        Self {
            admitted: false,
            remaining: 0,
            retry_after_seconds,
            message,
        }
    }
}

/// Dispatch facade over the five strategies. Each strategy owns a
/// concurrent key → state map; the facade routes by the algorithm tag in
/// the per-call config and adds no locking of its own.
pub struct RateLimitEngine {
    token_bucket: TokenBucketLimiter,
    leaky_bucket: LeakyBucketLimiter,
    fixed_window: FixedWindowLimiter,
    sliding_log: SlidingLogLimiter,
    sliding_counter: SlidingCounterLimiter,
}

impl Default for RateLimitEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitEngine {
    pub fn new() -> Self {
        Self {
            token_bucket: TokenBucketLimiter::new(),
            leaky_bucket: LeakyBucketLimiter::new(),
            fixed_window: FixedWindowLimiter::new(),
            sliding_log: SlidingLogLimiter::new(),
            sliding_counter: SlidingCounterLimiter::new(),
        }
    }

    /// Decide admission for `key` under `config` at the current wall clock.
    pub fn try_acquire(&self, key: &str, config: &LimitConfig) -> Result<Decision, LimitError> {
        self.try_acquire_at(key, config, clock::now_ms())
    }

    /// Decide admission at an explicit timestamp. Validation happens before
    /// any state is created or mutated; an invalid config leaves the maps
    /// untouched.
    pub fn try_acquire_at(
        &self,
        key: &str,
        config: &LimitConfig,
        now_ms: u64,
    ) -> Result<Decision, LimitError> {
        if key.is_empty() {
            return Err(LimitError::InvalidConfig("key must be non-empty".into()));
        }
        let decision = match config.algorithm {
            Algorithm::TokenBucket => {
                self.token_bucket
                    .try_acquire_at(key, &config.bucket_params()?, now_ms)
            }
            Algorithm::LeakyBucket => {
                self.leaky_bucket
                    .try_acquire_at(key, &config.bucket_params()?, now_ms)
            }
            Algorithm::FixedWindowCounter => {
                self.fixed_window
                    .try_acquire_at(key, &config.window_params()?, now_ms)
            }
            Algorithm::SlidingWindowLog => {
                self.sliding_log
                    .try_acquire_at(key, &config.window_params()?, now_ms)
            }
            Algorithm::SlidingWindowCounter => {
                self.sliding_counter
                    .try_acquire_at(key, &config.window_params()?, now_ms)
            }
        };
        Ok(decision)
    }

    /// Drop `key`'s state for one strategy. Absent keys are a silent no-op;
    /// the next acquire starts from fresh state.
    pub fn reset(&self, key: &str, algorithm: Algorithm) {
        match algorithm {
            Algorithm::TokenBucket => self.token_bucket.reset(key),
            Algorithm::LeakyBucket => self.leaky_bucket.reset(key),
            Algorithm::FixedWindowCounter => self.fixed_window.reset(key),
            Algorithm::SlidingWindowLog => self.sliding_log.reset(key),
            Algorithm::SlidingWindowCounter => self.sliding_counter.reset(key),
        }
    }

    /// Drop `key`'s state across all five strategies.
    pub fn reset_all(&self, key: &str) {
        for algorithm in Algorithm::ALL {
            self.reset(key, algorithm);
        }
    }

    /// Tracked key count per strategy, for the readiness endpoint.
    pub fn key_counts(&self) -> [(&'static str, usize); 5] {
        [
            (Algorithm::TokenBucket.as_str(), self.token_bucket.len()),
            (Algorithm::LeakyBucket.as_str(), self.leaky_bucket.len()),
            (
                Algorithm::FixedWindowCounter.as_str(),
                self.fixed_window.len(),
            ),
            (Algorithm::SlidingWindowLog.as_str(), self.sliding_log.len()),
            (
                Algorithm::SlidingWindowCounter.as_str(),
                self.sliding_counter.len(),
            ),
        ]
    }

    /// Remove entries idle for at least `expire_ms` from every strategy map.
    pub fn evict_idle(&self, now_ms: u64, expire_ms: u64) {
        self.token_bucket.evict_idle(now_ms, expire_ms);
        self.leaky_bucket.evict_idle(now_ms, expire_ms);
        self.fixed_window.evict_idle(now_ms, expire_ms);
        self.sliding_log.evict_idle(now_ms, expire_ms);
        self.sliding_counter.evict_idle(now_ms, expire_ms);
    }

    /// Spawn a background task that periodically evicts idle keys so the
    /// maps stay bounded under dynamic-key workloads (per-user, per-IP).
    /// Call once from the service after construction; the engine itself
    /// never spawns work.
    pub fn start_eviction(self: &Arc<Self>, interval: Duration, idle_expire: Duration) {
        let engine = Arc::clone(self);
        let expire_ms = idle_expire.as_millis() as u64;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                engine.evict_idle(clock::now_ms(), expire_ms);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    #[test]
    fn test_algorithm_tag_round_trip() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.as_str().parse::<Algorithm>().unwrap(), algorithm);
        }
    }

    #[test]
    fn test_unknown_algorithm_tag() {
        let err = "token-bucket".parse::<Algorithm>().unwrap_err();
        assert_eq!(err, LimitError::UnknownAlgorithm("token-bucket".into()));
    }

    #[test]
    fn test_missing_fields_rejected_per_algorithm() {
        let engine = RateLimitEngine::new();

        // Window algorithms need limit + window_seconds.
        for algorithm in [
            Algorithm::FixedWindowCounter,
            Algorithm::SlidingWindowLog,
            Algorithm::SlidingWindowCounter,
        ] {
            let cfg = LimitConfig::bucket(algorithm, 5, 1.0);
            assert!(matches!(
                engine.try_acquire_at("k", &cfg, T0),
                Err(LimitError::InvalidConfig(_))
            ));
        }

        // Bucket algorithms need capacity + refill_rate.
        for algorithm in [Algorithm::TokenBucket, Algorithm::LeakyBucket] {
            let cfg = LimitConfig::windowed(algorithm, 100, 60);
            assert!(matches!(
                engine.try_acquire_at("k", &cfg, T0),
                Err(LimitError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_nonpositive_fields_rejected() {
        let engine = RateLimitEngine::new();

        let zero_limit = LimitConfig::windowed(Algorithm::FixedWindowCounter, 0, 60);
        assert!(engine.try_acquire_at("k", &zero_limit, T0).is_err());

        let zero_window = LimitConfig::windowed(Algorithm::SlidingWindowLog, 10, 0);
        assert!(engine.try_acquire_at("k", &zero_window, T0).is_err());

        let zero_rate = LimitConfig::bucket(Algorithm::TokenBucket, 5, 0.0);
        assert!(engine.try_acquire_at("k", &zero_rate, T0).is_err());

        let nan_rate = LimitConfig::bucket(Algorithm::LeakyBucket, 5, f64::NAN);
        assert!(engine.try_acquire_at("k", &nan_rate, T0).is_err());
    }

    #[test]
    fn test_invalid_config_mutates_no_state() {
        let engine = RateLimitEngine::new();
        let bad = LimitConfig::windowed(Algorithm::FixedWindowCounter, 0, 60);
        let _ = engine.try_acquire_at("k", &bad, T0);
        assert!(engine.key_counts().iter().all(|(_, n)| *n == 0));
    }

    #[test]
    fn test_empty_key_rejected() {
        let engine = RateLimitEngine::new();
        let cfg = LimitConfig::bucket(Algorithm::TokenBucket, 5, 1.0);
        assert!(matches!(
            engine.try_acquire_at("", &cfg, T0),
            Err(LimitError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_admitted_iff_zero_retry() {
        let engine = RateLimitEngine::new();
        let cfg = LimitConfig::windowed(Algorithm::FixedWindowCounter, 2, 60);
        for _ in 0..5 {
            let d = engine.try_acquire_at("k", &cfg, T0).unwrap();
            assert_eq!(d.admitted, d.retry_after_seconds == 0);
        }
    }

    #[test]
    fn test_same_key_isolated_across_algorithms() {
        let engine = RateLimitEngine::new();
        let fixed = LimitConfig::windowed(Algorithm::FixedWindowCounter, 1, 60);
        let log = LimitConfig::windowed(Algorithm::SlidingWindowLog, 1, 60);

        assert!(engine.try_acquire_at("k", &fixed, T0).unwrap().admitted);
        assert!(!engine.try_acquire_at("k", &fixed, T0).unwrap().admitted);
        // The sliding log keeps its own state for the same key.
        assert!(engine.try_acquire_at("k", &log, T0).unwrap().admitted);
    }

    #[test]
    fn test_reset_restores_fresh_state() {
        let engine = RateLimitEngine::new();
        let cfg = LimitConfig::bucket(Algorithm::TokenBucket, 2, 1.0);

        assert!(engine.try_acquire_at("k", &cfg, T0).unwrap().admitted);
        assert!(engine.try_acquire_at("k", &cfg, T0).unwrap().admitted);
        assert!(!engine.try_acquire_at("k", &cfg, T0).unwrap().admitted);

        engine.reset("k", Algorithm::TokenBucket);

        // Identical to the first call after process start: full bucket.
        let d = engine.try_acquire_at("k", &cfg, T0).unwrap();
        assert!(d.admitted);
        assert_eq!(d.remaining, 1);
    }

    #[test]
    fn test_reset_all_clears_every_strategy() {
        let engine = RateLimitEngine::new();
        let token = LimitConfig::bucket(Algorithm::TokenBucket, 1, 1.0);
        let leaky = LimitConfig::bucket(Algorithm::LeakyBucket, 1, 1.0);
        let fixed = LimitConfig::windowed(Algorithm::FixedWindowCounter, 1, 60);
        let log = LimitConfig::windowed(Algorithm::SlidingWindowLog, 1, 60);
        let counter = LimitConfig::windowed(Algorithm::SlidingWindowCounter, 1, 60);

        for cfg in [&token, &leaky, &fixed, &log, &counter] {
            engine.try_acquire_at("k", cfg, T0).unwrap();
        }
        assert!(engine.key_counts().iter().all(|(_, n)| *n == 1));

        engine.reset_all("k");
        assert!(engine.key_counts().iter().all(|(_, n)| *n == 0));
    }

    #[test]
    fn test_reset_absent_key_is_noop() {
        let engine = RateLimitEngine::new();
        engine.reset("ghost", Algorithm::LeakyBucket);
        engine.reset_all("ghost");
    }

    #[test]
    fn test_evict_idle_drops_stale_keys_across_strategies() {
        let engine = RateLimitEngine::new();
        let cfg = LimitConfig::windowed(Algorithm::SlidingWindowCounter, 10, 60);

        engine.try_acquire_at("stale", &cfg, T0).unwrap();
        engine
            .try_acquire_at("active", &cfg, T0 + 400_000)
            .unwrap();

        engine.evict_idle(T0 + 420_000, 300_000);

        let counts: Vec<usize> = engine.key_counts().iter().map(|(_, n)| *n).collect();
        assert_eq!(counts, vec![0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_decision_serializes_camel_case() {
        let d = Decision::reject(7, "token bucket exhausted");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["retryAfterSeconds"], 7);
        assert_eq!(json["admitted"], false);
    }
}
