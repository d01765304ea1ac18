use crate::config::ServiceConfig;
use crate::engine::RateLimitEngine;
use crate::metrics::Metrics;
use anyhow::Result;
use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared service state handed to every connection task. Cheap to clone;
/// the config snapshot swaps atomically on reload while in-flight requests
/// keep reading their loaded guard.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RateLimitEngine>,
    pub config: Arc<ArcSwap<ServiceConfig>>,
    pub metrics: Metrics,
    config_path: Arc<PathBuf>,
}

impl AppState {
    pub fn new(config: ServiceConfig, config_path: PathBuf, metrics: Metrics) -> Self {
        Self {
            engine: Arc::new(RateLimitEngine::new()),
            config: Arc::new(ArcSwap::from_pointee(config)),
            metrics,
            config_path: Arc::new(config_path),
        }
    }

    /// Re-read the config file and swap in the new snapshot. Returns the
    /// rule count of the fresh config.
    pub fn reload_config(&self) -> Result<usize> {
        let fresh = ServiceConfig::load(&self.config_path)?;
        let rules = fresh.rules.len();
        self.config.store(Arc::new(fresh));
        tracing::info!("config reloaded, rules={}", rules);
        Ok(rules)
    }
}
