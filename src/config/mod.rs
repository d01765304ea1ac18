pub mod types;


pub use types::*;

use anyhow::Result;
use std::path::Path;

impl ServiceConfig {
    /// Load configuration from a file (if it exists) and apply environment
    /// variable overrides. When the file does not exist, built-in defaults
    /// are used so the service starts with zero configuration for local
    /// development.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: ServiceConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!("config file not found at {}, using defaults", path.display());
            ServiceConfig::default()
        };

        config.apply_env_overrides();

        config.validate()?;
        tracing::info!("loaded service configuration, rules={}", config.rules.len());
        Ok(config)
    }

    /// Environment variable overrides for operational settings. Limit rules
    /// are managed exclusively through the config file.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("JANUS_EVICTION_ENABLED") {
            if let Ok(b) = v.parse::<bool>() {
                self.eviction.enabled = b;
            }
        }
        if let Ok(v) = std::env::var("JANUS_EVICTION_INTERVAL_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                self.eviction.interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("JANUS_EVICTION_IDLE_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                self.eviction.idle_expire_secs = n;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        for rule in &self.rules {
            if rule.name.is_empty() {
                anyhow::bail!("rule with empty name");
            }
            if !rule.path.starts_with('/') {
                anyhow::bail!("rule '{}': path must start with '/'", rule.name);
            }
            match rule.key.as_str() {
                "client_ip" | "path" => {}
                "header" | "literal" => {
                    if rule.key_name.as_deref().unwrap_or("").is_empty() {
                        anyhow::bail!(
                            "rule '{}': key source '{}' requires key_name",
                            rule.name,
                            rule.key
                        );
                    }
                }
                other => anyhow::bail!("rule '{}': unknown key source '{}'", rule.name, other),
            }
            rule.limit
                .validate()
                .map_err(|e| anyhow::anyhow!("rule '{}': {}", rule.name, e))?;
        }
        if self.eviction.enabled {
            if self.eviction.interval_secs == 0 {
                anyhow::bail!("eviction.interval_secs must be positive");
            }
            if self.eviction.idle_expire_secs == 0 {
                anyhow::bail!("eviction.idle_expire_secs must be positive");
            }
        }
        Ok(())
    }

    /// The rule guarding `path`, by longest matching prefix.
    pub fn rule_for_path(&self, path: &str) -> Option<&LimitRule> {
        self.rules
            .iter()
            .filter(|r| path.starts_with(r.path.as_str()))
            .max_by_key(|r| r.path.len())
    }
}
