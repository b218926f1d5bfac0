use std::time::Duration;

use log::info;

use crate::error::ConfigError;

/// Number of lookups the remote service accepts at once.
pub const BATCH_SIZE: usize = 5;

/// Pause between two batches. The remote service allows at most
/// `BATCH_SIZE` requests per 61 second window.
pub const INTER_BATCH_DELAY: Duration = Duration::from_secs(61);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            batch_size: BATCH_SIZE,
            inter_batch_delay: INTER_BATCH_DELAY,
        }
    }
}

impl SchedulerConfig {
    /// One item at a time, no cool-down.
    pub fn sequential() -> Self {
        SchedulerConfig {
            batch_size: 1,
            inter_batch_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub lookup_endpoint: String,
    pub lookup_param: String,
    pub lookup_timeout: Duration,
    pub bind_addr: String,
    pub upload_dir: String,
    pub output_dir: String,
    pub scheduler: SchedulerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            lookup_endpoint: "http://localhost:8081/api/recherche/positions6".to_string(),
            lookup_param: "searchTerm".to_string(),
            lookup_timeout: Duration::from_secs(30),
            bind_addr: "0.0.0.0:8080".to_string(),
            upload_dir: "uploads".to_string(),
            output_dir: "outputs".to_string(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source. Unset keys keep their defaults.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(v) = get("ARTICLE_LOOKUP_ENDPOINT") {
            config.lookup_endpoint = v;
        }
        if let Some(v) = get("ARTICLE_LOOKUP_PARAM") {
            config.lookup_param = v;
        }
        if let Some(v) = get("ARTICLE_LOOKUP_TIMEOUT_SECS") {
            let secs = v.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "ARTICLE_LOOKUP_TIMEOUT_SECS".to_string(),
                value: v.clone(),
            })?;
            config.lookup_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = get("ARTICLE_LOOKUP_BIND") {
            config.bind_addr = v;
        }
        if let Some(v) = get("ARTICLE_LOOKUP_UPLOAD_DIR") {
            config.upload_dir = v;
        }
        if let Some(v) = get("ARTICLE_LOOKUP_OUTPUT_DIR") {
            config.output_dir = v;
        }

        info!(
            "Lookup endpoint: {} (param '{}', timeout {:?})",
            config.lookup_endpoint, config.lookup_param, config.lookup_timeout
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_encode_rate_limit() {
        let config = SchedulerConfig::default();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.inter_batch_delay, Duration::from_secs(61));
    }

    #[test]
    fn env_overrides_and_keeps_fixed_scheduler() {
        let vars: HashMap<&str, &str> = [
            ("ARTICLE_LOOKUP_ENDPOINT", "http://api.test/search"),
            ("ARTICLE_LOOKUP_TIMEOUT_SECS", "5"),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.lookup_endpoint, "http://api.test/search");
        assert_eq!(config.lookup_timeout, Duration::from_secs(5));
        assert_eq!(config.lookup_param, "searchTerm");
        assert_eq!(config.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let err = AppConfig::from_lookup(|k| {
            (k == "ARTICLE_LOOKUP_TIMEOUT_SECS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("ARTICLE_LOOKUP_TIMEOUT_SECS"));
    }
}
