use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// PostgreSQL connection URL; in-memory stores are used when unset
    #[serde(default)]
    pub database_url: Option<String>,

    /// Redis connection URL; caching is disabled when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on every store call, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Number of recommendations returned when the caller gives no limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Largest limit a caller may request
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Active candidates fetched per recommendation request
    #[serde(default = "default_candidate_pool_size")]
    pub candidate_pool_size: usize,

    /// How far back interaction reads look
    #[serde(default = "default_interaction_window_days")]
    pub interaction_window_days: i64,

    /// Maximum interactions returned by a single read
    #[serde(default = "default_interaction_page_size")]
    pub interaction_page_size: usize,

    /// Experiment whose variants drive scoring, if any
    #[serde(default)]
    pub experiment_id: Option<Uuid>,

    /// Adopt weight proposals from retraining without manual review
    #[serde(default)]
    pub auto_apply_weights: bool,

    /// Seconds between retraining runs
    #[serde(default = "default_retrain_interval_secs")]
    pub retrain_interval_secs: u64,

    /// Seconds between insight reports
    #[serde(default = "default_insights_interval_secs")]
    pub insights_interval_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_store_timeout_ms() -> u64 {
    2000
}

fn default_limit() -> usize {
    10
}

fn default_max_limit() -> usize {
    50
}

fn default_candidate_pool_size() -> usize {
    100
}

fn default_interaction_window_days() -> i64 {
    30
}

fn default_interaction_page_size() -> usize {
    500
}

fn default_retrain_interval_secs() -> u64 {
    3600
}

fn default_insights_interval_secs() -> u64 {
    86400
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            host: default_host(),
            port: default_port(),
            store_timeout_ms: default_store_timeout_ms(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            candidate_pool_size: default_candidate_pool_size(),
            interaction_window_days: default_interaction_window_days(),
            interaction_page_size: default_interaction_page_size(),
            experiment_id: None,
            auto_apply_weights: false,
            retrain_interval_secs: default_retrain_interval_secs(),
            insights_interval_secs: default_insights_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the services cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retrain_interval_secs == 0 {
            anyhow::bail!("RETRAIN_INTERVAL_SECS must be greater than zero");
        }
        if self.insights_interval_secs == 0 {
            anyhow::bail!("INSIGHTS_INTERVAL_SECS must be greater than zero");
        }
        if self.store_timeout_ms == 0 {
            anyhow::bail!("STORE_TIMEOUT_MS must be greater than zero");
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn interaction_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.interaction_window_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_environment() {
        let vars: Vec<(String, String)> = Vec::new();
        let config: Config = envy::from_iter(vars).unwrap();

        assert!(config.database_url.is_none());
        assert!(config.redis_url.is_none());
        assert_eq!(config.default_limit, 10);
        assert_eq!(config.candidate_pool_size, 100);
        assert_eq!(config.store_timeout(), Duration::from_millis(2000));
        assert!(!config.auto_apply_weights);
    }

    #[test]
    fn test_overrides_from_environment() {
        let experiment = Uuid::new_v4();
        let vars = vec![
            ("PORT".to_string(), "8080".to_string()),
            ("EXPERIMENT_ID".to_string(), experiment.to_string()),
            ("AUTO_APPLY_WEIGHTS".to_string(), "true".to_string()),
            ("INTERACTION_WINDOW_DAYS".to_string(), "7".to_string()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.experiment_id, Some(experiment));
        assert!(config.auto_apply_weights);
        assert_eq!(config.interaction_window(), chrono::Duration::days(7));
    }

    #[test]
    fn test_zero_job_intervals_are_rejected() {
        assert!(Config::default().validate().is_ok());

        for name in ["RETRAIN_INTERVAL_SECS", "INSIGHTS_INTERVAL_SECS", "STORE_TIMEOUT_MS"] {
            let vars = vec![(name.to_string(), "0".to_string())];
            let config: Config = envy::from_iter(vars).unwrap();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(name));
        }
    }
}
