//! Job queue configuration, surfacing every tunable in this queue's
//! documented configuration table with its literal default.

use std::time::Duration;

use arcana_resilience::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self { redis: RedisConfig::default(), queue: QueueConfig::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self { url: default_redis_url(), pool_size: default_pool_size() }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_pool_size() -> usize {
    10
}

/// The queue's name is required and has no default — it scopes every
/// Redis key this crate touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub queue_name: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_base_secs")]
    pub retry_delay_base_secs: u64,

    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    pub worker_count: usize,

    #[serde(default = "default_brpop_block_secs")]
    pub brpop_block_secs: u64,

    #[serde(default = "default_recovery_tick_secs")]
    pub recovery_tick_secs: u64,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
}

impl QueueConfig {
    pub fn retry_delay_base(&self) -> Duration {
        Duration::from_secs(self.retry_delay_base_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn brpop_block(&self) -> Duration {
        Duration::from_secs(self.brpop_block_secs)
    }

    pub fn recovery_tick(&self) -> Duration {
        Duration::from_secs(self.recovery_tick_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: String::new(),
            max_retries: default_max_retries(),
            retry_delay_base_secs: default_retry_delay_base_secs(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            worker_count: 1,
            brpop_block_secs: default_brpop_block_secs(),
            recovery_tick_secs: default_recovery_tick_secs(),
            circuit_breaker: CircuitBreakerSettings::default(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_base_secs() -> u64 {
    60
}

fn default_visibility_timeout_secs() -> u64 {
    600
}

fn default_brpop_block_secs() -> u64 {
    1
}

fn default_recovery_tick_secs() -> u64 {
    300
}

/// Mirrors [`arcana_resilience::CircuitBreakerConfig`] in serializable
/// form; `into()` converts it to the real config the breaker takes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_cb_max_failures")]
    pub max_failures: u64,
    #[serde(default = "default_cb_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_cb_max_requests")]
    pub max_requests: u64,
    #[serde(default = "default_cb_success_threshold")]
    pub success_threshold: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            max_failures: default_cb_max_failures(),
            timeout_secs: default_cb_timeout_secs(),
            max_requests: default_cb_max_requests(),
            success_threshold: default_cb_success_threshold(),
        }
    }
}

fn default_cb_max_failures() -> u64 {
    3
}

fn default_cb_timeout_secs() -> u64 {
    10
}

fn default_cb_max_requests() -> u64 {
    2
}

fn default_cb_success_threshold() -> u64 {
    2
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        CircuitBreakerConfig {
            failure_threshold: settings.max_failures,
            success_threshold: settings.success_threshold,
            timeout: Duration::from_secs(settings.timeout_secs),
            half_open_requests: settings.max_requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_configuration_table() {
        let config = QueueConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_base(), Duration::from_secs(60));
        assert_eq!(config.visibility_timeout(), Duration::from_secs(600));
        assert_eq!(config.brpop_block(), Duration::from_secs(1));
        assert_eq!(config.recovery_tick(), Duration::from_secs(300));

        let cb = config.circuit_breaker;
        assert_eq!(cb.max_failures, 3);
        assert_eq!(cb.timeout_secs, 10);
        assert_eq!(cb.max_requests, 2);
        assert_eq!(cb.success_threshold, 2);
    }
}
