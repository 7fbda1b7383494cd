//! Configuration loader with layered sources.

use crate::AppConfig;
use arcana_core::ArcanaError;
use config::{Config, ConfigError, Environment, File};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Uncommitted local overrides
    /// 4. Environment variables with `ARCANA_` prefix
    pub fn new(config_dir: impl Into<String>) -> Result<Self, ArcanaError> {
        let config_dir = config_dir.into();
        let config = Self::load_config(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, ArcanaError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    pub async fn reload(&self) -> Result<(), ArcanaError> {
        let new_config = Self::load_config(&self.config_dir)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("configuration reloaded successfully");
        Ok(())
    }

    /// Loads configuration from the specified directory.
    fn load_config(config_dir: &str) -> Result<AppConfig, ArcanaError> {
        // Load .env file if present
        if let Err(e) = dotenvy::dotenv() {
            debug!("no .env file found or error loading it: {}", e);
        }

        let environment = std::env::var("ARCANA_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        info!(environment = %environment, "loading configuration");

        let mut builder = Config::builder();

        // 1. Load default configuration
        let default_path = format!("{}/default.toml", config_dir);
        if Path::new(&default_path).exists() {
            debug!("loading default config from: {}", default_path);
            builder = builder.add_source(File::with_name(&default_path).required(false));
        }

        // 2. Load environment-specific configuration
        let env_path = format!("{}/{}.toml", config_dir, environment);
        if Path::new(&env_path).exists() {
            debug!("loading environment config from: {}", env_path);
            builder = builder.add_source(File::with_name(&env_path).required(false));
        }

        // 3. Load local overrides (not committed to version control)
        let local_path = format!("{}/local.toml", config_dir);
        if Path::new(&local_path).exists() {
            debug!("loading local config from: {}", local_path);
            builder = builder.add_source(File::with_name(&local_path).required(false));
        }

        // 4. Override with environment variables (ARCANA_ prefix)
        builder = builder.add_source(
            Environment::with_prefix("ARCANA")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error_to_arcana_error)?;

        let app_config: AppConfig = config.try_deserialize().map_err(config_error_to_arcana_error)?;

        Self::validate_config(&app_config)?;

        Ok(app_config)
    }

    /// Validates the configuration, failing fast on settings that would
    /// otherwise surface as confusing runtime errors.
    fn validate_config(config: &AppConfig) -> Result<(), ArcanaError> {
        if config.jobs.queue.queue_name.trim().is_empty() {
            return Err(ArcanaError::Configuration("jobs.queue.queue_name is required".to_string()));
        }

        if config.jobs.queue.worker_count == 0 {
            return Err(ArcanaError::Configuration("jobs.queue.worker_count must be at least 1".to_string()));
        }

        const KNOWN_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !KNOWN_LOG_LEVELS.contains(&config.observability.log_level.as_str()) {
            return Err(ArcanaError::Configuration(format!(
                "observability.log_level must be one of {:?}, got {:?}",
                KNOWN_LOG_LEVELS, config.observability.log_level
            )));
        }

        Ok(())
    }

    /// Gets a specific configuration value by key path.
    pub async fn get_value<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let config = self.config.read().await;
        let json = serde_json::to_value(&*config).ok()?;

        let mut current = &json;
        for part in key.split('.') {
            current = current.get(part)?;
        }

        serde_json::from_value(current.clone()).ok()
    }
}

fn config_error_to_arcana_error(err: ConfigError) -> ArcanaError {
    ArcanaError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppMetadata, ObservabilityConfig, SigningConfig};
    use arcana_jobs::{JobsConfig, QueueConfig};

    fn config_with_queue_name(queue_name: &str) -> AppConfig {
        AppConfig {
            app: AppMetadata::default(),
            observability: ObservabilityConfig::default(),
            signing: SigningConfig::default(),
            jobs: JobsConfig {
                queue: QueueConfig { queue_name: queue_name.to_string(), worker_count: 1, ..QueueConfig::default() },
                ..JobsConfig::default()
            },
        }
    }

    #[test]
    fn validate_rejects_empty_queue_name() {
        let config = config_with_queue_name("");
        let err = ConfigLoader::validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("queue_name"));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = config_with_queue_name("jobs");
        config.jobs.queue.worker_count = 0;
        let err = ConfigLoader::validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("worker_count"));
    }

    #[test]
    fn validate_accepts_a_well_formed_config() {
        let config = config_with_queue_name("jobs");
        assert!(ConfigLoader::validate_config(&config).is_ok());
    }

    #[test]
    fn validate_rejects_unknown_log_level() {
        let mut config = config_with_queue_name("jobs");
        config.observability.log_level = "verbose".to_string();
        let err = ConfigLoader::validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }
}
