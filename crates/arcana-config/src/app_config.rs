//! Application configuration structures.

use arcana_jobs::JobsConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppMetadata,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub signing: SigningConfig,

    pub jobs: JobsConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    pub name: String,
    pub version: String,
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "arcana-queue-service".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: default_log_level(), log_format: default_log_format() }
    }
}

/// Descriptor signing/verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Base64-encoded Ed25519 public key used to verify descriptors.
    #[serde(default)]
    pub public_key_b64: Option<String>,

    /// Base64-encoded Ed25519 signing key, for services that issue
    /// descriptors rather than only verifying them.
    #[serde(default)]
    pub signing_key_b64: Option<String>,

    /// Whether to accept the legacy compatibility signable view when
    /// strict verification fails.
    #[serde(default = "default_verify_compatibility_mode")]
    pub verify_compatibility_mode: bool,
}

fn default_verify_compatibility_mode() -> bool {
    true
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self { public_key_b64: None, signing_key_b64: None, verify_compatibility_mode: default_verify_compatibility_mode() }
    }
}

impl ObservabilityConfig {
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.log_format == "json"
    }
}

impl AppConfig {
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.jobs.queue.worker_count.max(1)
    }

    #[must_use]
    pub fn recovery_tick(&self) -> Duration {
        self.jobs.queue.recovery_tick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_metadata_default_names_the_service() {
        let meta = AppMetadata::default();
        assert_eq!(meta.name, "arcana-queue-service");
        assert_eq!(meta.environment, "development");
    }

    #[test]
    fn signing_config_defaults_to_compat_mode_enabled() {
        let config = SigningConfig::default();
        assert!(config.verify_compatibility_mode);
        assert!(config.public_key_b64.is_none());
    }

    #[test]
    fn observability_config_defaults_to_pretty() {
        let config = ObservabilityConfig::default();
        assert!(!config.is_json());
    }
}
