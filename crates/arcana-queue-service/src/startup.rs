//! Logging initialization and startup banner.

use arcana_config::AppConfig;
use tracing::info;

/// Initializes the global `tracing` subscriber. JSON output outside
/// development, pretty output otherwise, both honoring `RUST_LOG`.
pub fn init_logging(config: &AppConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},arcana=debug", config.observability.log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.observability.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).init();
    }
}

pub fn print_banner() {
    info!(
        r#"
    ___
   /   |  _____________ _____  ____ _
  / /| | / ___/ ___/ __ `/ __ \/ __ `/
 / ___ |/ /  / /__/ /_/ / / / / /_/ /
/_/  |_/_/   \___/\__,_/_/ /_/\__,_/

          Queue Service
    "#
    );
}

pub fn print_startup_info(queue_name: &str, worker_count: usize) {
    let separator = "=".repeat(60);
    info!("{}", separator);
    info!("queue:   {}", queue_name);
    info!("workers: {}", worker_count);
    info!("{}", separator);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_banner_does_not_panic() {
        let _ = tracing_subscriber::fmt::try_init();
        print_banner();
    }

    #[test]
    fn print_startup_info_does_not_panic() {
        let _ = tracing_subscriber::fmt::try_init();
        print_startup_info("jobs", 4);
    }
}
