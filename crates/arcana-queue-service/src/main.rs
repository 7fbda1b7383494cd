//! Entry point for the reliable job queue service.

use std::sync::Arc;

use arcana_config::ConfigLoader;
use arcana_core::ArcanaResult;
use arcana_jobs::{create_pool, RedisPrimitives, RedisQueue, RetryPolicy, WorkerLoop};
use arcana_queue_service::handler::verifying_handler;
use arcana_queue_service::startup::{init_logging, print_banner, print_startup_info};
use arcana_resilience::CircuitBreaker;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config_loader = match ConfigLoader::from_default_location() {
        Ok(loader) => loader,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    let config = config_loader.get().await;

    init_logging(&config);
    print_banner();
    info!(version = env!("CARGO_PKG_VERSION"), "starting arcana-queue-service");

    if let Err(e) = run(config).await {
        error!(error = %e, "service exited with an error");
        std::process::exit(1);
    }
}

async fn run(config: arcana_config::AppConfig) -> ArcanaResult<()> {
    let queue_config = &config.jobs.queue;
    print_startup_info(&queue_config.queue_name, config.worker_count());

    // Attempt to construct the advanced-queue handle (a PING-verified pool
    // wired into RedisQueue's retry/dead-letter/processing-tracker logic).
    // If Redis isn't reachable right now, fall back to a degraded pool that
    // skips the up-front check and run bare BRPOP workers with no retry or
    // dead-letter semantics until Redis comes back.
    let (primitives, queue) = match create_pool(&config.jobs.redis).await {
        Ok(pool) => {
            let primitives = Arc::new(RedisPrimitives::new(pool));
            let breaker = Arc::new(CircuitBreaker::new(
                queue_config.queue_name.clone(),
                (&queue_config.circuit_breaker).into(),
            ));
            let queue = Arc::new(RedisQueue::new(
                primitives.clone(),
                breaker,
                queue_config.queue_name.clone(),
                queue_config.max_retries,
                queue_config.retry_delay_base(),
                queue_config.visibility_timeout(),
                queue_config.brpop_block(),
                RetryPolicy::default(),
            ));
            (primitives, Some(queue))
        }
        Err(e) => {
            warn!(error = %e, "failed to construct advanced-queue handle, falling back to degraded BRPOP-only mode");
            let pool = arcana_jobs::build_pool(&config.jobs.redis)
                .map_err(|e| arcana_core::ArcanaError::Internal(format!("failed to build degraded redis pool: {e}")))?;
            (Arc::new(RedisPrimitives::new(pool)), None)
        }
    };

    let handler = verifying_handler(config.signing.clone());

    let mut workers = Vec::with_capacity(config.worker_count());
    for _ in 0..config.worker_count() {
        let worker = match &queue {
            Some(queue) => WorkerLoop::new(
                queue.clone(),
                primitives.clone(),
                queue_config.queue_name.clone(),
                handler.clone(),
                config.recovery_tick(),
            ),
            None => WorkerLoop::new_degraded(
                primitives.clone(),
                queue_config.queue_name.clone(),
                handler.clone(),
                config.recovery_tick(),
            ),
        };
        workers.push(Arc::new(worker));
    }

    let run_handles: Vec<_> = workers
        .iter()
        .cloned()
        .map(|worker| tokio::spawn(async move { worker.run().await }))
        .collect();

    shutdown_signal().await;
    info!("shutdown signal received, stopping workers");
    for worker in &workers {
        worker.stop();
    }
    for handle in run_handles {
        let _ = handle.await;
    }

    if let Some(queue) = queue {
        queue
            .close()
            .await
            .map_err(|e| arcana_core::ArcanaError::Internal(format!("failed to close queue: {e}")))?;
    }

    info!("service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("received terminate signal, initiating graceful shutdown");
        }
    }
}
