//! Siphon - Main Entry Point
//!
//! Composition root: wires the store, broker and handlers together and
//! launches the configured roles (master allocator API, worker pool manager).

mod config;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::DaemonConfig;
use siphon_api_rpc::{server::RpcServerConfig, RpcHandler, RpcServer};
use siphon_core::application::{shutdown_channel, MasterAllocator, WorkerPoolManager};
use siphon_core::port::id_provider::UuidProvider;
use siphon_core::port::time_provider::SystemTimeProvider;
use siphon_core::port::{MessageHandler, WorkerRepository};
use siphon_infra_queue::{InMemoryQueueService, SleepHandler, SubprocessHandler, SubprocessHandlerConfig};
use siphon_infra_sqlite::{
    create_pool, run_migrations, SqliteAssignmentRepository, SqliteQueueRepository,
    SqliteWorkerRepository,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging (JSON format for production)
    let log_format = std::env::var("SIPHON_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("siphon=info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Siphon v{} starting...", VERSION);

    // 2. Load configuration (single value, injected everywhere)
    let config = DaemonConfig::from_env()?;
    info!(
        master = config.roles.master,
        worker = config.roles.worker,
        db_path = %config.db_path,
        "Configuration loaded"
    );

    // 3. Initialize database
    let pool = create_pool(&config.db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let worker_repo = Arc::new(SqliteWorkerRepository::new(pool.clone()));
    let queue_repo = Arc::new(SqliteQueueRepository::new(pool.clone()));
    let assignment_repo = Arc::new(SqliteAssignmentRepository::new(pool.clone()));

    // The bundled broker lives in-process; an external broker adapter slots
    // in here for multi-process deployments.
    let queue_service = Arc::new(InMemoryQueueService::new(time_provider.clone()));

    let handler: Arc<dyn MessageHandler> = match &config.handler_command {
        Some(parts) => {
            let mut handler_config = SubprocessHandlerConfig::new(parts[0].clone());
            handler_config.args = parts[1..].to_vec();
            info!(command = %parts[0], "Using subprocess message handler");
            Arc::new(SubprocessHandler::new(handler_config))
        }
        None => {
            info!(delay_ms = config.handler_delay.as_millis() as u64, "Using sleep message handler");
            Arc::new(SleepHandler::new(config.handler_delay))
        }
    };

    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    // 5. Master role: allocator behind the JSON-RPC API
    let mut rpc_handle = None;
    if config.roles.master {
        if config.reset_workers {
            let cleared = worker_repo.delete_all().await?;
            info!(cleared, "Worker registry cleared (full-system restart)");
        }

        let allocator = Arc::new(MasterAllocator::new(
            worker_repo.clone(),
            assignment_repo.clone(),
            id_provider.clone(),
            config.allocator.clone(),
        ));

        info!("Starting JSON-RPC server...");
        let rpc_server = RpcServer::new(
            RpcServerConfig {
                host: config.rpc_host.clone(),
                port: config.rpc_port,
            },
            RpcHandler::new(
                allocator,
                worker_repo.clone(),
                queue_repo.clone(),
                assignment_repo.clone(),
                queue_service.clone(),
                id_provider.clone(),
                time_provider.clone(),
            ),
        );
        rpc_handle = Some(
            rpc_server
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?,
        );
    }

    // 6. Worker role: register, then reconcile assignments onto the pool
    let mut manager_handle = None;
    if config.roles.worker {
        let manager = WorkerPoolManager::new(
            config.worker_id.clone(),
            worker_repo.clone(),
            assignment_repo.clone(),
            queue_repo.clone(),
            queue_service.clone(),
            handler,
            time_provider.clone(),
            config.pool.clone(),
            config.consumer.clone(),
        );
        manager.register().await?;

        let token = shutdown_rx.clone();
        manager_handle = Some(tokio::spawn(async move {
            if let Err(e) = manager.run(token).await {
                tracing::error!(error = ?e, "Worker pool manager failed");
            }
        }));
    }

    info!("System ready. Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown
    shutdown_tx.shutdown();
    if let Some(handle) = rpc_handle {
        handle
            .stop()
            .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    }
    if let Some(handle) = manager_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete.");

    Ok(())
}
