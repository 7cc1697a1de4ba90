use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use helix_db::{JobStore, MemoryJobStore, PgJobStore};
use helix_nims::config::ProviderConfig;
use helix_nims::manager::JobManager;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use helix_api::config::{ServerConfig, StoreBackend};
use helix_api::router::build_app_router;
use helix_api::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "helix_api=debug,helix_nims=debug,tower_http=debug".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env()?;
    let provider = ProviderConfig::from_env()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        job_store = %config.job_store,
        provider = %provider.base_url,
        "Loaded configuration",
    );
    if provider.api_key.is_none() {
        tracing::warn!("NVIDIA_API_KEY is not set; submissions will be refused");
    }

    // --- Job store ---
    let (store, pool) = match config.job_store {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL must be set when JOB_STORE=postgres")?;

            let pool = helix_db::create_pool(database_url).await?;
            tracing::info!("Database connection pool created");

            helix_db::health_check(&pool).await?;
            tracing::info!("Database health check passed");

            helix_db::run_migrations(&pool).await?;
            tracing::info!("Database migrations applied");

            let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
            (store, Some(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory job store; jobs will not survive a restart");
            let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
            (store, None)
        }
    };

    // --- Job manager ---
    let manager = JobManager::new(store, Arc::new(provider))?;
    let summary = manager.resume_interrupted().await?;
    tracing::info!(
        resumed = summary.resumed,
        failed = summary.failed,
        "Recovered jobs from previous run",
    );

    // Lifecycle event log.
    let mut events = manager.subscribe();
    let events_handle = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!(
                    job_id = %event.job_id(),
                    event = event.msg_type(),
                    "Job event",
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Job event log lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // --- App state ---
    let state = AppState {
        manager: Arc::clone(&manager),
        config: Arc::new(config.clone()),
        pool,
    };
    let app = build_app_router(state)?;

    // --- Start server ---
    let addr = SocketAddr::new(config.host.parse()?, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Accepted jobs stay `running` and resume on the next start.
    manager.shutdown().await;
    tracing::info!("Job manager shut down");

    events_handle.abort();
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
