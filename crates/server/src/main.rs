//! Coterie server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use coterie_api::AppState;
use coterie_common::Config;
use coterie_core::ServiceSweeper;
use coterie_queue::{RetryConfig, SweepConfig, run_scheduler};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coterie=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting coterie server...");

    let config = Config::load()?;
    info!(url = %config.server.url, "Configuration loaded");

    info!("Connecting to database...");
    let db = coterie_db::init(&config).await?;
    info!("Running migrations...");
    coterie_db::migrate(&db).await?;
    let db = Arc::new(db);

    let state = AppState::new(db, &config)?;

    let sweeps = if config.sweep.enabled {
        let sweeper = ServiceSweeper::new(
            state.collection_service.clone(),
            state.notification_service.clone(),
        );
        info!("Starting expiry sweeps");
        run_scheduler(
            SweepConfig::from(&config.sweep),
            RetryConfig::from(&config.retry),
            Arc::new(sweeper),
        )
    } else {
        info!("Expiry sweeps disabled");
        Vec::new()
    };

    let app = Router::new()
        .nest("/api", coterie_api::app(state))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in sweeps {
        handle.abort();
    }

    info!("Server shutdown complete");
    Ok(())
}
