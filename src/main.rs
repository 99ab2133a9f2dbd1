//! Drishti-Inspect - AI vehicle inspection server
//!
//! Standalone inspection server with REST API for shop clients

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tracing::info;

use drishti_inspect::{
    auth, config::ServerConfig, handlers, metrics, middleware,
};

/// Max time to wait for in-flight inspections after the listener closes
const GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    metrics::register_metrics().expect("Failed to register metrics");
    info!("Metrics registered at /metrics");

    info!("Starting drishti-inspect server...");

    // Load configuration from environment
    let server_config = ServerConfig::from_env();
    server_config.log();

    // Wire pipeline, search engine, monitor, and stores
    let state = Arc::new(handlers::ServiceState::from_config(server_config.clone()));

    // Configure rate limiting from config
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(server_config.rate_limit_per_second)
        .burst_size(server_config.rate_limit_burst)
        .finish()
        .expect("Failed to build governor rate limiter configuration");

    let governor_layer = GovernorLayer {
        config: Arc::new(governor_conf),
    };

    info!(
        "Rate limiting enabled: {} req/sec, burst of {}",
        server_config.rate_limit_per_second, server_config.rate_limit_burst
    );

    let cors = server_config.cors.to_layer();

    // Protected API routes - require authentication, rate limited
    let protected_routes = handlers::build_protected_routes(state.clone())
        .layer(axum::middleware::from_fn(auth::auth_middleware))
        .layer(governor_layer);

    // Public routes - health, metrics, SSE streams; never rate limited
    let public_routes = handlers::build_public_routes(state.clone());

    let max_concurrent = server_config.max_concurrent_requests;
    info!("Concurrency limiting enabled: max_concurrent={max_concurrent}");

    let app = axum::Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port)
        .parse()
        .expect("Invalid host/port configuration");
    info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutdown signal received, draining in-flight inspections...");

    // Bounded wait: background processing tasks keep running after the
    // listener closes; give them a chance to reach a terminal status
    let drain = async {
        while metrics::ACTIVE_INSPECTIONS.get() > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
    };
    match tokio::time::timeout(
        std::time::Duration::from_secs(GRACEFUL_SHUTDOWN_TIMEOUT_SECS),
        drain,
    )
    .await
    {
        Ok(()) => info!("Server shutdown complete"),
        Err(_) => tracing::error!(
            "Shutdown drain timed out after {}s with {} inspections in flight",
            GRACEFUL_SHUTDOWN_TIMEOUT_SECS,
            metrics::ACTIVE_INSPECTIONS.get()
        ),
    }

    Ok(())
}

/// Handle graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
