//! Router Configuration - Centralized route definitions
//!
//! Routes are split into public (no auth) and protected (auth required).
//! The auth middleware and rate limiter are applied by the caller so tests
//! can exercise handlers with or without them.

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;
use super::{events, health, inspect, search};

/// Build the public routes (no authentication required)
///
/// These must always be accessible for:
/// - Health checks (Kubernetes probes)
/// - Metrics (Prometheus scraping)
/// - Inspection event streams (the streaming ack's streamUrl target)
pub fn build_public_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // HEALTH & KUBERNETES PROBES
        // =================================================================
        .route("/health", get(health::health))
        .route("/health/live", get(health::health_live))
        .route("/health/ready", get(health::health_ready))
        // =================================================================
        // METRICS (PROMETHEUS)
        // =================================================================
        .route("/metrics", get(health::metrics_endpoint))
        // =================================================================
        // INSPECTION EVENT STREAMS (SSE)
        // =================================================================
        .route(
            "/api/inspections/{id}/events",
            get(events::inspection_events_sse),
        )
        // =================================================================
        // STATE
        // =================================================================
        .with_state(state)
}

/// Build the protected API routes (authentication required)
pub fn build_protected_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // INSPECTION SUBMISSION
        // =================================================================
        .route("/api/inspect", post(inspect::submit_inspection_v1))
        .route("/api/inspect", get(inspect::get_inspection))
        .route("/api/v2/inspect", post(inspect::submit_inspection_v2))
        // =================================================================
        // INSPECTION LIFECYCLE
        // =================================================================
        .route("/api/inspections/{id}", get(inspect::get_inspection_by_path))
        .route(
            "/api/inspections/{id}/retry",
            post(inspect::retry_inspection),
        )
        // =================================================================
        // SIMILARITY SEARCH & KNOWLEDGE BASE
        // =================================================================
        .route("/api/search", post(search::similarity_search))
        .route("/api/knowledge", post(search::ingest_chunk))
        .route("/api/knowledge/{shop_id}", get(search::list_chunks))
        // =================================================================
        // STATE
        // =================================================================
        .with_state(state)
}

/// Build the complete router with both public and protected routes
///
/// Note: this does NOT apply auth middleware or rate limiting; main.rs
/// layers those onto the protected group.
pub fn build_router(state: AppState) -> Router {
    let public = build_public_routes(state.clone());
    let protected = build_protected_routes(state);

    Router::new().merge(public).merge(protected)
}
