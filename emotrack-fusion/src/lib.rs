//! emotrack-fusion library
//!
//! Session-scoped emotion score aggregation. Per-frame outputs from a
//! probability classifier and from action-unit rules are folded into
//! running per-label maxima and reduced to one label per source at stop.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod aggregator;
pub mod api;
pub mod collaborators;
pub mod db;
pub mod engine;
pub mod error;
pub mod finalizer;
pub mod reaper;
pub mod registry;
pub mod rules;

use collaborators::Collaborators;
use engine::FusionEngine;

/// Encoded frames can be large; axum's 2 MB default is too small
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FusionEngine>,
    /// Finalized result storage
    pub db: SqlitePool,
    pub collaborators: Arc<Collaborators>,
    /// `None` disables authentication
    pub authorization_key: Option<String>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        engine: Arc<FusionEngine>,
        db: SqlitePool,
        collaborators: Collaborators,
        authorization_key: Option<String>,
    ) -> Self {
        Self {
            engine,
            db,
            collaborators: Arc::new(collaborators),
            authorization_key,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// `/health` and `/buildinfo` are public; everything else requires the
/// Authorization header when a key is configured.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{delete, get, post, put};

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/start", put(api::start_session))
        .route("/ingest", post(api::ingest_frame))
        .route("/process", post(api::process_frame))
        .route("/stop", delete(api::stop_session))
        .route("/sessions", get(api::list_sessions))
        .route("/results/:session_id", get(api::get_result))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/buildinfo", get(api::get_build_info))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
