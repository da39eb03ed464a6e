//! API Router and Application State
//!
//! Central routing configuration and shared state.

use axum::{extract::State, middleware::from_fn_with_state, routing::get, Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth, chat,
    chat::{DmSpamTracker, SendPolicy},
    config::Config,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,
    /// Redis client (event bus)
    pub redis: fred::clients::Client,
    /// Server configuration
    pub config: Arc<Config>,
    /// DM spam tracker shared by every send
    pub spam_tracker: Arc<DmSpamTracker>,
    /// Message send checks
    pub send_policy: SendPolicy,
}

impl AppState {
    /// Create new application state.
    ///
    /// The spam tracker's pruning task is not started here; call
    /// [`DmSpamTracker::start`] once the runtime is up.
    #[must_use]
    pub fn new(db: PgPool, redis: fred::clients::Client, config: Config) -> Self {
        let spam_tracker = Arc::new(DmSpamTracker::new(
            config.dm_spam_window(),
            config.dm_spam_threshold,
        ));
        Self {
            db,
            redis,
            config: Arc::new(config),
            send_policy: SendPolicy::new(spam_tracker.clone()),
            spam_tracker,
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Protected routes that require authentication
    let protected_routes = Router::new()
        .nest("/api/channels", chat::channels_router())
        .nest("/api/messages", chat::messages_router())
        .layer(from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
    /// Number of tracked DM spam keys
    spam_keys: usize,
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        spam_keys: state.spam_tracker.tracked_keys(),
    })
}
