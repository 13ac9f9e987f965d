//! API Routes
//!
//! Configures the Axum router: control endpoints under `/__sw/` and a
//! fallback that proxies everything else through the cache.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_handler, health_handler, message_handler, proxy_handler, publish_handler,
    stats_handler, updates_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /__sw/health` - Health check endpoint
/// - `GET /__sw/stats` - Per-partition cache statistics
/// - `GET /__sw/updates` - Server-sent stream of cache update broadcasts
/// - `POST /__sw/updates` - Publish an update to every subscriber
/// - `POST /__sw/message` - Control messages (CACHE_URLS, cache-on-demand, CLEAR_CACHE)
/// - `DELETE /__sw/cache/:cache_name` - Clear a partition, or one record with `?url=`
/// - anything else - proxied to the origin through the route table
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/__sw/health", get(health_handler))
        .route("/__sw/stats", get(stats_handler))
        .route("/__sw/updates", get(updates_handler).post(publish_handler))
        .route("/__sw/message", post(message_handler))
        .route("/__sw/cache/:cache_name", delete(delete_handler))
        .fallback(proxy_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
