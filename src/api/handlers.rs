//! API Handlers
//!
//! HTTP request handlers for the worker's control endpoints and the
//! catch-all proxy that routes page traffic through the cache.

use std::convert::Infallible;
use std::sync::Arc;

use async_stream::stream;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::cache::RequestKey;
use crate::error::{ApiError, Result};
use crate::fetch::FetchRequest;
use crate::models::{
    BroadcastMessage, ControlMessage, DeleteQuery, DeleteResponse, HealthResponse,
    PublishRequest, PublishResponse, StatsResponse,
};
use crate::worker::CacheWorker;

/// Response header reporting how the cache answered a proxied request.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Headers recomputed by the server for every outgoing response.
const RESPONSE_HOP_BY_HOP: [HeaderName; 3] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::CONTENT_LENGTH,
];

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<CacheWorker>,
}

impl AppState {
    pub fn new(worker: CacheWorker) -> Self {
        Self {
            worker: Arc::new(worker),
        }
    }
}

/// Fallback handler: every request that is not a control endpoint.
///
/// Answers through the worker's route table and reports the outcome in the
/// `x-cache` header.
pub async fn proxy_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = state.worker.resolve_local(path_and_query)?;
    let request = FetchRequest::new(method, url)
        .with_headers(headers)
        .with_body(body);

    let intercepted = state.worker.handle_fetch(&request).await?;
    debug!(url = %request.url, cache = %intercepted.status, "Proxied request");

    let snapshot = intercepted.response;
    let mut headers = snapshot.headers;
    for name in RESPONSE_HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.insert(X_CACHE, HeaderValue::from_static(intercepted.status.as_str()));

    let mut response = Response::new(Body::from(snapshot.body));
    *response.status_mut() = snapshot.status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Handler for POST /__sw/message
///
/// Replies with a JSON boolean. Unrecognised messages are rejected with 400.
pub async fn message_handler(
    State(state): State<AppState>,
    Json(value): Json<serde_json::Value>,
) -> Result<Json<bool>> {
    let message: ControlMessage = serde_json::from_value(value)
        .map_err(|e| ApiError::InvalidRequest(format!("Unrecognised control message: {}", e)))?;

    Ok(Json(state.worker.handle_message(message).await))
}

/// Handler for GET /__sw/updates
///
/// Streams every message published on the update channel as a server-sent
/// event, starting from the moment of connection.
pub async fn updates_handler(State(state): State<AppState>) -> Response {
    let mut subscription = state.worker.hub().subscribe(state.worker.channel());
    debug!(channel = subscription.channel(), "Update stream opened");

    let stream = stream! {
        while let Some(message) = subscription.recv().await {
            match Event::default().json_data(&message) {
                Ok(event) => {
                    yield Ok::<Event, Infallible>(event);
                }
                Err(e) => warn!(error = %e, "Failed to encode broadcast message"),
            }
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Handler for POST /__sw/updates
///
/// Lets a client notify every other subscriber, as a page would after
/// refreshing content itself.
pub async fn publish_handler(
    State(state): State<AppState>,
    Json(req): Json<PublishRequest>,
) -> Json<PublishResponse> {
    let message = BroadcastMessage::CacheUpdated {
        timestamp: req
            .timestamp
            .unwrap_or_else(|| state.worker.store().now_ms()),
        url: req.url,
        cache_name: None,
        are_responses_same: None,
    };

    let receivers = state.worker.hub().publish(state.worker.channel(), message);
    Json(PublishResponse { receivers })
}

/// Handler for DELETE /__sw/cache/:cache_name
///
/// With `?url=` removes one record, otherwise empties the partition. The
/// partition stays open and keeps caching afterwards.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(cache_name): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteResponse>> {
    if let Some(error_msg) = query.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let store = state.worker.store();
    match query.url {
        Some(url) => {
            let key = RequestKey::get(state.worker.resolve(&url)?);
            if store.delete_record(&cache_name, &key).await? {
                Ok(Json(DeleteResponse::record(cache_name, key.url())))
            } else {
                Err(ApiError::NotFound(format!(
                    "'{}' is not cached in '{}'",
                    key.url(),
                    cache_name
                )))
            }
        }
        None => {
            if store.clear_cache(&cache_name).await {
                Ok(Json(DeleteResponse::partition(cache_name)))
            } else {
                Err(ApiError::NotFound(format!("Cache '{}'", cache_name)))
            }
        }
    }
}

/// Handler for GET /__sw/stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.worker.store().stats().await;
    Json(StatsResponse::new(&stats))
}

/// Handler for GET /__sw/health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
