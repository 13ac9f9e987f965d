//! Cache worker
//!
//! The process-wide stand-in for a browser service worker: routes each
//! request to a caching strategy, answers control messages, and owns the
//! cache store and broadcast hub for its lifetime.

use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use crate::broadcast::BroadcastHub;
use crate::cache::{CacheStore, Clock, ExpirationPolicy, RequestKey};
use crate::config::{Config, RouteRule, Strategy, ON_DEMAND_IMAGE, STATIC_IMAGE_CACHE};
use crate::error::FetchError;
use crate::fetch::{FetchRequest, Fetcher};
use crate::intercept::{Intercepted, Interceptor};
use crate::models::{ControlAction, ControlMessage, TypedControl};

// == Cache Worker ==
pub struct CacheWorker {
    origin: Url,
    routes: Vec<RouteRule>,
    runtime_cache: String,
    channel: String,
    store: CacheStore,
    hub: BroadcastHub,
    fetcher: Arc<dyn Fetcher>,
    interceptor: Interceptor,
}

impl CacheWorker {
    // == Constructor ==
    /// Builds the worker and opens every partition it routes to.
    pub async fn start(
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FetchError> {
        let origin = Url::parse(&config.upstream_origin)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", config.upstream_origin, e)))?;

        let store = CacheStore::new(config.storage_limits(), clock);
        let hub = BroadcastHub::default();
        let routes = config.routes();

        for rule in routes.iter().filter(|r| r.strategy == Strategy::CacheFirst) {
            store.open(&rule.cache_name, rule.policy).await;
        }
        if !store.has(&config.runtime_cache_name).await {
            store
                .open(&config.runtime_cache_name, ExpirationPolicy::default())
                .await;
        }
        if !store.has(STATIC_IMAGE_CACHE).await {
            store.open(STATIC_IMAGE_CACHE, ExpirationPolicy::default()).await;
        }

        let interceptor = Interceptor::new(
            store.clone(),
            fetcher.clone(),
            hub.clone(),
            config.broadcast_channel.clone(),
        );

        info!(origin = %origin, routes = routes.len(), "Cache worker started");
        Ok(Self {
            origin,
            routes,
            runtime_cache: config.runtime_cache_name.clone(),
            channel: config.broadcast_channel.clone(),
            store,
            hub,
            fetcher,
            interceptor,
        })
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Channel cache updates are published on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    // == Resolve ==
    /// Resolves a path or URL against the upstream origin.
    pub fn resolve(&self, path_or_url: &str) -> Result<Url, FetchError> {
        self.origin
            .join(path_or_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", path_or_url, e)))
    }

    /// Like [`resolve`](Self::resolve), but refuses anything that lands on
    /// another origin.
    pub fn resolve_local(&self, path_and_query: &str) -> Result<Url, FetchError> {
        let url = self.resolve(path_and_query)?;
        if url.origin() != self.origin.origin() {
            return Err(FetchError::InvalidUrl(format!(
                "{} is outside {}",
                path_and_query, self.origin
            )));
        }
        Ok(url)
    }

    /// First route whose prefix matches `path`.
    pub fn route_for(&self, path: &str) -> Option<&RouteRule> {
        self.routes.iter().find(|r| r.matches(path))
    }

    // == Handle Fetch ==
    /// Answers one request according to the route table.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<Intercepted, FetchError> {
        match self.route_for(request.url.path()) {
            Some(rule) if rule.strategy == Strategy::CacheFirst => {
                self.interceptor.handle(request, &rule.target()).await
            }
            _ => self.interceptor.network_only(request).await,
        }
    }

    // == Handle Message ==
    /// Processes a control message; the return value is the reply.
    pub async fn handle_message(&self, message: ControlMessage) -> bool {
        match message {
            ControlMessage::Typed(TypedControl::CacheUrls { payload }) => {
                self.cache_urls(&payload.urls_to_cache).await
            }
            ControlMessage::Typed(TypedControl::ClearCache { cache_name }) => {
                self.store.clear_cache(&cache_name).await
            }
            ControlMessage::Action {
                action: ControlAction::CacheOnDemand,
            } => self.cache_on_demand().await,
        }
    }

    /// Fetches every URL into the runtime partition. True iff all were stored.
    async fn cache_urls(&self, urls: &[String]) -> bool {
        let mut all_cached = true;
        for url in urls {
            match self.fetch_into(&self.runtime_cache, url).await {
                Ok(()) => {}
                Err(reason) => {
                    warn!(url = %url, reason = %reason, "Failed to cache URL");
                    all_cached = false;
                }
            }
        }
        info!(count = urls.len(), all_cached, "Processed CACHE_URLS");
        all_cached
    }

    /// Makes sure the on-demand image is in the static image partition,
    /// fetching it only when absent.
    async fn cache_on_demand(&self) -> bool {
        let key = match self.resolve(ON_DEMAND_IMAGE) {
            Ok(url) => RequestKey::get(url),
            Err(e) => {
                warn!(error = %e, "Bad on-demand image URL");
                return false;
            }
        };
        if self.store.match_entry(STATIC_IMAGE_CACHE, &key).await.is_some() {
            return true;
        }

        match self.fetch_into(STATIC_IMAGE_CACHE, ON_DEMAND_IMAGE).await {
            Ok(()) => true,
            Err(reason) => {
                warn!(reason = %reason, "Failed to cache on-demand image");
                false
            }
        }
    }

    async fn fetch_into(&self, cache_name: &str, url: &str) -> Result<(), String> {
        let url = self.resolve(url).map_err(|e| e.to_string())?;
        let request = FetchRequest::get(url);
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| e.to_string())?;

        if !response.is_cacheable() {
            return Err(format!("status {}", response.status.as_u16()));
        }
        let stored = self
            .store
            .put(cache_name, request.key(), response)
            .await
            .map_err(|e| e.to_string())?;
        if !stored {
            return Err("evicted by entry limit".to_string());
        }
        Ok(())
    }
}
