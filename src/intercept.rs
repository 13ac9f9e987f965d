//! Cache-first request interception
//!
//! Answers "what response should this request get right now" for a request
//! routed to a cache partition:
//!
//! 1. no entry: fetch, store if 2xx, return the network response
//! 2. fresh entry: bump its access time, return it without touching the network
//! 3. stale entry: delete it, then continue as in 1
//!
//! Network errors propagate unchanged; stale data is never served as a
//! fallback. Storage errors are logged and treated as a missing entry.
//! Concurrent requests for the same key are not coalesced: each goes to the
//! network and the last write wins.

use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::broadcast::{BroadcastHub, UpdateEvent};
use crate::cache::{CacheStore, Lookup, RequestKey, ResponseSnapshot};
use crate::compare::responses_are_same;
use crate::error::FetchError;
use crate::fetch::{FetchRequest, Fetcher};

// == Broadcast Mode ==
/// When replacing a stale entry should notify subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BroadcastMode {
    /// Never publish
    #[default]
    Off,
    /// Publish only when the comparator reports a difference
    OnChange,
    /// Publish every replacement, with `changed` set by the comparator
    Always,
}

// == Cache Target ==
/// Where and how a routed request is cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTarget {
    pub cache_name: String,
    pub broadcast: BroadcastMode,
}

impl CacheTarget {
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            broadcast: BroadcastMode::Off,
        }
    }

    pub fn with_broadcast(mut self, broadcast: BroadcastMode) -> Self {
        self.broadcast = broadcast;
        self
    }
}

// == Cache Status ==
/// How a response was produced, reported to clients as `x-cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a fresh entry
    Hit,
    /// No entry; fetched from the network
    Miss,
    /// Entry was stale; refetched from the network
    Expired,
    /// Not eligible for caching; fetched from the network
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Expired => "EXPIRED",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Intercepted ==
/// The response chosen for a request, and where it came from.
#[derive(Debug, Clone)]
pub struct Intercepted {
    pub response: ResponseSnapshot,
    pub status: CacheStatus,
}

// == Interceptor ==
/// Mediates between the network and the partitioned cache.
#[derive(Clone)]
pub struct Interceptor {
    store: CacheStore,
    fetcher: Arc<dyn Fetcher>,
    hub: BroadcastHub,
    channel: String,
}

impl Interceptor {
    pub fn new(
        store: CacheStore,
        fetcher: Arc<dyn Fetcher>,
        hub: BroadcastHub,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            store,
            fetcher,
            hub,
            channel: channel.into(),
        }
    }

    // == Handle ==
    /// Produces the response for `request` using the cache described by
    /// `target`.
    ///
    /// The stale-entry delete and the write of its replacement take the store
    /// lock separately, so the delete can drop a concurrent refresh of the
    /// same key. The next write for that key wins.
    pub async fn handle(
        &self,
        request: &FetchRequest,
        target: &CacheTarget,
    ) -> Result<Intercepted, FetchError> {
        if request.method != Method::GET {
            return self.network_only(request).await;
        }

        let key = request.key();
        let cache_name = target.cache_name.as_str();

        let lookup = match self.store.lookup(cache_name, &key).await {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!(cache_name, %key, error = %e, "Cache lookup failed, using network");
                Lookup::Absent
            }
        };

        match lookup {
            Lookup::Fresh(entry) => {
                self.touch(cache_name, &key).await;
                debug!(cache_name, %key, "Served from cache");
                Ok(Intercepted {
                    response: entry.response,
                    status: CacheStatus::Hit,
                })
            }
            Lookup::Stale(entry) => {
                if let Err(e) = self.store.delete_record(cache_name, &key).await {
                    warn!(cache_name, %key, error = %e, "Failed to delete stale entry");
                }
                debug!(cache_name, %key, "Cached entry expired, refetching");

                let response = self.fetcher.fetch(request).await?;
                if self.store_response(cache_name, &key, &response).await {
                    self.announce(target, &key, &entry.response, &response);
                }
                Ok(Intercepted {
                    response,
                    status: CacheStatus::Expired,
                })
            }
            Lookup::Absent => {
                let response = self.fetcher.fetch(request).await?;
                self.store_response(cache_name, &key, &response).await;
                Ok(Intercepted {
                    response,
                    status: CacheStatus::Miss,
                })
            }
        }
    }

    /// Fetches without consulting or updating any cache.
    pub async fn network_only(&self, request: &FetchRequest) -> Result<Intercepted, FetchError> {
        let response = self.fetcher.fetch(request).await?;
        Ok(Intercepted {
            response,
            status: CacheStatus::Bypass,
        })
    }

    /// Bumps the access time of a fresh entry and enforces the partition's
    /// limits.
    async fn touch(&self, cache_name: &str, key: &RequestKey) {
        if let Err(e) = self.store.update_timestamp(cache_name, key).await {
            warn!(cache_name, %key, error = %e, "Failed to update access time");
            return;
        }
        if let Err(e) = self.store.expire_entries(cache_name).await {
            warn!(cache_name, error = %e, "Failed to expire entries");
        }
    }

    /// Writes a 2xx response to the partition. Returns true if it is still
    /// stored once the write completes.
    async fn store_response(
        &self,
        cache_name: &str,
        key: &RequestKey,
        response: &ResponseSnapshot,
    ) -> bool {
        if !response.is_cacheable() {
            debug!(
                cache_name,
                %key,
                status = response.status.as_u16(),
                "Response not cacheable, serving live"
            );
            return false;
        }

        match self
            .store
            .put(cache_name, key.clone(), response.clone())
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                debug!(cache_name, %key, "Response evicted by the partition's limits");
                false
            }
            Err(e) => {
                warn!(cache_name, %key, error = %e, "Failed to cache response");
                false
            }
        }
    }

    /// Publishes an update for a replaced entry according to the target's
    /// broadcast mode.
    fn announce(
        &self,
        target: &CacheTarget,
        key: &RequestKey,
        previous: &ResponseSnapshot,
        fresh: &ResponseSnapshot,
    ) {
        let changed = !responses_are_same(previous, fresh);
        let publish = match target.broadcast {
            BroadcastMode::Off => false,
            BroadcastMode::OnChange => changed,
            BroadcastMode::Always => true,
        };
        if !publish {
            return;
        }

        let event = UpdateEvent {
            cache_name: target.cache_name.clone(),
            url: key.url().to_string(),
            timestamp: self.store.now_ms(),
            changed,
        };
        let reached = self.hub.publish(&self.channel, event);
        info!(
            cache_name = %target.cache_name,
            %key,
            changed,
            reached,
            "Cache update broadcast"
        );
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ExpirationPolicy, ManualClock, StorageLimits};
    use crate::models::BroadcastMessage;
    use async_trait::async_trait;
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use url::Url;

    const CACHE: &str = "api-responses";
    const CHANNEL: &str = "cache-updates";

    /// Answers with the status from the `status` query parameter and the
    /// currently configured etag; counts every call.
    #[derive(Default)]
    struct ScriptedNetwork {
        calls: AtomicUsize,
        etag: Mutex<String>,
        offline: Mutex<bool>,
    }

    impl ScriptedNetwork {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn set_etag(&self, etag: &str) {
            *self.etag.lock().unwrap() = etag.to_string();
        }

        fn set_offline(&self, offline: bool) {
            *self.offline.lock().unwrap() = offline;
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedNetwork {
        async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if *self.offline.lock().unwrap() {
                return Err(FetchError::Network("connection refused".to_string()));
            }

            let status = request
                .url
                .query_pairs()
                .find(|(k, _)| k == "status")
                .and_then(|(_, v)| v.parse().ok())
                .unwrap_or(200);
            let mut headers = HeaderMap::new();
            let etag = self.etag.lock().unwrap().clone();
            if !etag.is_empty() {
                headers.insert("etag", HeaderValue::from_str(&etag).unwrap());
            }
            Ok(ResponseSnapshot::new(
                StatusCode::from_u16(status).unwrap(),
                headers,
                format!("call {}", self.calls()),
            ))
        }
    }

    struct Harness {
        clock: Arc<ManualClock>,
        network: Arc<ScriptedNetwork>,
        store: CacheStore,
        hub: BroadcastHub,
        interceptor: Interceptor,
    }

    async fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(0));
        let network = Arc::new(ScriptedNetwork::default());
        let store = CacheStore::new(StorageLimits::default(), clock.clone());
        let policy = ExpirationPolicy::default()
            .with_max_age_seconds(60)
            .with_max_entries(10);
        store.open(CACHE, policy).await;

        let hub = BroadcastHub::default();
        let interceptor = Interceptor::new(store.clone(), network.clone(), hub.clone(), CHANNEL);
        Harness {
            clock,
            network,
            store,
            hub,
            interceptor,
        }
    }

    fn request(path: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(&format!("http://localhost{}", path)).unwrap())
    }

    fn target() -> CacheTarget {
        CacheTarget::new(CACHE)
    }

    #[tokio::test]
    async fn test_miss_then_hit_uses_network_once() {
        let h = harness().await;
        let req = request("/api/test-response?status=200");

        let first = h.interceptor.handle(&req, &target()).await.unwrap();
        let second = h.interceptor.handle(&req, &target()).await.unwrap();

        assert_eq!(first.status, CacheStatus::Miss);
        assert_eq!(second.status, CacheStatus::Hit);
        assert_eq!(second.response.body, first.response.body);
        assert_eq!(h.network.calls(), 1);
    }

    #[tokio::test]
    async fn test_expiration_scenario() {
        let h = harness().await;
        let req = request("/api/test-response?status=200");
        let key = req.key();

        h.interceptor.handle(&req, &target()).await.unwrap();

        h.clock.set(30_000);
        let hit = h.interceptor.handle(&req, &target()).await.unwrap();
        assert_eq!(hit.status, CacheStatus::Hit);
        assert_eq!(h.network.calls(), 1);

        h.clock.set(95_000);
        let refetched = h.interceptor.handle(&req, &target()).await.unwrap();
        assert_eq!(refetched.status, CacheStatus::Expired);
        assert_eq!(h.network.calls(), 2);

        let entry = h.store.match_entry(CACHE, &key).await.unwrap();
        assert_eq!(entry.stored_at, 95_000);
        assert_eq!(&entry.response.body[..], b"call 2");
    }

    #[tokio::test]
    async fn test_error_statuses_never_cached() {
        let h = harness().await;
        for status in [404, 500] {
            let req = request(&format!("/api/test-response?status={}", status));
            for _ in 0..2 {
                let out = h.interceptor.handle(&req, &target()).await.unwrap();
                assert_eq!(out.response.status.as_u16(), status);
                assert_eq!(out.status, CacheStatus::Miss);
            }
            assert!(h.store.match_entry(CACHE, &req.key()).await.is_none());
        }
        assert_eq!(h.network.calls(), 4);
    }

    #[tokio::test]
    async fn test_network_failure_propagates_on_miss() {
        let h = harness().await;
        h.network.set_offline(true);

        let result = h.interceptor.handle(&request("/api/a"), &target()).await;
        assert!(matches!(result, Err(FetchError::Network(_))));
    }

    #[tokio::test]
    async fn test_no_stale_fallback_when_refetch_fails() {
        let h = harness().await;
        let req = request("/api/a");
        h.interceptor.handle(&req, &target()).await.unwrap();

        h.clock.set(61_000);
        h.network.set_offline(true);
        let result = h.interceptor.handle(&req, &target()).await;

        assert!(matches!(result, Err(FetchError::Network(_))));
        assert!(h.store.match_entry(CACHE, &req.key()).await.is_none());
    }

    #[tokio::test]
    async fn test_non_get_bypasses_cache() {
        let h = harness().await;
        let req = FetchRequest::new(Method::POST, Url::parse("http://localhost/api/a").unwrap());

        let out = h.interceptor.handle(&req, &target()).await.unwrap();
        assert_eq!(out.status, CacheStatus::Bypass);
        assert!(h.store.keys(CACHE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_partition_falls_back_to_network() {
        let h = harness().await;
        let req = request("/api/a");
        let missing = CacheTarget::new("never-opened");

        let first = h.interceptor.handle(&req, &missing).await.unwrap();
        let second = h.interceptor.handle(&req, &missing).await.unwrap();
        assert_eq!(first.status, CacheStatus::Miss);
        assert_eq!(second.status, CacheStatus::Miss);
        assert_eq!(h.network.calls(), 2);
    }

    #[tokio::test]
    async fn test_quota_failure_still_returns_response() {
        let clock = Arc::new(ManualClock::new(0));
        let network = Arc::new(ScriptedNetwork::default());
        let limits = StorageLimits {
            max_partition_bytes: 2,
            max_entry_bytes: 2,
        };
        let store = CacheStore::new(limits, clock);
        store.open(CACHE, ExpirationPolicy::default()).await;
        let interceptor =
            Interceptor::new(store.clone(), network.clone(), BroadcastHub::default(), CHANNEL);

        let out = interceptor.handle(&request("/api/a"), &target()).await.unwrap();
        assert_eq!(out.response.status, StatusCode::OK);
        assert!(store.keys(CACHE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replacement_broadcasts_on_change() {
        let h = harness().await;
        let mut sub = h.hub.subscribe(CHANNEL);
        let target = target().with_broadcast(BroadcastMode::OnChange);
        let req = request("/api/test-copy");

        h.network.set_etag("\"v1\"");
        h.interceptor.handle(&req, &target).await.unwrap();

        h.clock.set(61_000);
        h.network.set_etag("\"v2\"");
        h.interceptor.handle(&req, &target).await.unwrap();

        let msg = sub.recv().await.unwrap();
        assert_eq!(
            msg,
            BroadcastMessage::CacheUpdated {
                timestamp: 61_000,
                url: Some("http://localhost/api/test-copy".to_string()),
                cache_name: Some(CACHE.to_string()),
                are_responses_same: Some(false),
            }
        );
    }

    fn marker() -> BroadcastMessage {
        BroadcastMessage::CacheUpdated {
            timestamp: 0,
            url: None,
            cache_name: None,
            are_responses_same: None,
        }
    }

    /// Publishes a marker and checks it is the next thing `sub` receives,
    /// proving nothing was broadcast before it.
    async fn assert_nothing_published(hub: &BroadcastHub, sub: &mut crate::broadcast::Subscription) {
        hub.publish(CHANNEL, marker());
        assert_eq!(sub.recv().await, Some(marker()));
    }

    #[tokio::test]
    async fn test_unchanged_replacement_is_silent_on_change_mode() {
        let h = harness().await;
        let mut sub = h.hub.subscribe(CHANNEL);
        let target = target().with_broadcast(BroadcastMode::OnChange);
        let req = request("/api/test-copy");
        h.network.set_etag("\"static\"");

        h.interceptor.handle(&req, &target).await.unwrap();
        h.clock.set(61_000);
        h.interceptor.handle(&req, &target).await.unwrap();

        assert_nothing_published(&h.hub, &mut sub).await;
    }

    #[tokio::test]
    async fn test_always_mode_reports_unchanged() {
        let h = harness().await;
        let mut sub = h.hub.subscribe(CHANNEL);
        let target = target().with_broadcast(BroadcastMode::Always);
        let req = request("/api/test-copy");
        h.network.set_etag("\"static\"");

        h.interceptor.handle(&req, &target).await.unwrap();
        h.clock.set(61_000);
        h.interceptor.handle(&req, &target).await.unwrap();

        let msg = sub.recv().await.unwrap();
        assert!(matches!(
            msg,
            BroadcastMessage::CacheUpdated {
                are_responses_same: Some(true),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_first_write_never_broadcasts() {
        let h = harness().await;
        let mut sub = h.hub.subscribe(CHANNEL);
        let target = target().with_broadcast(BroadcastMode::Always);

        h.interceptor
            .handle(&request("/api/test-copy"), &target)
            .await
            .unwrap();

        assert_nothing_published(&h.hub, &mut sub).await;
    }

    #[tokio::test]
    async fn test_fresh_hit_never_broadcasts() {
        let h = harness().await;
        let mut sub = h.hub.subscribe(CHANNEL);
        let target = target().with_broadcast(BroadcastMode::Always);
        let req = request("/api/test-copy");

        h.interceptor.handle(&req, &target).await.unwrap();
        h.clock.set(30_000);
        h.interceptor.handle(&req, &target).await.unwrap();

        assert_nothing_published(&h.hub, &mut sub).await;
    }

    #[tokio::test]
    async fn test_fresh_hit_expires_other_stale_entries() {
        let h = harness().await;
        let old = request("/api/a");
        let recent = request("/api/b");

        h.interceptor.handle(&old, &target()).await.unwrap();
        h.clock.set(50_000);
        h.interceptor.handle(&recent, &target()).await.unwrap();

        h.clock.set(70_000);
        let hit = h.interceptor.handle(&recent, &target()).await.unwrap();
        assert_eq!(hit.status, CacheStatus::Hit);

        assert!(h.store.match_entry(CACHE, &old.key()).await.is_none());
        assert_eq!(h.store.keys(CACHE).await.unwrap(), vec![recent.key()]);
        assert_eq!(h.network.calls(), 2);
    }

    #[tokio::test]
    async fn test_replacement_evicted_by_zero_limit_is_silent() {
        let h = harness().await;
        let mut sub = h.hub.subscribe(CHANNEL);
        let target = target().with_broadcast(BroadcastMode::Always);
        let req = request("/api/test-copy");

        h.interceptor.handle(&req, &target).await.unwrap();
        h.clock.set(61_000);
        h.store
            .open(
                CACHE,
                ExpirationPolicy::default()
                    .with_max_age_seconds(60)
                    .with_max_entries(0),
            )
            .await;

        let out = h.interceptor.handle(&req, &target).await.unwrap();
        assert_eq!(out.status, CacheStatus::Expired);
        assert!(h.store.match_entry(CACHE, &req.key()).await.is_none());
        assert_nothing_published(&h.hub, &mut sub).await;
    }

    /// Writes its own copy of the key into the store before answering, like
    /// a concurrent refresh landing mid-refetch.
    struct RacingWriter {
        store: CacheStore,
    }

    #[async_trait]
    impl Fetcher for RacingWriter {
        async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot, FetchError> {
            let other = ResponseSnapshot::new(StatusCode::OK, HeaderMap::new(), "concurrent");
            self.store.put(CACHE, request.key(), other).await.unwrap();
            Ok(ResponseSnapshot::new(StatusCode::OK, HeaderMap::new(), "refetched"))
        }
    }

    #[tokio::test]
    async fn test_stale_refetch_overwrites_concurrent_refresh() {
        let h = harness().await;
        let req = request("/api/a");
        h.interceptor.handle(&req, &target()).await.unwrap();

        h.clock.set(61_000);
        let racing = Interceptor::new(
            h.store.clone(),
            Arc::new(RacingWriter {
                store: h.store.clone(),
            }),
            h.hub.clone(),
            CHANNEL,
        );
        let out = racing.handle(&req, &target()).await.unwrap();
        assert_eq!(out.status, CacheStatus::Expired);

        let entry = h.store.match_entry(CACHE, &req.key()).await.unwrap();
        assert_eq!(&entry.response.body[..], b"refetched");
        assert_eq!(h.store.keys(CACHE).await.unwrap(), vec![req.key()]);
    }

    #[tokio::test]
    async fn test_write_enforces_entry_limit() {
        let h = harness().await;
        for i in 0..10 {
            h.clock.set(i * 1_000);
            h.interceptor
                .handle(&request(&format!("/api/{}", i)), &target())
                .await
                .unwrap();
        }
        h.clock.set(20_000);
        h.interceptor.handle(&request("/api/extra"), &target()).await.unwrap();

        let keys = h.store.keys(CACHE).await.unwrap();
        assert_eq!(keys.len(), 10);
        assert!(!keys.contains(&request("/api/0").key()));
    }
}
