//! Configuration Module
//!
//! Handles loading server configuration from environment variables and
//! defines the route table that maps request paths to cache partitions.

use std::env;
use std::str::FromStr;

use crate::broadcast::CACHE_UPDATES_CHANNEL;
use crate::cache::{ExpirationPolicy, StorageLimits};
use crate::intercept::{BroadcastMode, CacheTarget};

/// Partition filled by the on-demand image request.
pub const STATIC_IMAGE_CACHE: &str = "static-image-assets";

/// Path of the image cached by the `cache-on-demand` action.
pub const ON_DEMAND_IMAGE: &str = "images/cache-me-outside.jpg";

// == Strategy ==
/// How a matched route is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Serve fresh entries from the cache, otherwise go to the network
    CacheFirst,
    /// Always go to the network, never store
    NetworkOnly,
}

// == Route Rule ==
/// Maps a path prefix to a cache partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub prefix: String,
    pub strategy: Strategy,
    pub cache_name: String,
    pub policy: ExpirationPolicy,
    pub broadcast: BroadcastMode,
}

impl RouteRule {
    pub fn cache_first(prefix: &str, cache_name: &str, policy: ExpirationPolicy) -> Self {
        Self {
            prefix: prefix.to_string(),
            strategy: Strategy::CacheFirst,
            cache_name: cache_name.to_string(),
            policy,
            broadcast: BroadcastMode::Off,
        }
    }

    pub fn network_only(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            strategy: Strategy::NetworkOnly,
            cache_name: String::new(),
            policy: ExpirationPolicy::default(),
            broadcast: BroadcastMode::Off,
        }
    }

    pub fn with_broadcast(mut self, broadcast: BroadcastMode) -> Self {
        self.broadcast = broadcast;
        self
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    pub fn target(&self) -> CacheTarget {
        CacheTarget::new(self.cache_name.clone()).with_broadcast(self.broadcast)
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Origin every proxied request is forwarded to
    pub upstream_origin: String,
    /// HTTP server port
    pub server_port: u16,
    /// Background expiration sweep interval in seconds
    pub sweep_interval: u64,
    /// Upstream request timeout in seconds
    pub fetch_timeout: u64,
    /// Byte budget per partition
    pub max_partition_bytes: usize,
    /// Largest response body that may be cached
    pub max_body_bytes: usize,
    /// Partition filled by CACHE_URLS messages
    pub runtime_cache_name: String,
    /// Channel cache updates are broadcast on
    pub broadcast_channel: String,
    /// Age limit for the `api-responses` partition in seconds
    pub api_max_age: u64,
    /// Entry limit for the `api-responses` partition
    pub api_max_entries: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `UPSTREAM_ORIGIN` - Origin to proxy to (default: http://127.0.0.1:3000)
    /// - `SERVER_PORT` - HTTP server port (default: 8080)
    /// - `SWEEP_INTERVAL` - Expiration sweep frequency in seconds (default: 30)
    /// - `FETCH_TIMEOUT` - Upstream timeout in seconds (default: 20)
    /// - `MAX_PARTITION_BYTES` - Byte budget per partition (default: 50 MiB)
    /// - `MAX_BODY_BYTES` - Largest cacheable body (default: 5 MiB)
    /// - `RUNTIME_CACHE_NAME` - Partition for CACHE_URLS (default: runtime)
    /// - `BROADCAST_CHANNEL` - Update channel name (default: cache-updates)
    /// - `API_MAX_AGE` - api-responses age limit in seconds (default: 60)
    /// - `API_MAX_ENTRIES` - api-responses entry limit (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            upstream_origin: env::var("UPSTREAM_ORIGIN").unwrap_or(defaults.upstream_origin),
            server_port: parse_env("SERVER_PORT").unwrap_or(defaults.server_port),
            sweep_interval: parse_env("SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
            fetch_timeout: parse_env("FETCH_TIMEOUT").unwrap_or(defaults.fetch_timeout),
            max_partition_bytes: parse_env("MAX_PARTITION_BYTES")
                .unwrap_or(defaults.max_partition_bytes),
            max_body_bytes: parse_env("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            runtime_cache_name: env::var("RUNTIME_CACHE_NAME")
                .unwrap_or(defaults.runtime_cache_name),
            broadcast_channel: env::var("BROADCAST_CHANNEL").unwrap_or(defaults.broadcast_channel),
            api_max_age: parse_env("API_MAX_AGE").unwrap_or(defaults.api_max_age),
            api_max_entries: parse_env("API_MAX_ENTRIES").unwrap_or(defaults.api_max_entries),
        }
    }

    pub fn storage_limits(&self) -> StorageLimits {
        StorageLimits {
            max_partition_bytes: self.max_partition_bytes,
            max_entry_bytes: self.max_body_bytes,
        }
    }

    /// Route table, first match wins. Unmatched paths are network-only.
    pub fn routes(&self) -> Vec<RouteRule> {
        let minute = ExpirationPolicy::default().with_max_age_seconds(60);
        let api = ExpirationPolicy::new(Some(self.api_max_age), Some(self.api_max_entries));
        let images = ExpirationPolicy::default()
            .with_max_age_seconds(30 * 24 * 60 * 60)
            .with_max_entries(64);

        vec![
            RouteRule::network_only("/api/upload"),
            RouteRule::cache_first("/api/test-copy", "test-copy-cache", minute)
                .with_broadcast(BroadcastMode::OnChange),
            RouteRule::cache_first("/api/", "api-responses", api),
            RouteRule::cache_first("/images/", STATIC_IMAGE_CACHE, images),
        ]
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_origin: "http://127.0.0.1:3000".to_string(),
            server_port: 8080,
            sweep_interval: 30,
            fetch_timeout: 20,
            max_partition_bytes: 50 * 1024 * 1024,
            max_body_bytes: 5 * 1024 * 1024,
            runtime_cache_name: "runtime".to_string(),
            broadcast_channel: CACHE_UPDATES_CHANNEL.to_string(),
            api_max_age: 60,
            api_max_entries: 10,
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
