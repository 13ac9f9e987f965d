//! Response DTOs for the caching proxy API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::CacheStats;

/// Response body for `DELETE /__sw/cache/:cache_name`
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// Partition the deletion applied to
    pub cache_name: String,
    /// The removed record, absent when the whole partition was cleared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl DeleteResponse {
    pub fn record(cache_name: impl Into<String>, url: impl Into<String>) -> Self {
        let cache_name = cache_name.into();
        let url = url.into();
        Self {
            message: format!("Deleted '{}' from '{}'", url, cache_name),
            cache_name,
            url: Some(url),
        }
    }

    pub fn partition(cache_name: impl Into<String>) -> Self {
        let cache_name = cache_name.into();
        Self {
            message: format!("Cache '{}' cleared", cache_name),
            cache_name,
            url: None,
        }
    }
}

/// One partition's counters as reported by the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionStats {
    pub cache_name: String,
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
    pub rejected_writes: u64,
    pub total_entries: usize,
    pub stored_bytes: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl PartitionStats {
    pub fn new(cache_name: impl Into<String>, stats: &CacheStats) -> Self {
        Self {
            cache_name: cache_name.into(),
            hits: stats.hits,
            misses: stats.misses,
            expirations: stats.expirations,
            evictions: stats.evictions,
            rejected_writes: stats.rejected_writes,
            total_entries: stats.total_entries,
            stored_bytes: stats.stored_bytes,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Response body for `GET /__sw/stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Partitions ordered by name
    pub partitions: Vec<PartitionStats>,
    /// Entries across all partitions
    pub total_entries: usize,
}

impl StatsResponse {
    pub fn new(stats: &BTreeMap<String, CacheStats>) -> Self {
        let partitions: Vec<PartitionStats> = stats
            .iter()
            .map(|(name, s)| PartitionStats::new(name.clone(), s))
            .collect();
        let total_entries = partitions.iter().map(|p| p.total_entries).sum();
        Self {
            partitions,
            total_entries,
        }
    }
}

/// Response body for `POST /__sw/updates`
#[derive(Debug, Clone, Serialize)]
pub struct PublishResponse {
    /// Subscribers the message reached
    pub receivers: usize,
}

/// Response body for the health endpoint (GET /__sw/health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
