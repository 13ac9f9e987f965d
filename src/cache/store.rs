//! Cache Store Module
//!
//! Shared handle over every named partition. Constructed once at startup and
//! passed to whoever needs it; clones share the same state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cache::{
    CacheEntry, CacheStats, Clock, ExpirationPolicy, Lookup, Partition, RequestKey,
    ResponseSnapshot, StorageLimits,
};
use crate::error::StorageError;

// == Cache Store ==
/// Partitioned response cache with per-partition expiry bookkeeping.
///
/// Every operation takes the lock once and finishes before releasing it, so
/// a pair is never observed half-written or half-deleted.
#[derive(Debug, Clone)]
pub struct CacheStore {
    partitions: Arc<RwLock<HashMap<String, Partition>>>,
    clock: Arc<dyn Clock>,
    limits: StorageLimits,
}

impl CacheStore {
    // == Constructor ==
    pub fn new(limits: StorageLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            partitions: Arc::new(RwLock::new(HashMap::new())),
            clock,
            limits,
        }
    }

    /// Current time according to the store's clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // == Open ==
    /// Creates the partition if needed and applies `policy` to it.
    pub async fn open(&self, cache_name: &str, policy: ExpirationPolicy) {
        let mut partitions = self.partitions.write().await;
        match partitions.get_mut(cache_name) {
            Some(partition) => partition.set_policy(policy),
            None => {
                info!(cache_name, ?policy, "Opened cache partition");
                partitions.insert(
                    cache_name.to_string(),
                    Partition::new(cache_name, policy, self.limits),
                );
            }
        }
    }

    pub async fn has(&self, cache_name: &str) -> bool {
        self.partitions.read().await.contains_key(cache_name)
    }

    pub async fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    // == Match ==
    /// Plain lookup: no freshness check, no statistics.
    pub async fn match_entry(&self, cache_name: &str, key: &RequestKey) -> Option<CacheEntry> {
        self.partitions
            .read()
            .await
            .get(cache_name)
            .and_then(|p| p.match_entry(key).cloned())
    }

    // == Lookup ==
    /// Matches `key` and classifies it as fresh, stale or absent.
    pub async fn lookup(&self, cache_name: &str, key: &RequestKey) -> Result<Lookup, StorageError> {
        let now = self.now_ms();
        let mut partitions = self.partitions.write().await;
        let partition = partition_mut(&mut partitions, cache_name)?;
        Ok(partition.lookup(key, now))
    }

    // == Put ==
    /// Stores `response` under `key`, creating the entry and its expiry
    /// record together.
    ///
    /// Returns false when the partition's own limits removed the new pair in
    /// the same write (e.g. an entry limit of zero).
    pub async fn put(
        &self,
        cache_name: &str,
        key: RequestKey,
        response: ResponseSnapshot,
    ) -> Result<bool, StorageError> {
        let now = self.now_ms();
        let mut partitions = self.partitions.write().await;
        let partition = partition_mut(&mut partitions, cache_name)?;

        let removed = partition.put(CacheEntry::new(key.clone(), response, now), now)?;
        if !removed.is_empty() {
            debug!(cache_name, removed = removed.len(), "Write pushed out older entries");
        }
        Ok(partition.match_entry(&key).is_some())
    }

    // == Update Timestamp ==
    /// Sets `last_accessed = now` for a stored key, then enforces the entry
    /// limit. Returns false when nothing is stored under `key`.
    pub async fn update_timestamp(
        &self,
        cache_name: &str,
        key: &RequestKey,
    ) -> Result<bool, StorageError> {
        let now = self.now_ms();
        let mut partitions = self.partitions.write().await;
        let partition = partition_mut(&mut partitions, cache_name)?;

        let updated = partition.update_timestamp(key, now);
        if !updated {
            debug!(cache_name, %key, "No stored entry to touch");
        }
        Ok(updated)
    }

    // == Is Expired ==
    /// True when no record exists or the record is idle past the age limit.
    pub async fn is_expired(&self, cache_name: &str, key: &RequestKey) -> bool {
        let now = self.now_ms();
        self.partitions
            .read()
            .await
            .get(cache_name)
            .map_or(true, |p| p.is_expired(key, now))
    }

    // == Expire Entries ==
    /// Runs one expiration pass over a partition and returns the URLs
    /// it removed.
    pub async fn expire_entries(&self, cache_name: &str) -> Result<Vec<String>, StorageError> {
        let now = self.now_ms();
        let mut partitions = self.partitions.write().await;
        let partition = partition_mut(&mut partitions, cache_name)?;

        let selection = partition.expire_entries(now);
        Ok(selection
            .aged
            .iter()
            .chain(selection.overflow.iter())
            .map(|k| k.url().to_string())
            .collect())
    }

    // == Expire All ==
    /// Runs an expiration pass over every partition. Returns pairs removed.
    pub async fn expire_all(&self) -> usize {
        let now = self.now_ms();
        let mut partitions = self.partitions.write().await;
        partitions
            .values_mut()
            .map(|p| p.expire_entries(now).len())
            .sum()
    }

    // == Delete Record ==
    /// Removes one entry and its record. Returns false if nothing was stored.
    pub async fn delete_record(
        &self,
        cache_name: &str,
        key: &RequestKey,
    ) -> Result<bool, StorageError> {
        let mut partitions = self.partitions.write().await;
        let partition = partition_mut(&mut partitions, cache_name)?;
        Ok(partition.delete_record(key))
    }

    // == Clear Cache ==
    /// Empties a partition. It stays open with its policy, so later writes
    /// land in it as before. Returns false if the partition was never opened.
    pub async fn clear_cache(&self, cache_name: &str) -> bool {
        let mut partitions = self.partitions.write().await;
        match partitions.get_mut(cache_name) {
            Some(partition) => {
                let removed = partition.clear();
                info!(cache_name, removed, "Cleared cache partition");
                true
            }
            None => false,
        }
    }

    // == Keys ==
    /// Stored keys of a partition, least recently accessed first.
    pub async fn keys(&self, cache_name: &str) -> Result<Vec<RequestKey>, StorageError> {
        self.partitions
            .read()
            .await
            .get(cache_name)
            .map(|p| p.keys())
            .ok_or_else(|| StorageError::UnknownPartition(cache_name.to_string()))
    }

    // == Stats ==
    /// Statistics for every partition, ordered by name.
    pub async fn stats(&self) -> BTreeMap<String, CacheStats> {
        self.partitions
            .read()
            .await
            .iter()
            .map(|(name, p)| (name.clone(), p.stats()))
            .collect()
    }
}

fn partition_mut<'a>(
    partitions: &'a mut HashMap<String, Partition>,
    cache_name: &str,
) -> Result<&'a mut Partition, StorageError> {
    partitions
        .get_mut(cache_name)
        .ok_or_else(|| StorageError::UnknownPartition(cache_name.to_string()))
}
