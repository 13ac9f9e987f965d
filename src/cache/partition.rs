//! Cache Partition Module
//!
//! One named cache: response entries and their expiry records, kept in
//! lockstep so that neither side ever exists without the other.

use std::collections::HashMap;

use tracing::debug;

use crate::cache::{
    CacheEntry, CacheStats, ExpirationPolicy, ExpiredSelection, ExpiryRecords, RequestKey,
};
use crate::error::StorageError;

// == Storage Limits ==
/// Byte budgets applied to every partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLimits {
    /// Total body bytes one partition may hold
    pub max_partition_bytes: usize,
    /// Largest single body accepted
    pub max_entry_bytes: usize,
}

impl Default for StorageLimits {
    fn default() -> Self {
        Self {
            max_partition_bytes: 50 * 1024 * 1024,
            max_entry_bytes: 5 * 1024 * 1024,
        }
    }
}

// == Lookup ==
/// Result of matching a request against a partition.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Entry present and within its age limit
    Fresh(CacheEntry),
    /// Entry present but idle past its age limit
    Stale(CacheEntry),
    /// No entry for this key
    Absent,
}

// == Partition ==
/// A single cache partition with age and count based expiration.
#[derive(Debug)]
pub struct Partition {
    name: String,
    policy: ExpirationPolicy,
    limits: StorageLimits,
    /// Response storage
    entries: HashMap<RequestKey, CacheEntry>,
    /// Freshness metadata, keyed identically to `entries`
    records: ExpiryRecords,
    stats: CacheStats,
    used_bytes: usize,
}

impl Partition {
    // == Constructor ==
    pub fn new(name: impl Into<String>, policy: ExpirationPolicy, limits: StorageLimits) -> Self {
        let name = name.into();
        Self {
            records: ExpiryRecords::new(name.clone()),
            name,
            policy,
            limits,
            entries: HashMap::new(),
            stats: CacheStats::new(),
            used_bytes: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &ExpirationPolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: ExpirationPolicy) {
        self.policy = policy;
    }

    // == Match ==
    /// Returns the stored entry without touching freshness or statistics.
    pub fn match_entry(&self, key: &RequestKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Lookup ==
    /// Matches `key` and classifies the entry by freshness.
    ///
    /// Fresh entries count as hits; stale and absent ones as misses.
    pub fn lookup(&mut self, key: &RequestKey, now_ms: u64) -> Lookup {
        let Some(entry) = self.entries.get(key) else {
            self.stats.record_miss();
            return Lookup::Absent;
        };

        if self.records.is_expired(key, &self.policy, now_ms) {
            self.stats.record_miss();
            Lookup::Stale(entry.clone())
        } else {
            self.stats.record_hit();
            Lookup::Fresh(entry.clone())
        }
    }

    // == Put ==
    /// Writes an entry and its expiry record together.
    ///
    /// A rejected write leaves the partition unchanged. Returns whatever the
    /// entry limit forced out.
    pub fn put(&mut self, entry: CacheEntry, now_ms: u64) -> Result<ExpiredSelection, StorageError> {
        let size = entry.response.size();
        if size > self.limits.max_entry_bytes {
            self.stats.record_rejected_write();
            return Err(StorageError::EntryTooLarge {
                size,
                limit: self.limits.max_entry_bytes,
            });
        }

        let replaced = self
            .entries
            .get(&entry.key)
            .map(|e| e.response.size())
            .unwrap_or(0);
        let base = self.used_bytes - replaced;
        if base + size > self.limits.max_partition_bytes {
            self.stats.record_rejected_write();
            return Err(StorageError::QuotaExceeded {
                cache_name: self.name.clone(),
                needed: size,
                available: self.limits.max_partition_bytes.saturating_sub(base),
            });
        }

        let key = entry.key.clone();
        self.entries.insert(key.clone(), entry);
        self.records.touch(&key, now_ms);
        self.used_bytes = base + size;

        let removed = if self.policy.is_over_capacity(self.records.len()) {
            self.expire_entries(now_ms)
        } else {
            ExpiredSelection::default()
        };
        self.refresh_usage();
        Ok(removed)
    }

    // == Update Timestamp ==
    /// Marks `key` as accessed now.
    ///
    /// Only keys with a stored entry get a record; returns false otherwise.
    pub fn update_timestamp(&mut self, key: &RequestKey, now_ms: u64) -> bool {
        if !self.entries.contains_key(key) {
            return false;
        }

        self.records.touch(key, now_ms);
        if self.policy.is_over_capacity(self.records.len()) {
            self.expire_entries(now_ms);
        }
        true
    }

    // == Is Expired ==
    pub fn is_expired(&self, key: &RequestKey, now_ms: u64) -> bool {
        self.records.is_expired(key, &self.policy, now_ms)
    }

    // == Expire Entries ==
    /// Deletes every pair past the age limit or outside the entry limit.
    pub fn expire_entries(&mut self, now_ms: u64) -> ExpiredSelection {
        let selection = self.records.select_expired(&self.policy, now_ms);
        if selection.is_empty() {
            return selection;
        }

        for key in selection.aged.iter().chain(selection.overflow.iter()) {
            self.remove_pair(key);
        }

        self.stats.record_expirations(selection.aged.len());
        self.stats.record_evictions(selection.overflow.len());
        self.refresh_usage();

        debug!(
            cache_name = %self.name,
            aged = selection.aged.len(),
            overflow = selection.overflow.len(),
            "Expired cache entries"
        );
        selection
    }

    // == Delete Record ==
    /// Removes one pair. Returns false if the key was not stored.
    pub fn delete_record(&mut self, key: &RequestKey) -> bool {
        let removed = self.remove_pair(key);
        self.refresh_usage();
        removed
    }

    // == Clear ==
    /// Removes every pair but keeps the partition, its policy and its
    /// counters. Returns how many pairs were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.records.clear();
        self.used_bytes = 0;
        self.refresh_usage();
        removed
    }

    // == Keys ==
    /// Stored keys, least recently accessed first.
    pub fn keys(&self) -> Vec<RequestKey> {
        self.records
            .oldest_first()
            .into_iter()
            .map(|r| r.key.clone())
            .collect()
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_accessed(&self, key: &RequestKey) -> Option<u64> {
        self.records.get(key).map(|r| r.last_accessed)
    }

    /// Both deletions happen in the same call so no reader can observe one
    /// side without the other.
    fn remove_pair(&mut self, key: &RequestKey) -> bool {
        let entry = self.entries.remove(key);
        let record = self.records.remove(key);
        if let Some(entry) = &entry {
            self.used_bytes -= entry.response.size();
        }
        entry.is_some() || record.is_some()
    }

    fn refresh_usage(&mut self) {
        self.stats.set_usage(self.entries.len(), self.used_bytes);
    }

    /// Every entry has a record and every record has an entry.
    #[cfg(test)]
    pub(crate) fn is_paired(&self) -> bool {
        self.entries.len() == self.records.len()
            && self.entries.keys().all(|k| self.records.contains(k))
    }
}
