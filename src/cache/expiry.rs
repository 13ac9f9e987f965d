//! Expiry Records Module
//!
//! Freshness metadata for one partition: request key to last-access time,
//! plus the expiration policy that decides which records are past due.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cache::RequestKey;

// == Expiration Policy ==
/// Age and count limits for a partition.
///
/// Age is measured from the last access, not from the write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationPolicy {
    /// Entries idle for longer than this are expired. None = no age limit.
    pub max_age_seconds: Option<u64>,
    /// Maximum records kept. None = unbounded.
    pub max_entries: Option<usize>,
}

impl ExpirationPolicy {
    pub fn new(max_age_seconds: Option<u64>, max_entries: Option<usize>) -> Self {
        Self {
            max_age_seconds,
            max_entries,
        }
    }

    pub fn with_max_age_seconds(mut self, max_age_seconds: u64) -> Self {
        self.max_age_seconds = Some(max_age_seconds);
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// True once more than `max_age_seconds` has elapsed since `last_accessed`.
    ///
    /// The boundary instant itself is still fresh.
    pub fn is_stale(&self, last_accessed: u64, now_ms: u64) -> bool {
        match self.max_age_seconds {
            Some(max_age) => now_ms.saturating_sub(last_accessed) > max_age.saturating_mul(1000),
            None => false,
        }
    }

    /// True when `count` records exceed the entry limit.
    pub fn is_over_capacity(&self, count: usize) -> bool {
        self.max_entries.is_some_and(|max| count > max)
    }
}

// == Expiry Record ==
/// Last-access bookkeeping for one cached request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryRecord {
    pub key: RequestKey,
    pub cache_name: String,
    /// Unix milliseconds of the last write or fresh read
    pub last_accessed: u64,
    /// Creation order within the partition; breaks `last_accessed` ties
    seq: u64,
}

// == Expired Selection ==
/// Keys chosen by one expiration pass, split by reason.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExpiredSelection {
    /// Idle past `max_age_seconds`
    pub aged: Vec<RequestKey>,
    /// Ranked outside the most recent `max_entries`
    pub overflow: Vec<RequestKey>,
}

impl ExpiredSelection {
    pub fn is_empty(&self) -> bool {
        self.aged.is_empty() && self.overflow.is_empty()
    }

    pub fn len(&self) -> usize {
        self.aged.len() + self.overflow.len()
    }
}

// == Expiry Records ==
/// All expiry records of a single partition.
#[derive(Debug)]
pub struct ExpiryRecords {
    cache_name: String,
    records: HashMap<RequestKey, ExpiryRecord>,
    next_seq: u64,
}

impl ExpiryRecords {
    // == Constructor ==
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            records: HashMap::new(),
            next_seq: 0,
        }
    }

    // == Touch ==
    /// Upserts the record for `key` with `last_accessed = now_ms`.
    ///
    /// An existing record keeps its creation order.
    pub fn touch(&mut self, key: &RequestKey, now_ms: u64) {
        if let Some(record) = self.records.get_mut(key) {
            record.last_accessed = now_ms;
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.records.insert(
            key.clone(),
            ExpiryRecord {
                key: key.clone(),
                cache_name: self.cache_name.clone(),
                last_accessed: now_ms,
                seq,
            },
        );
    }

    // == Get ==
    pub fn get(&self, key: &RequestKey) -> Option<&ExpiryRecord> {
        self.records.get(key)
    }

    // == Is Expired ==
    /// A missing record counts as expired.
    pub fn is_expired(&self, key: &RequestKey, policy: &ExpirationPolicy, now_ms: u64) -> bool {
        match self.records.get(key) {
            Some(record) => policy.is_stale(record.last_accessed, now_ms),
            None => true,
        }
    }

    // == Remove ==
    pub fn remove(&mut self, key: &RequestKey) -> Option<ExpiryRecord> {
        self.records.remove(key)
    }

    // == Oldest First ==
    /// Records ordered by ascending `last_accessed`, ties by creation order.
    pub fn oldest_first(&self) -> Vec<&ExpiryRecord> {
        let mut ordered: Vec<&ExpiryRecord> = self.records.values().collect();
        ordered.sort_by_key(|r| (r.last_accessed, r.seq));
        ordered
    }

    // == Select Expired ==
    /// Chooses the keys an expiration pass must delete.
    ///
    /// Age applies first; the count limit then trims the oldest survivors so
    /// that at most `max_entries` remain.
    pub fn select_expired(&self, policy: &ExpirationPolicy, now_ms: u64) -> ExpiredSelection {
        let (aged, survivors): (Vec<&ExpiryRecord>, Vec<&ExpiryRecord>) = self
            .oldest_first()
            .into_iter()
            .partition(|r| policy.is_stale(r.last_accessed, now_ms));

        let overflow = match policy.max_entries {
            Some(max) if survivors.len() > max => survivors[..survivors.len() - max]
                .iter()
                .map(|r| r.key.clone())
                .collect(),
            _ => Vec::new(),
        };

        ExpiredSelection {
            aged: aged.into_iter().map(|r| r.key.clone()).collect(),
            overflow,
        }
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.records.contains_key(key)
    }

    /// Drops every record. Creation order keeps counting from where it was.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::get(Url::parse(&format!("http://localhost{}", path)).unwrap())
    }

    fn policy(max_age: u64, max_entries: usize) -> ExpirationPolicy {
        ExpirationPolicy::default()
            .with_max_age_seconds(max_age)
            .with_max_entries(max_entries)
    }

    #[test]
    fn test_touch_creates_record() {
        let mut records = ExpiryRecords::new("api-responses");
        records.touch(&key("/a"), 1_000);

        let record = records.get(&key("/a")).unwrap();
        assert_eq!(record.last_accessed, 1_000);
        assert_eq!(record.cache_name, "api-responses");
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_touch_bumps_existing_record() {
        let mut records = ExpiryRecords::new("c");
        records.touch(&key("/a"), 1_000);
        records.touch(&key("/a"), 30_000);

        assert_eq!(records.len(), 1);
        assert_eq!(records.get(&key("/a")).unwrap().last_accessed, 30_000);
    }

    #[test]
    fn test_missing_record_is_expired() {
        let records = ExpiryRecords::new("c");
        assert!(records.is_expired(&key("/nope"), &policy(60, 10), 0));
    }

    #[test]
    fn test_age_boundary() {
        let mut records = ExpiryRecords::new("c");
        records.touch(&key("/a"), 0);
        let p = policy(60, 10);

        assert!(!records.is_expired(&key("/a"), &p, 59_999));
        assert!(!records.is_expired(&key("/a"), &p, 60_000));
        assert!(records.is_expired(&key("/a"), &p, 60_001));
    }

    #[test]
    fn test_no_age_limit_never_expires() {
        let mut records = ExpiryRecords::new("c");
        records.touch(&key("/a"), 0);
        let p = ExpirationPolicy::default().with_max_entries(5);
        assert!(!records.is_expired(&key("/a"), &p, u64::MAX));
    }

    #[test]
    fn test_select_by_age() {
        let mut records = ExpiryRecords::new("c");
        records.touch(&key("/old"), 0);
        records.touch(&key("/new"), 50_000);

        let selection = records.select_expired(&policy(60, 10), 70_000);
        assert_eq!(selection.aged, vec![key("/old")]);
        assert!(selection.overflow.is_empty());
    }

    #[test]
    fn test_select_by_count_keeps_most_recent() {
        let mut records = ExpiryRecords::new("c");
        for (i, path) in ["/a", "/b", "/c", "/d"].iter().enumerate() {
            records.touch(&key(path), i as u64 * 1_000);
        }
        // /a becomes the most recent
        records.touch(&key("/a"), 10_000);

        let selection = records.select_expired(&policy(3600, 2), 10_000);
        assert!(selection.aged.is_empty());
        assert_eq!(selection.overflow, vec![key("/b"), key("/c")]);
    }

    #[test]
    fn test_count_ties_evict_oldest_insertion() {
        let mut records = ExpiryRecords::new("c");
        records.touch(&key("/first"), 5_000);
        records.touch(&key("/second"), 5_000);
        records.touch(&key("/third"), 5_000);

        let selection = records.select_expired(&policy(3600, 1), 5_000);
        assert_eq!(selection.overflow, vec![key("/first"), key("/second")]);
    }

    #[test]
    fn test_count_limit_applies_after_age() {
        let mut records = ExpiryRecords::new("c");
        records.touch(&key("/stale"), 0);
        records.touch(&key("/a"), 100_000);
        records.touch(&key("/b"), 110_000);

        // /stale is aged out, leaving exactly max_entries survivors
        let selection = records.select_expired(&policy(60, 2), 120_000);
        assert_eq!(selection.aged, vec![key("/stale")]);
        assert!(selection.overflow.is_empty());
        assert_eq!(selection.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut records = ExpiryRecords::new("c");
        records.touch(&key("/a"), 0);
        assert!(records.remove(&key("/a")).is_some());
        assert!(records.remove(&key("/a")).is_none());
        assert!(records.is_empty());
        assert!(!records.contains(&key("/a")));
    }

    #[test]
    fn test_clear_keeps_creation_order_counting() {
        let mut records = ExpiryRecords::new("c");
        records.touch(&key("/a"), 0);
        records.clear();
        assert!(records.is_empty());

        records.touch(&key("/b"), 5);
        records.touch(&key("/c"), 5);
        let order: Vec<_> = records.oldest_first().iter().map(|r| r.key.clone()).collect();
        assert_eq!(order, vec![key("/b"), key("/c")]);
    }
}
