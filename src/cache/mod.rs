//! Cache Module
//!
//! Partitioned response storage with last-access expiry bookkeeping:
//! age-based expiration and count-based eviction per named cache.

mod clock;
mod entry;
mod expiry;
mod partition;
mod stats;
mod store;


// Re-export public types
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, RequestKey, ResponseSnapshot};
pub use expiry::{ExpirationPolicy, ExpiredSelection, ExpiryRecord, ExpiryRecords};
pub use partition::{Lookup, Partition, StorageLimits};
pub use stats::CacheStats;
pub use store::CacheStore;
