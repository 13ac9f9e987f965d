//! Response comparison
//!
//! Decides whether a freshly fetched response differs from the cached one,
//! using only validator headers. Bodies are never read.

use axum::http::HeaderMap;

use crate::cache::ResponseSnapshot;

/// Headers compared, case-insensitively, to detect an update.
pub const HEADERS_TO_CHECK: [&str; 3] = ["etag", "content-length", "last-modified"];

/// True when every checked header is either absent from both responses or
/// present on both with byte-identical values.
///
/// A header present on only one side counts as a change.
pub fn responses_are_same(cached: &ResponseSnapshot, fresh: &ResponseSnapshot) -> bool {
    headers_are_same(Some(&cached.headers), Some(&fresh.headers))
}

/// Header-level comparison. A missing header collection is treated as one
/// with none of the checked headers.
pub fn headers_are_same(cached: Option<&HeaderMap>, fresh: Option<&HeaderMap>) -> bool {
    HEADERS_TO_CHECK.iter().all(|name| {
        let left = cached.and_then(|h| h.get(*name));
        let right = fresh.and_then(|h| h.get(*name));
        left == right
    })
}
