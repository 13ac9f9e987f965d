//! Cache Entry Module
//!
//! Defines request identities, response snapshots and the stored pair of both.

use std::fmt;

use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use url::Url;

// == Request Key ==
/// Identity of a cached request: method plus absolute URL.
///
/// The query string is significant; the fragment is never sent to a server
/// and is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: Method,
    url: String,
}

impl RequestKey {
    /// Creates a key for `method` and `url`.
    pub fn new(method: Method, mut url: Url) -> Self {
        url.set_fragment(None);
        Self {
            method,
            url: url.into(),
        }
    }

    /// Shorthand for a GET key, the only method the cache stores.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The absolute URL, as used in broadcast messages and API responses.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

// == Response Snapshot ==
/// Immutable copy of an HTTP response: status, headers and body bytes.
///
/// Both network responses and cached responses use this type, so a cached
/// entry is served exactly as it was received.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseSnapshot {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Only 2xx responses may be written to a partition, regardless of
    /// what the server's cache headers say.
    pub fn is_cacheable(&self) -> bool {
        self.status.is_success()
    }

    /// Returns a header value if it is present and valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Bytes charged against the partition quota.
    pub fn size(&self) -> usize {
        self.body.len()
    }
}

// == Cache Entry ==
/// A stored request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub response: ResponseSnapshot,
    /// Write timestamp (Unix milliseconds)
    pub stored_at: u64,
}

impl CacheEntry {
    pub fn new(key: RequestKey, response: ResponseSnapshot, stored_at: u64) -> Self {
        Self {
            key,
            response,
            stored_at,
        }
    }

    /// Milliseconds since the entry was written.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.stored_at)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_key_drops_fragment() {
        let key = RequestKey::get(url("http://localhost/api/x?status=200#top"));
        assert_eq!(key.url(), "http://localhost/api/x?status=200");
    }

    #[test]
    fn test_key_query_is_significant() {
        let ok = RequestKey::get(url("http://localhost/api/test-response?status=200"));
        let missing = RequestKey::get(url("http://localhost/api/test-response?status=404"));
        assert_ne!(ok, missing);
    }

    #[test]
    fn test_key_method_is_significant() {
        let get = RequestKey::get(url("http://localhost/a"));
        let head = RequestKey::new(Method::HEAD, url("http://localhost/a"));
        assert_ne!(get, head);
        assert_eq!(get.to_string(), "GET http://localhost/a");
    }

    #[test]
    fn test_only_success_is_cacheable() {
        for (code, cacheable) in [(200, true), (204, true), (304, false), (404, false), (500, false)] {
            let status = StatusCode::from_u16(code).unwrap();
            let response = ResponseSnapshot::new(status, HeaderMap::new(), "body");
            assert_eq!(response.is_cacheable(), cacheable, "status {}", code);
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("etag", HeaderValue::from_static("\"v1\""));
        let response = ResponseSnapshot::new(StatusCode::OK, headers, Bytes::new());
        assert_eq!(response.header("ETag"), Some("\"v1\""));
        assert_eq!(response.header("ETAG"), Some("\"v1\""));
    }

    #[test]
    fn test_entry_age() {
        let key = RequestKey::get(url("http://localhost/a"));
        let response = ResponseSnapshot::new(StatusCode::OK, HeaderMap::new(), "x");
        let entry = CacheEntry::new(key, response, 1_000);
        assert_eq!(entry.age_ms(4_000), 3_000);
        assert_eq!(entry.age_ms(500), 0);
    }
}
