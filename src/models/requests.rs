//! Request DTOs for the caching proxy API
//!
//! Defines the structure of incoming query strings.

use serde::Deserialize;

/// Query for `DELETE /__sw/cache/:cache_name`.
///
/// With `url` set a single record is removed, otherwise the whole partition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub url: Option<String>,
}

impl DeleteQuery {
    /// Returns an error message if the query is unusable, None if valid.
    pub fn validate(&self) -> Option<String> {
        match &self.url {
            Some(url) if url.trim().is_empty() => Some("url cannot be empty".to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_query_without_url() {
        let query: DeleteQuery = serde_json::from_str("{}").unwrap();
        assert!(query.url.is_none());
        assert!(query.validate().is_none());
    }

    #[test]
    fn test_delete_query_with_url() {
        let query: DeleteQuery =
            serde_json::from_str(r#"{"url": "/api/test-response?status=200"}"#).unwrap();
        assert_eq!(query.url.as_deref(), Some("/api/test-response?status=200"));
        assert!(query.validate().is_none());
    }

    #[test]
    fn test_validate_blank_url() {
        let query = DeleteQuery {
            url: Some("  ".to_string()),
        };
        assert!(query.validate().is_some());
    }
}
