//! Message DTOs exchanged with clients
//!
//! Inbound control messages (the worker's message port) and the broadcast
//! messages published to every subscribed client.

use serde::{Deserialize, Serialize};

// == Control Messages ==
/// A message posted to the worker. The reply is a plain JSON boolean.
///
/// Two shapes are accepted: `{ "type": ..., ... }` and `{ "action": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ControlMessage {
    Typed(TypedControl),
    Action { action: ControlAction },
}

/// Control messages identified by their `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypedControl {
    /// Fetch the listed URLs into the runtime cache
    CacheUrls { payload: CacheUrlsPayload },
    /// Empty a cache partition, keeping it open
    #[serde(rename_all = "camelCase")]
    ClearCache { cache_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheUrlsPayload {
    pub urls_to_cache: Vec<String>,
}

/// Control messages identified by their `action` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlAction {
    /// Make sure the on-demand image is cached
    CacheOnDemand,
}

// == Broadcast Messages ==
/// Message fanned out to every subscriber of a broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BroadcastMessage {
    #[serde(rename_all = "camelCase")]
    CacheUpdated {
        /// Unix milliseconds
        timestamp: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        are_responses_same: Option<bool>,
    },
}

/// Body of a client-originated update notification.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}
