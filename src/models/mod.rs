//! Request and Response models for the caching proxy API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing control messages, broadcast messages and
//! HTTP response bodies.

pub mod messages;
pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use messages::{
    BroadcastMessage, CacheUrlsPayload, ControlAction, ControlMessage, PublishRequest,
    TypedControl,
};
pub use requests::DeleteQuery;
pub use responses::{
    DeleteResponse, HealthResponse, PartitionStats, PublishResponse, StatsResponse,
};
