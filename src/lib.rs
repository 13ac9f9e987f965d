//! sw_cache - A caching reverse proxy with service-worker semantics
//!
//! Serves routed requests from named cache partitions with age and entry
//! limits, compares refreshed responses against what was cached, and
//! broadcasts updates to connected clients.

pub mod api;
pub mod broadcast;
pub mod cache;
pub mod compare;
pub mod config;
pub mod error;
pub mod fetch;
pub mod intercept;
pub mod models;
pub mod tasks;
pub mod worker;

pub use api::{create_router, AppState};
pub use broadcast::{BroadcastHub, Subscription, UpdateEvent};
pub use cache::{CacheStore, ExpirationPolicy};
pub use compare::responses_are_same;
pub use config::Config;
pub use fetch::{FetchRequest, Fetcher, HttpFetcher};
pub use intercept::{BroadcastMode, CacheStatus, Interceptor};
pub use tasks::spawn_expiration_task;
pub use worker::CacheWorker;
