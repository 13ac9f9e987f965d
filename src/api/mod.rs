//! API Module
//!
//! HTTP handlers and routing for the caching proxy.
//!
//! # Endpoints
//! - `/__sw/*` - Control surface (health, stats, updates, messages, deletion)
//! - everything else - Proxied through the cache worker

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
