//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Expiration sweep: applies each partition's age and entry limits

mod expiration;

pub use expiration::spawn_expiration_task;
