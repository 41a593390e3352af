//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the cache is live.
//!
//! # Tasks
//! - Expiry sweep: proactively reclaims expired entries in bounded batches

mod sweep;

pub(crate) use sweep::spawn_sweep_task;
