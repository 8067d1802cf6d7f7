//! In-process, thread-safe key/value cache with per-entry expiration.
//!
//! Reads drop expired entries lazily; [`ExpiringCache::clean`] reclaims the
//! rest in the background. Snapshots to disk live in [`persistance`].

pub mod config;
pub mod error;
pub mod logger;

pub mod persistance;
pub mod storage;

pub mod cli;

pub use config::{CacheConfig, Config, SnapshotConfig};
pub use error::{CacheError, Result};
pub use persistance::{snapshot::SnapshotCreator, Persistent};
pub use storage::{storage::ExpiringCache, Cache};
