//! Generic TTL cache with coalescing loads
//!
//! [`TtlCache`] stores serde-serializable values under string keys for a
//! fixed time-to-live. It supports:
//!
//! - **Sharded storage**: a `DashMap` with 64 shards by default
//! - **Hybrid expiry**: expired entries are dropped when a read sees them
//!   and by a background sweep every `ttl / 10`
//! - **Single-flight loads**: concurrent `get_or_set` misses for one key run
//!   the loader once and share its value or error
//! - **Metrics**: hit/miss/load counters via [`CacheStats`]
//! - **Testable**: clock abstraction for deterministic expiry
//!
//! # Examples
//!
//! ## Compute if absent
//! ```
//! use std::time::Duration;
//!
//! use bulwark_common::cache::{CacheConfig, TtlCache};
//!
//! let cache: TtlCache<Vec<String>> =
//!     TtlCache::new(CacheConfig::with_ttl(Duration::from_secs(30)))?;
//!
//! let roles = cache.get_or_set("roles:42", || {
//!     Ok::<_, std::io::Error>(vec!["admin".to_string()])
//! })?;
//! assert_eq!(roles, vec!["admin".to_string()]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Thread Safety
//!
//! Handles are `Clone` and share one store, so a cache can be handed to
//! worker threads directly:
//!
//! ```
//! use std::thread;
//! use std::time::Duration;
//!
//! use bulwark_common::cache::{CacheConfig, TtlCache};
//!
//! let cache: TtlCache<u32> = TtlCache::new(CacheConfig::with_ttl(Duration::from_secs(60)))?;
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|i| {
//!         let cache = cache.clone();
//!         thread::spawn(move || cache.set(&format!("key-{i}"), &i))
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     handle.join().unwrap()?;
//! }
//! assert_eq!(cache.len(), 4);
//! # Ok::<(), bulwark_common::cache::CacheError>(())
//! ```

mod config;
mod core;
mod error;
mod flight;
mod stats;
mod sweeper;

// Re-export public API
pub use self::core::TtlCache;

pub use config::{CacheConfig, CacheConfigBuilder, DEFAULT_SHARDS, MAX_TTL, MIN_SWEEP_INTERVAL};
pub use error::{CacheError, CacheResult, LoadError};
pub use stats::CacheStats;
