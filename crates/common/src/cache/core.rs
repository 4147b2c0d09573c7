//! TTL cache with coalescing `get_or_set`
//!
//! Values are stored as JSON bytes in a sharded [`DashMap`]. Every entry
//! shares the cache-wide time-to-live. Expired entries are removed when a
//! read observes them and by a periodic background sweep.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::config::CacheConfig;
use super::error::{CacheError, CacheResult, LoadError};
use super::flight::{Failure, FlightTable, LeaderGuard, Role};
use super::stats::{CacheStats, MetricsCollector};
use super::sweeper::{self, Shutdown, Sweep};
use crate::resilience::{Clock, SystemClock};

/// Entry stored in the cache
#[derive(Debug)]
struct CacheEntry {
    payload: Vec<u8>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Result of decoding a stored entry
enum Lookup<T> {
    Hit(T),
    Missing,
    Expired,
    Corrupt(serde_json::Error, Vec<u8>),
}

struct CacheInner<T, C> {
    entries: DashMap<String, CacheEntry>,
    flights: FlightTable<T>,
    config: CacheConfig,
    metrics: MetricsCollector,
    clock: C,
    shutdown: Arc<Shutdown>,
    _values: PhantomData<fn() -> T>,
}

impl<T, C: Clock> Sweep for CacheInner<T, C>
where
    T: Send + Sync + 'static,
{
    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        self.metrics.record_expirations(removed as u64);
        removed
    }
}

impl<T, C> Drop for CacheInner<T, C> {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Generic thread-safe cache with a fixed time-to-live
///
/// Keys are strings; values are any serde-serializable type. Handles are
/// cheap to clone and share one store. The background sweeper stops when
/// the last handle is dropped.
///
/// # Example
/// ```
/// use std::time::Duration;
///
/// use bulwark_common::cache::{CacheConfig, TtlCache};
///
/// let cache: TtlCache<String> = TtlCache::new(CacheConfig::with_ttl(Duration::from_secs(60)))?;
/// cache.set("greeting", &"hello".to_string())?;
/// assert_eq!(cache.get("greeting"), Some("hello".to_string()));
/// # Ok::<(), bulwark_common::cache::CacheError>(())
/// ```
pub struct TtlCache<T, C = SystemClock>
where
    C: Clock,
{
    inner: Arc<CacheInner<T, C>>,
}

impl<T, C: Clock> Clone for TtlCache<T, C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T, C: Clock> fmt::Debug for TtlCache<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("config", &self.inner.config)
            .field("entries", &self.inner.entries.len())
            .field("inflight", &self.inner.flights.len())
            .finish()
    }
}

impl<T> TtlCache<T, SystemClock>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a new cache using the system clock
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<T, C> TtlCache<T, C>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    C: Clock,
{
    /// Create a new cache with a custom clock (useful for testing)
    ///
    /// Starts the background sweep thread.
    pub fn with_clock(config: CacheConfig, clock: C) -> CacheResult<Self> {
        config.validate()?;
        let interval = config.effective_sweep_interval();
        let shutdown = Arc::new(Shutdown::default());

        let inner = Arc::new(CacheInner {
            entries: DashMap::with_shard_amount(config.shards),
            flights: FlightTable::default(),
            config,
            metrics: MetricsCollector::default(),
            clock,
            shutdown: Arc::clone(&shutdown),
            _values: PhantomData,
        });

        sweeper::spawn(Arc::downgrade(&inner), shutdown, interval)?;
        Ok(Self { inner })
    }

    /// The configuration this cache was built with
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Store `value` under `key`, replacing any existing entry
    pub fn set(&self, key: &str, value: &T) -> CacheResult<()> {
        let payload = serde_json::to_vec(value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        let expires_at = self.inner.clock.now() + self.inner.config.ttl;

        self.inner.entries.insert(key.to_string(), CacheEntry { payload, expires_at });
        self.inner.metrics.record_insert();
        debug!(key, "Cache entry stored");
        Ok(())
    }

    /// Fetch the value for `key`
    ///
    /// Returns `None` when the key is absent, expired or cannot be decoded.
    /// Expired and undecodable entries are removed.
    pub fn get(&self, key: &str) -> Option<T> {
        let value = self.lookup(key);
        if value.is_some() {
            self.inner.metrics.record_hit();
        } else {
            self.inner.metrics.record_miss();
        }
        value
    }

    /// Remove `key` regardless of expiry; true if an entry was removed
    pub fn delete(&self, key: &str) -> bool {
        self.inner.entries.remove(key).is_some()
    }

    /// Remove every entry
    pub fn reset(&self) {
        self.inner.entries.clear();
        debug!("Cache reset");
    }

    /// Number of stored entries, including expired entries not yet removed
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Remove all expired entries now, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    /// Get current statistics snapshot
    pub fn stats(&self) -> CacheStats {
        self.inner.metrics.snapshot(self.inner.entries.len())
    }

    /// Return the cached value for `key`, or load, store and return it
    ///
    /// Concurrent misses on the same key run `loader` once; every waiting
    /// caller receives the same value or the same error. A failing loader
    /// stores nothing. Waiting blocks the calling thread, so do not call
    /// this from an async task; use [`TtlCache::get_or_set_async`] there.
    #[instrument(skip(self, loader))]
    pub fn get_or_set<F, E>(&self, key: &str, loader: F) -> Result<T, LoadError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        E: Send + Sync + 'static,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        match self.inner.flights.join(key) {
            Role::Follower(flight) => {
                self.inner.metrics.record_coalesced();
                debug!("Waiting on in-flight load");
                flight.wait().map_err(Failure::into_load_error)
            }
            Role::Leader(guard) => {
                if let Some(value) = self.lookup(key) {
                    guard.finish(Ok(value.clone()));
                    return Ok(value);
                }
                self.inner.metrics.record_load();
                let result = loader();
                self.settle(key, guard, result)
            }
        }
    }

    /// Async variant of [`TtlCache::get_or_set`]
    ///
    /// Shares the in-flight table with the blocking variant. Dropping the
    /// leading future before the loader completes releases its followers
    /// with [`LoadError::Abandoned`].
    #[instrument(skip(self, loader))]
    pub async fn get_or_set_async<F, Fut, E>(
        &self,
        key: &str,
        loader: F,
    ) -> Result<T, LoadError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Send + Sync + 'static,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        match self.inner.flights.join(key) {
            Role::Follower(flight) => {
                self.inner.metrics.record_coalesced();
                debug!("Waiting on in-flight load");
                flight.wait_async().await.map_err(Failure::into_load_error)
            }
            Role::Leader(guard) => {
                if let Some(value) = self.lookup(key) {
                    guard.finish(Ok(value.clone()));
                    return Ok(value);
                }
                self.inner.metrics.record_load();
                let result = loader().await;
                self.settle(key, guard, result)
            }
        }
    }

    /// Store a leader's result and publish it to the followers
    fn settle<E>(
        &self,
        key: &str,
        guard: LeaderGuard<'_, T>,
        result: Result<T, E>,
    ) -> Result<T, LoadError<E>>
    where
        E: Send + Sync + 'static,
    {
        match result {
            Ok(value) => match self.set(key, &value) {
                Ok(()) => {
                    guard.finish(Ok(value.clone()));
                    Ok(value)
                }
                Err(error) => {
                    warn!(key, error = %error, "Loaded value could not be cached");
                    guard.finish(Err(Failure::Cache(error.clone())));
                    Err(LoadError::Cache(error))
                }
            },
            Err(error) => {
                debug!(key, "Loader failed; nothing cached");
                let shared = Arc::new(error);
                guard.finish(Err(Failure::Loader(shared.clone())));
                Err(LoadError::Loader(shared))
            }
        }
    }

    /// Read and decode without touching hit/miss counters
    fn lookup(&self, key: &str) -> Option<T> {
        let now = self.inner.clock.now();
        let lookup = match self.inner.entries.get(key) {
            None => Lookup::Missing,
            Some(entry) if entry.is_expired(now) => Lookup::Expired,
            Some(entry) => match serde_json::from_slice(&entry.payload) {
                Ok(value) => Lookup::Hit(value),
                Err(error) => Lookup::Corrupt(error, entry.payload.clone()),
            },
        };

        match lookup {
            Lookup::Hit(value) => Some(value),
            Lookup::Missing => None,
            Lookup::Expired => {
                if self.inner.entries.remove_if(key, |_, entry| entry.is_expired(now)).is_some() {
                    self.inner.metrics.record_expirations(1);
                    debug!(key, "Dropped expired cache entry");
                }
                None
            }
            Lookup::Corrupt(error, payload) => {
                if self.remove_corrupt(key, &payload) {
                    warn!(key, error = %error, "Dropped undecodable cache entry");
                }
                None
            }
        }
    }

    /// Remove `key` only while it still holds the undecodable `payload`
    ///
    /// A concurrent `set` between the read and the removal must survive.
    fn remove_corrupt(&self, key: &str, payload: &[u8]) -> bool {
        self.inner.entries.remove_if(key, |_, entry| entry.payload == payload).is_some()
    }
}
