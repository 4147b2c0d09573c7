//! Background removal of expired cache entries
//!
//! The sweeper runs on a dedicated named thread and only holds a weak
//! reference to the cache. It exits when it is signalled through
//! [`Shutdown`] (the cache's last handle was dropped) or when the cache can
//! no longer be upgraded.

use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use super::error::{CacheError, CacheResult};

/// Anything the sweeper can purge
pub(crate) trait Sweep: Send + Sync + 'static {
    /// Remove expired entries, returning how many were removed
    fn purge_expired(&self) -> usize;
}

/// Stop signal shared between a cache and its sweeper thread
#[derive(Debug, Default)]
pub(crate) struct Shutdown {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl Shutdown {
    pub(crate) fn trigger(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }

    /// Wait up to `interval`; true once shutdown has been triggered
    fn wait(&self, interval: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            let _ = self.wake.wait_for(&mut stopped, interval);
        }
        *stopped
    }
}

pub(crate) fn spawn<S: Sweep>(
    target: Weak<S>,
    shutdown: Arc<Shutdown>,
    interval: Duration,
) -> CacheResult<()> {
    thread::Builder::new()
        .name("ttl-cache-sweeper".to_string())
        .spawn(move || run(&target, &shutdown, interval))
        .map(|_| ())
        .map_err(|e| CacheError::Sweeper { message: e.to_string() })
}

fn run<S: Sweep>(target: &Weak<S>, shutdown: &Shutdown, interval: Duration) {
    debug!(?interval, "Cache sweeper started");

    while !shutdown.wait(interval) {
        let Some(cache) = target.upgrade() else {
            break;
        };
        let removed = cache.purge_expired();
        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
        }
    }

    debug!("Cache sweeper stopped");
}
