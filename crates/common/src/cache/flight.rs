//! In-flight load table for coalescing concurrent `get_or_set` misses
//!
//! The first caller to miss on a key becomes the leader and runs the loader.
//! Later callers for the same key become followers and wait for the leader's
//! outcome. Blocking followers park on a condvar; async followers wait on a
//! `tokio::sync::Notify`. The leader's [`LeaderGuard`] always publishes an
//! outcome: if it is dropped without one (panic, cancelled future) the
//! followers observe [`Failure::Abandoned`].

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use super::error::{CacheError, LoadError};

/// Type-erased failure shared with followers
#[derive(Clone)]
pub(crate) enum Failure {
    Loader(Arc<dyn Any + Send + Sync>),
    Cache(CacheError),
    Abandoned,
}

impl Failure {
    /// Recover the typed error. A follower whose loader error type differs
    /// from the leader's cannot observe that error and sees `Abandoned`.
    pub(crate) fn into_load_error<E: Send + Sync + 'static>(self) -> LoadError<E> {
        match self {
            Self::Loader(shared) => shared.downcast::<E>().map_or(LoadError::Abandoned, LoadError::Loader),
            Self::Cache(error) => LoadError::Cache(error),
            Self::Abandoned => LoadError::Abandoned,
        }
    }
}

pub(crate) type Outcome<T> = Result<T, Failure>;

pub(crate) struct Flight<T> {
    outcome: Mutex<Option<Outcome<T>>>,
    ready: Condvar,
    notify: Notify,
}

impl<T: Clone> Flight<T> {
    fn new() -> Self {
        Self { outcome: Mutex::new(None), ready: Condvar::new(), notify: Notify::new() }
    }

    fn complete(&self, outcome: Outcome<T>) {
        *self.outcome.lock() = Some(outcome);
        self.ready.notify_all();
        self.notify.notify_waiters();
    }

    /// Block until the leader publishes its outcome
    pub(crate) fn wait(&self) -> Outcome<T> {
        let mut slot = self.outcome.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            self.ready.wait(&mut slot);
        }
    }

    pub(crate) async fn wait_async(&self) -> Outcome<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a completion in between is not lost.
            notified.as_mut().enable();

            let ready = self.outcome.lock().clone();
            if let Some(outcome) = ready {
                return outcome;
            }
            notified.await;
        }
    }
}

/// Role assigned to a caller joining the table
pub(crate) enum Role<'a, T: Clone> {
    Leader(LeaderGuard<'a, T>),
    Follower(Arc<Flight<T>>),
}

pub(crate) struct FlightTable<T> {
    inflight: Mutex<HashMap<String, Arc<Flight<T>>>>,
}

impl<T> Default for FlightTable<T> {
    fn default() -> Self {
        Self { inflight: Mutex::new(HashMap::new()) }
    }
}

impl<T> FlightTable<T> {
    /// Number of loads currently in flight
    pub(crate) fn len(&self) -> usize {
        self.inflight.lock().len()
    }
}

impl<T: Clone> FlightTable<T> {
    pub(crate) fn join(&self, key: &str) -> Role<'_, T> {
        let mut inflight = self.inflight.lock();
        if let Some(flight) = inflight.get(key) {
            return Role::Follower(Arc::clone(flight));
        }

        let flight = Arc::new(Flight::new());
        inflight.insert(key.to_string(), Arc::clone(&flight));
        Role::Leader(LeaderGuard { table: self, key: key.to_string(), flight, finished: false })
    }

    fn remove(&self, key: &str, flight: &Arc<Flight<T>>) {
        let mut inflight = self.inflight.lock();
        if inflight.get(key).is_some_and(|current| Arc::ptr_eq(current, flight)) {
            inflight.remove(key);
        }
    }
}

/// Held by the caller running the loader
pub(crate) struct LeaderGuard<'a, T: Clone> {
    table: &'a FlightTable<T>,
    key: String,
    flight: Arc<Flight<T>>,
    finished: bool,
}

impl<T: Clone> LeaderGuard<'_, T> {
    /// Retire the flight and hand `outcome` to every follower
    pub(crate) fn finish(mut self, outcome: Outcome<T>) {
        self.finished = true;
        self.table.remove(&self.key, &self.flight);
        self.flight.complete(outcome);
    }
}

impl<T: Clone> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            self.table.remove(&self.key, &self.flight);
            self.flight.complete(Err(Failure::Abandoned));
        }
    }
}
