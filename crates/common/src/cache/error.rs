//! Error types for the TTL cache

use std::sync::Arc;

use thiserror::Error;

/// Errors raised by cache operations themselves (never by loaders)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The value could not be encoded for storage
    #[error("Failed to serialize value for key '{key}': {message}")]
    Serialization { key: String, message: String },

    #[error("Invalid cache configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The background sweep thread could not be started
    #[error("Failed to start cache sweeper: {message}")]
    Sweeper { message: String },
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Failure of a coalesced `get_or_set` call
///
/// Loader errors are reference counted so that every caller waiting on the
/// same key observes the exact error the loader produced.
#[derive(Debug, Error)]
pub enum LoadError<E> {
    /// The loader returned an error; nothing was cached
    #[error("Cache loader failed: {0}")]
    Loader(#[source] Arc<E>),

    /// The loaded value could not be stored
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The loading call panicked or was dropped before it completed
    #[error("Cache load was abandoned before completing")]
    Abandoned,
}

impl<E> LoadError<E> {
    /// The loader's error, if that is what failed
    pub fn loader_error(&self) -> Option<&E> {
        match self {
            Self::Loader(error) => Some(error),
            Self::Cache(_) | Self::Abandoned => None,
        }
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, Self::Abandoned)
    }
}

impl<E> Clone for LoadError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Loader(error) => Self::Loader(Arc::clone(error)),
            Self::Cache(error) => Self::Cache(error.clone()),
            Self::Abandoned => Self::Abandoned,
        }
    }
}
