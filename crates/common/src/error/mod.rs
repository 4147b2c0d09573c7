//! Common error types and classification
//!
//! The resilience and cache modules each define their own precise error
//! types (`ResilienceError<E>`, `RetryError<E>`, `CacheError`,
//! `LoadError<E>`). This module holds what sits around them:
//!
//! 1. **`CommonError`**: crate-wide failures outside a single component,
//!    such as loading settings, decoding config files and wrapping component
//!    errors for callers that want one error type.
//!
//! 2. **`ErrorClassification` trait**: a standard interface for deciding
//!    whether a failure is worth retrying and how loudly to report it. It is
//!    implemented for `CommonError` and for the component error types.
//!
//! 3. **`ErrorSeverity` enum**: severity levels for logging and alerting.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use bulwark_common::error::{CommonError, ErrorClassification, ErrorSeverity};
//!
//! let err = CommonError::circuit_open_with_retry("smtp", Duration::from_secs(5));
//! assert!(err.is_retryable());
//! assert_eq!(err.severity(), ErrorSeverity::Warning);
//! assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
//! ```

use std::fmt;
use std::time::Duration;

/// Standard result type using CommonError
pub type CommonResult<T> = Result<T, CommonError>;

/// Crate-wide error variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Invalid or missing configuration
    Config { message: String, field: Option<String> },

    /// A config file or cached payload could not be encoded or decoded
    Serialization { message: String, format: Option<String> },

    /// Reading a file failed
    Io { message: String, path: Option<String> },

    /// A circuit breaker rejected the call
    CircuitOpen { service: String, retry_after: Option<Duration> },

    /// Retries ran out; `message` is the final attempt's error
    RetryExhausted { attempts: u32, message: String },

    /// An operation exceeded its time budget
    Timeout { operation: String, duration: Duration },

    /// A cache operation failed
    Cache { message: String, key: Option<String> },

    /// A background task could not be started or was cancelled
    Task { name: String, message: String },

    /// A call into a protected dependency failed
    Upstream { service: String, message: String },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message, field } => match field {
                Some(field) => write!(f, "Configuration error in field '{}': {}", field, message),
                None => write!(f, "Configuration error: {}", message),
            },
            Self::Serialization { message, format } => match format {
                Some(format) => write!(f, "Serialization error ({}): {}", format, message),
                None => write!(f, "Serialization error: {}", message),
            },
            Self::Io { message, path } => match path {
                Some(path) => write!(f, "I/O error for '{}': {}", path, message),
                None => write!(f, "I/O error: {}", message),
            },
            Self::CircuitOpen { service, retry_after } => match retry_after {
                Some(retry) => {
                    write!(f, "Circuit breaker open for '{}' (retry in {:?})", service, retry)
                }
                None => write!(f, "Circuit breaker open for '{}'", service),
            },
            Self::RetryExhausted { attempts, message } => {
                write!(f, "Operation failed after {} attempts: {}", attempts, message)
            }
            Self::Timeout { operation, duration } => {
                write!(f, "Operation '{}' timed out after {:?}", operation, duration)
            }
            Self::Cache { message, key } => match key {
                Some(key) => write!(f, "Cache error for key '{}': {}", key, message),
                None => write!(f, "Cache error: {}", message),
            },
            Self::Task { name, message } => write!(f, "Task '{}' failed: {}", name, message),
            Self::Upstream { service, message } => {
                write!(f, "Call to '{}' failed: {}", service, message)
            }
        }
    }
}

impl std::error::Error for CommonError {}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen { .. }
                | Self::Timeout { .. }
                | Self::RetryExhausted { .. }
                | Self::Upstream { .. }
        )
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CircuitOpen { .. } | Self::Timeout { .. } | Self::Cache { .. } => {
                ErrorSeverity::Warning
            }
            Self::Config { .. }
            | Self::Serialization { .. }
            | Self::Io { .. }
            | Self::RetryExhausted { .. }
            | Self::Task { .. }
            | Self::Upstream { .. } => ErrorSeverity::Error,
        }
    }

    /// No variant is critical: every failure here is local to one call or
    /// one cache and leaves the process usable.
    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl CommonError {
    /// Create a simple configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), field: None }
    }

    /// Create a configuration error for a specific field
    pub fn config_field<S: Into<String>, F: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization { message: message.into(), format: None }
    }

    /// Create a serialization error with format information
    pub fn serialization_format<S: Into<String>, F: Into<String>>(format: F, message: S) -> Self {
        Self::Serialization { message: message.into(), format: Some(format.into()) }
    }

    /// Create an I/O error tied to a path
    pub fn io_path<S: Into<String>, P: Into<String>>(path: P, message: S) -> Self {
        Self::Io { message: message.into(), path: Some(path.into()) }
    }

    pub fn circuit_open<S: Into<String>>(service: S) -> Self {
        Self::CircuitOpen { service: service.into(), retry_after: None }
    }

    /// Create a circuit breaker error with retry timing
    pub fn circuit_open_with_retry<S: Into<String>>(service: S, retry_after: Duration) -> Self {
        Self::CircuitOpen { service: service.into(), retry_after: Some(retry_after) }
    }

    pub fn retry_exhausted<S: Into<String>>(attempts: u32, message: S) -> Self {
        Self::RetryExhausted { attempts, message: message.into() }
    }

    pub fn timeout<S: Into<String>>(operation: S, duration: Duration) -> Self {
        Self::Timeout { operation: operation.into(), duration }
    }

    /// Create a cache error for a specific key
    pub fn cache_key<S: Into<String>, K: Into<String>>(key: K, message: S) -> Self {
        Self::Cache { message: message.into(), key: Some(key.into()) }
    }

    pub fn task<N: Into<String>, S: Into<String>>(name: N, message: S) -> Self {
        Self::Task { name: name.into(), message: message.into() }
    }

    /// Create an error for a failed call into `service`
    pub fn upstream<N: Into<String>, S: Into<String>>(service: N, message: S) -> Self {
        Self::Upstream { service: service.into(), message: message.into() }
    }
}

/// Standard interface for classifying errors by their characteristics
pub trait ErrorClassification {
    /// Whether the failed operation may succeed if attempted again
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    ///
    /// Used for monitoring, alerting, and logging decisions.
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Suggested delay before retrying, when one is known
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

// Standard conversions from common error types
impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_format("JSON", err.to_string())
    }
}

impl From<std::io::Error> for CommonError {
    fn from(err: std::io::Error) -> Self {
        Self::Io { message: err.to_string(), path: None }
    }
}

impl From<toml::de::Error> for CommonError {
    fn from(err: toml::de::Error) -> Self {
        Self::serialization_format("TOML", err.to_string())
    }
}

impl From<toml::ser::Error> for CommonError {
    fn from(err: toml::ser::Error) -> Self {
        Self::serialization_format("TOML", err.to_string())
    }
}

// Component error classification
// ------------------------------------------------------------------
#[cfg(feature = "runtime")]
mod component {
    use std::fmt;
    use std::time::Duration;

    use super::{CommonError, ErrorClassification, ErrorSeverity};
    use crate::cache::{CacheError, LoadError};
    use crate::resilience::{ConfigError, ResilienceError, RetryError};

    impl<E> ErrorClassification for ResilienceError<E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        fn is_retryable(&self) -> bool {
            self.is_circuit_open()
        }

        fn severity(&self) -> ErrorSeverity {
            ErrorSeverity::Warning
        }

        fn is_critical(&self) -> bool {
            false
        }

        fn retry_after(&self) -> Option<Duration> {
            ResilienceError::retry_after(self)
        }
    }

    impl<E> ErrorClassification for RetryError<E> {
        fn is_retryable(&self) -> bool {
            matches!(self, Self::Exhausted { .. } | Self::DeadlineExceeded { .. })
        }

        fn severity(&self) -> ErrorSeverity {
            match self {
                Self::Cancelled { .. } => ErrorSeverity::Info,
                Self::Exhausted { .. } | Self::DeadlineExceeded { .. } => ErrorSeverity::Warning,
                Self::InvalidConfiguration { .. } => ErrorSeverity::Error,
            }
        }

        fn is_critical(&self) -> bool {
            false
        }

        fn retry_after(&self) -> Option<Duration> {
            None
        }
    }

    impl ErrorClassification for CacheError {
        fn is_retryable(&self) -> bool {
            false
        }

        fn severity(&self) -> ErrorSeverity {
            match self {
                Self::Serialization { .. } => ErrorSeverity::Warning,
                Self::InvalidConfiguration { .. } | Self::Sweeper { .. } => ErrorSeverity::Error,
            }
        }

        fn is_critical(&self) -> bool {
            false
        }

        fn retry_after(&self) -> Option<Duration> {
            None
        }
    }

    impl<E> ErrorClassification for LoadError<E> {
        fn is_retryable(&self) -> bool {
            matches!(self, Self::Loader(_) | Self::Abandoned)
        }

        fn severity(&self) -> ErrorSeverity {
            match self {
                Self::Cache(error) => error.severity(),
                Self::Loader(_) | Self::Abandoned => ErrorSeverity::Warning,
            }
        }

        fn is_critical(&self) -> bool {
            false
        }

        fn retry_after(&self) -> Option<Duration> {
            None
        }
    }

    impl CommonError {
        /// Collapse a circuit breaker error for the dependency `service`
        ///
        /// A rejection keeps the breaker's remaining cool-down as the retry
        /// hint; an operation failure keeps the operation's message.
        pub fn from_breaker<S, E>(service: S, err: ResilienceError<E>) -> Self
        where
            S: Into<String>,
            E: std::error::Error + Send + Sync + 'static,
        {
            match err {
                ResilienceError::CircuitOpen { retry_after } => {
                    Self::circuit_open_with_retry(service, retry_after)
                }
                ResilienceError::OperationFailed { source } => {
                    Self::upstream(service, source.to_string())
                }
            }
        }
    }

    impl<E> From<ResilienceError<E>> for CommonError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        fn from(err: ResilienceError<E>) -> Self {
            Self::from_breaker("circuit_breaker", err)
        }
    }

    impl From<ConfigError> for CommonError {
        fn from(err: ConfigError) -> Self {
            Self::config(err.to_string())
        }
    }

    impl From<CacheError> for CommonError {
        fn from(err: CacheError) -> Self {
            match err {
                CacheError::Serialization { key, message } => Self::cache_key(key, message),
                CacheError::InvalidConfiguration { message } => Self::config_field("cache", message),
                CacheError::Sweeper { message } => Self::task("ttl-cache-sweeper", message),
            }
        }
    }

    impl<E: fmt::Display> From<RetryError<E>> for CommonError {
        fn from(err: RetryError<E>) -> Self {
            match err {
                RetryError::Exhausted { attempts, source } => {
                    Self::retry_exhausted(attempts, source.to_string())
                }
                RetryError::DeadlineExceeded { limit, .. } => Self::timeout("retry", limit),
                RetryError::InvalidConfiguration { message } => Self::config_field("retry", message),
                RetryError::Cancelled { attempts } => {
                    Self::task("retry", format!("cancelled after {attempts} attempts"))
                }
            }
        }
    }
}
