//! # BookWave Common
//!
//! Shared error types and logging configuration for the BookWave background
//! worker.
//!
//! ## Features
//!
//! - Unified error type with source-chain and backtrace support
//! - Logging configuration and setup
//! - Result extension traits

use std::time::Duration;
use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Unified error type for the BookWave worker.
#[derive(Error, Debug)]
pub enum BookwaveError {
    /// Cache store errors.
    #[error("Cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Network-related errors.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Notification rendering/display errors.
    #[error("Notification error: {message}")]
    Notification {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Click-routing errors.
    #[error("Routing error: {message}")]
    Routing {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        backtrace: Option<backtrace::Backtrace>,
    },
}

impl BookwaveError {
    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
            source: None,
        }
    }

    /// Create a cache error with source.
    pub fn cache_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Cache {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a notification error.
    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification {
            message: message.into(),
            source: None,
        }
    }

    /// Create a routing error.
    pub fn routing(message: impl Into<String>) -> Self {
        Self::Routing {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with backtrace.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }

    /// Get the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            BookwaveError::Cache { .. } => "cache",
            BookwaveError::Network { .. } => "network",
            BookwaveError::Notification { .. } => "notification",
            BookwaveError::Routing { .. } => "routing",
            BookwaveError::Config { .. } => "config",
            BookwaveError::Io(_) => "io",
            BookwaveError::Timeout(_) => "timeout",
            BookwaveError::NotFound(_) => "not_found",
            BookwaveError::InvalidArgument(_) => "invalid_argument",
            BookwaveError::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for BookWave operations.
pub type Result<T> = std::result::Result<T, BookwaveError>;

/// Extension trait for Result.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| BookwaveError::Internal {
            message: format!("{}: {}", message.into(), e),
            backtrace: Some(backtrace::Backtrace::new()),
        })
    }
}

/// Extension trait for Option.
pub trait OptionExt<T> {
    /// Convert None to a NotFound error.
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| BookwaveError::NotFound(resource.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        assert_eq!(BookwaveError::cache("full").category(), "cache");
        assert_eq!(BookwaveError::network("down").category(), "network");
        assert_eq!(
            BookwaveError::NotFound("shell".to_string()).category(),
            "not_found"
        );
    }

    #[test]
    fn test_error_with_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let err = BookwaveError::cache_with_source("put failed", io);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        let err = result.context("opening cache").unwrap_err();
        assert!(err.to_string().contains("opening cache"));
    }

    #[test]
    fn test_option_ext() {
        let none: Option<u32> = None;
        let err = none.ok_or_not_found("window client").unwrap_err();
        assert_eq!(err.category(), "not_found");
    }
}
