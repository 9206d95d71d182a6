//! Error types for the event gateway
//!
//! Uses `thiserror` for ergonomic error handling with full context preservation.

use crate::message::{ExpectedStreamVersion, StreamName};
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Primary error type for all gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The route transform itself failed; never retried by the core
    #[error("Transform error: {message}")]
    Transform {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A destination write failed for a non-concurrency reason
    #[error("Produce error: {message}")]
    Produce {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Append precondition failed; reconcile and retry with a fresh expectation
    #[error("Concurrency conflict on {stream}: expected version {expected}, actual {actual:?}")]
    ConcurrencyConflict {
        stream: StreamName,
        expected: ExpectedStreamVersion,
        actual: Option<u64>,
    },

    /// Cooperative cancellation observed mid-pipeline
    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    /// Destination creation failed; never cached, retried on next use
    #[error("Provisioning error for {destination}: {message}")]
    Provisioning {
        destination: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Backing store error unrelated to concurrency
    #[error("Store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Message serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Checkpoint load/save errors
    #[error("Checkpoint error: {message}")]
    Checkpoint {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Graceful shutdown requested
    #[error("Shutdown requested")]
    Shutdown,

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Create a transform error
    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transform error with source
    pub fn transform_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transform {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a produce error
    pub fn produce(message: impl Into<String>) -> Self {
        Self::Produce {
            message: message.into(),
            source: None,
        }
    }

    /// Create a produce error with source
    pub fn produce_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Produce {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a cancellation error for the named operation
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a provisioning error
    pub fn provisioning(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provisioning {
            destination: destination.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Create a store error with source
    pub fn store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Check if this is an optimistic-concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Check if the error may resolve on its own and is worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Produce { .. } | Self::Store { .. } | Self::Provisioning { .. }
        )
    }
}
