//! Strategy traits for the event gateway
//!
//! Pluggable seams of the pipeline: routing, producing, client creation,
//! and component lifecycle. All I/O operations are async and observe the
//! context's cancellation signal at their suspension points.

use crate::cancel::CancellationSignal;
use crate::context::ConsumeContext;
use crate::error::Result;
use crate::message::{GatewayMessage, GlobalPosition, NewEvent, StreamName};
use async_trait::async_trait;

// ============================================================================
// Routing
// ============================================================================

/// Route transform strategy
///
/// Maps one inbound message to zero or more outgoing messages, each
/// addressed to a target stream with per-message produce options. Pure with
/// respect to system state; may suspend for lookups but returns the complete
/// sequence atomically. Faults propagate to the handler uncaught and are not
/// retried here.
#[async_trait]
pub trait RouteTransform: Send + Sync {
    /// Per-message produce options for the producer this transform feeds
    type Options: Clone + Send + Sync + 'static;

    /// Compute the outgoing messages for one inbound message
    async fn route(&self, context: &ConsumeContext) -> Result<Vec<GatewayMessage<Self::Options>>>;
}

// ============================================================================
// Producing
// ============================================================================

/// Result of one confirmed produce operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProduceResult {
    /// Position assigned within the destination stream, if the backend has one
    pub stream_position: Option<u64>,
    /// Store-wide position, if the backend has one
    pub global_position: Option<GlobalPosition>,
}

impl ProduceResult {
    /// Result for backends that assign positions
    pub fn at(stream_position: u64, global_position: GlobalPosition) -> Self {
        Self {
            stream_position: Some(stream_position),
            global_position: Some(global_position),
        }
    }

    /// Result for backends that only confirm delivery
    pub fn delivered() -> Self {
        Self::default()
    }
}

/// Producer strategy
///
/// Publishes one message to one destination stream and returns once the
/// backend confirms (or immediately for fire-and-forget options). Must
/// observe the cancellation signal while waiting on the backend.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Per-message produce options
    type Options: Clone + Send + Sync + 'static;

    /// Produce one message to the destination stream
    async fn produce(
        &self,
        stream: &StreamName,
        message: NewEvent,
        options: &Self::Options,
        cancellation: &CancellationSignal,
    ) -> Result<ProduceResult>;
}

// ============================================================================
// Client creation
// ============================================================================

/// Client factory strategy for the client registry
///
/// Creates one client per destination, optionally provisioning the
/// destination first (create-if-missing). Provisioning failures surface to
/// the caller and must not be cached.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// The client/handle type managed by the registry
    type Client: Send + Sync + 'static;

    /// Create (and optionally provision) the client for a destination
    async fn create(&self, destination: &str) -> Result<Self::Client>;
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle management for long-lived components
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Start the component; establish connections and prepare for operation
    async fn start(&self) -> Result<()>;

    /// Stop the component gracefully; flush buffers and release resources
    async fn stop(&self) -> Result<()>;

    /// Check if the component is running
    fn is_running(&self) -> bool;
}

/// Health check capability
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Returns Ok(()) if healthy, Err with details if not
    async fn health_check(&self) -> Result<()>;

    /// Component name for health reporting
    fn component_name(&self) -> &'static str;
}
