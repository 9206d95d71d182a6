//! Event store contract
//!
//! Append-with-expected-version and forward-read operations. The backing
//! store's conflict response is the single source of truth for optimistic
//! concurrency; adapters never attempt client-side read-then-write races.

use async_trait::async_trait;
use evs_gateway_core::prelude::*;

/// Result of a successful append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResult {
    /// Stream position of the last appended event
    pub stream_position: u64,
    /// Global position of the last appended event
    pub global_position: GlobalPosition,
}

/// Append side of the store contract
#[async_trait]
pub trait EventWriter: Send + Sync {
    /// Append events to a stream, enforcing the expected-version precondition
    ///
    /// Atomic with respect to concurrent appenders on the same stream: when
    /// two race with the same non-`Any` expectation, at most one succeeds and
    /// the other fails with [`GatewayError::ConcurrencyConflict`], with no
    /// partial write visible to subsequent reads.
    async fn append(
        &self,
        stream: &StreamName,
        events: Vec<NewEvent>,
        expected: ExpectedStreamVersion,
    ) -> Result<AppendResult>;
}

/// Read side of the store contract
#[async_trait]
pub trait EventReader: Send + Sync {
    /// Read up to `max_count` events strictly forward from `from`
    ///
    /// Returns events in ascending stream-position order. A short read
    /// (fewer than `max_count`, including zero) is not an error; reading a
    /// non-existent stream returns an empty sequence.
    async fn read(
        &self,
        stream: &StreamName,
        from: StreamReadPosition,
        max_count: usize,
    ) -> Result<Vec<PersistedEvent>>;
}

/// Tail side of the store contract, reading across all streams
///
/// Used by subscription loops to follow the store in global-position order.
#[async_trait]
pub trait AllStreamReader: Send + Sync {
    /// Read up to `max_count` events with global position >= `from`
    async fn read_all(&self, from: GlobalPosition, max_count: usize) -> Result<Vec<PersistedEvent>>;
}

/// Combined store contract
pub trait EventStore: EventWriter + EventReader {}

impl<T: EventWriter + EventReader> EventStore for T {}
