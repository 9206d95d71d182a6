//! In-memory event store backend
//!
//! A single global log plus a per-stream index, guarded by one `RwLock` so
//! appends are atomic and the expected-version check and the write happen
//! under the same critical section. The unit-test and demo backend.

use crate::store::{AllStreamReader, AppendResult, EventReader, EventWriter};
use async_trait::async_trait;
use chrono::Utc;
use evs_gateway_core::prelude::*;
use evs_gateway_core::StoreMetrics;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, trace};

#[derive(Default)]
struct Inner {
    /// All events in append order; index == global position
    log: Vec<PersistedEvent>,
    /// Stream name -> global positions of that stream's events, in order
    streams: HashMap<StreamName, Vec<u64>>,
}

impl Inner {
    /// Current version of a stream: position of its last event
    fn current_version(&self, stream: &StreamName) -> Option<u64> {
        self.streams
            .get(stream)
            .filter(|positions| !positions.is_empty())
            .map(|positions| positions.len() as u64 - 1)
    }
}

/// In-memory event store
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
    metrics: StoreMetrics,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            metrics: StoreMetrics::new("memory_store"),
        }
    }

    /// Number of events across all streams
    pub async fn len(&self) -> usize {
        self.inner.read().await.log.len()
    }

    /// Check if the store holds no events
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.log.is_empty()
    }

    /// Current version of a stream, if it exists
    pub async fn stream_version(&self, stream: &StreamName) -> Option<u64> {
        self.inner.read().await.current_version(stream)
    }
}

#[async_trait]
impl EventWriter for InMemoryEventStore {
    async fn append(
        &self,
        stream: &StreamName,
        events: Vec<NewEvent>,
        expected: ExpectedStreamVersion,
    ) -> Result<AppendResult> {
        if events.is_empty() {
            return Err(GatewayError::store("cannot append an empty event batch"));
        }

        let mut inner = self.inner.write().await;

        let actual = inner.current_version(stream);
        let matches = match expected {
            ExpectedStreamVersion::Any => true,
            ExpectedStreamVersion::NoStream => actual.is_none(),
            ExpectedStreamVersion::Exact(version) => actual == Some(version),
        };
        if !matches {
            self.metrics.record_conflict(stream.as_str());
            debug!(
                stream = %stream,
                expected = %expected,
                actual = ?actual,
                "Append rejected on expected-version check"
            );
            return Err(GatewayError::ConcurrencyConflict {
                stream: stream.clone(),
                expected,
                actual,
            });
        }

        let count = events.len();
        let created = Utc::now();
        let mut last = AppendResult {
            stream_position: 0,
            global_position: GlobalPosition::START,
        };

        for event in events {
            let global = inner.log.len() as u64;
            let positions = inner.streams.entry(stream.clone()).or_default();
            let stream_position = positions.len() as u64;
            positions.push(global);

            last = AppendResult {
                stream_position,
                global_position: GlobalPosition(global),
            };

            inner.log.push(PersistedEvent {
                id: event.id,
                event_type: event.event_type,
                stream_position,
                global_position: GlobalPosition(global),
                payload: event.payload,
                metadata: event.metadata,
                created,
                stream: stream.clone(),
            });
        }

        self.metrics.record_append(count);
        trace!(stream = %stream, count, position = last.stream_position, "Appended events");
        Ok(last)
    }
}

#[async_trait]
impl EventReader for InMemoryEventStore {
    async fn read(
        &self,
        stream: &StreamName,
        from: StreamReadPosition,
        max_count: usize,
    ) -> Result<Vec<PersistedEvent>> {
        let start = Instant::now();
        let inner = self.inner.read().await;

        let events = match inner.streams.get(stream) {
            None => Vec::new(),
            Some(positions) => {
                let offset = from.offset() as usize;
                positions
                    .iter()
                    .skip(offset)
                    .take(max_count)
                    .map(|global| inner.log[*global as usize].clone())
                    .collect()
            }
        };

        self.metrics.record_read_latency(start.elapsed());
        Ok(events)
    }
}

#[async_trait]
impl AllStreamReader for InMemoryEventStore {
    async fn read_all(&self, from: GlobalPosition, max_count: usize) -> Result<Vec<PersistedEvent>> {
        let inner = self.inner.read().await;
        let offset = from.0 as usize;
        if offset >= inner.log.len() {
            return Ok(Vec::new());
        }
        Ok(inner.log[offset..]
            .iter()
            .take(max_count)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Arc;

    fn events(count: usize) -> Vec<NewEvent> {
        (0..count)
            .map(|i| NewEvent::new("order.placed", Bytes::from(format!("{{\"n\":{}}}", i))))
            .collect()
    }

    #[tokio::test]
    async fn append_assigns_contiguous_positions() {
        let store = InMemoryEventStore::new();
        let stream = StreamName::new("orders-1");

        let result = store
            .append(&stream, events(3), ExpectedStreamVersion::NoStream)
            .await
            .unwrap();

        assert_eq!(result.stream_position, 2);
        assert_eq!(result.global_position, GlobalPosition(2));
        assert_eq!(store.stream_version(&stream).await, Some(2));
    }

    #[tokio::test]
    async fn no_stream_expectation_conflicts_on_second_append() {
        let store = InMemoryEventStore::new();
        let stream = StreamName::new("orders-1");

        store
            .append(&stream, events(1), ExpectedStreamVersion::NoStream)
            .await
            .unwrap();

        let err = store
            .append(&stream, events(1), ExpectedStreamVersion::NoStream)
            .await
            .unwrap_err();

        assert!(err.is_concurrency_conflict());
        // no partial write
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn exact_expectation_advances_by_appended_count() {
        let store = InMemoryEventStore::new();
        let stream = StreamName::new("orders-1");

        store
            .append(&stream, events(2), ExpectedStreamVersion::NoStream)
            .await
            .unwrap();

        let result = store
            .append(&stream, events(3), ExpectedStreamVersion::Exact(1))
            .await
            .unwrap();

        assert_eq!(result.stream_position, 4);

        let stale = store
            .append(&stream, events(1), ExpectedStreamVersion::Exact(1))
            .await
            .unwrap_err();
        assert!(stale.is_concurrency_conflict());
    }

    #[tokio::test]
    async fn racing_appends_with_same_expectation_admit_one_winner() {
        let store = Arc::new(InMemoryEventStore::new());
        let stream = StreamName::new("orders-1");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let stream = stream.clone();
                tokio::spawn(async move {
                    store
                        .append(&stream, events(1), ExpectedStreamVersion::NoStream)
                        .await
                })
            })
            .collect();

        let results = futures::future::join_all(tasks).await;
        let successes = results
            .into_iter()
            .filter(|r| r.as_ref().unwrap().is_ok())
            .count();

        assert_eq!(successes, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn read_head_returns_first_max_count_in_order() {
        let store = InMemoryEventStore::new();
        let stream = StreamName::new("orders-1");
        store
            .append(&stream, events(20), ExpectedStreamVersion::NoStream)
            .await
            .unwrap();

        let head = store
            .read(&stream, StreamReadPosition::Start, 10)
            .await
            .unwrap();

        assert_eq!(head.len(), 10);
        let positions: Vec<u64> = head.iter().map(|e| e.stream_position).collect();
        assert_eq!(positions, (0..10).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn read_tail_from_captured_position() {
        let store = InMemoryEventStore::new();
        let stream = StreamName::new("orders-1");

        let first = store
            .append(&stream, events(10), ExpectedStreamVersion::NoStream)
            .await
            .unwrap();
        store
            .append(&stream, events(10), ExpectedStreamVersion::Any)
            .await
            .unwrap();

        let tail = store
            .read(
                &stream,
                StreamReadPosition::Position(first.stream_position + 1),
                100,
            )
            .await
            .unwrap();

        assert_eq!(tail.len(), 10);
        assert_eq!(tail[0].stream_position, 10);
        assert_eq!(tail[9].stream_position, 19);
    }

    #[tokio::test]
    async fn short_and_missing_reads_are_not_errors() {
        let store = InMemoryEventStore::new();
        let stream = StreamName::new("orders-1");

        let missing = store
            .read(&stream, StreamReadPosition::Start, 10)
            .await
            .unwrap();
        assert!(missing.is_empty());

        store
            .append(&stream, events(3), ExpectedStreamVersion::NoStream)
            .await
            .unwrap();

        let short = store
            .read(&stream, StreamReadPosition::Start, 10)
            .await
            .unwrap();
        assert_eq!(short.len(), 3);

        let past_end = store
            .read(&stream, StreamReadPosition::Position(50), 10)
            .await
            .unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn read_all_tails_across_streams() {
        let store = InMemoryEventStore::new();
        store
            .append(&StreamName::new("a"), events(2), ExpectedStreamVersion::NoStream)
            .await
            .unwrap();
        store
            .append(&StreamName::new("b"), events(2), ExpectedStreamVersion::NoStream)
            .await
            .unwrap();

        let all = store.read_all(GlobalPosition(1), 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].global_position, GlobalPosition(1));
        assert_eq!(all[2].stream.as_str(), "b");
    }
}
