//! Store-backed producer
//!
//! Publishes gateway messages by appending them to destination streams,
//! translating produce options into the store's expected-version
//! precondition. Observes the cancellation signal while the append is in
//! flight.

use crate::store::EventWriter;
use async_trait::async_trait;
use evs_gateway_core::prelude::*;
use evs_gateway_core::ProducerMetrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// Per-message options for store-backed produce
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreProduceOptions {
    /// Expected version of the destination stream; defaults to `Any`
    pub expected_version: ExpectedStreamVersion,
}

impl StoreProduceOptions {
    /// Options carrying an optimistic-concurrency expectation
    pub fn expecting(expected_version: ExpectedStreamVersion) -> Self {
        Self { expected_version }
    }
}

/// Producer that appends to an event store
pub struct StoreProducer<S: EventWriter> {
    store: Arc<S>,
    metrics: ProducerMetrics,
}

impl<S: EventWriter> StoreProducer<S> {
    /// Create a producer over the given store
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            metrics: ProducerMetrics::new("store_producer"),
        }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

#[async_trait]
impl<S: EventWriter> Producer for StoreProducer<S> {
    type Options = StoreProduceOptions;

    async fn produce(
        &self,
        stream: &StreamName,
        message: NewEvent,
        options: &StoreProduceOptions,
        cancellation: &CancellationSignal,
    ) -> Result<ProduceResult> {
        if cancellation.is_cancelled() {
            return Err(GatewayError::cancelled(format!("append to {}", stream)));
        }

        let start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                Err(GatewayError::cancelled(format!("append to {}", stream)))
            }
            appended = self.store.append(stream, vec![message], options.expected_version) => {
                appended
            }
        };

        match result {
            Ok(appended) => {
                self.metrics.record_produce_latency(start.elapsed());
                trace!(
                    stream = %stream,
                    position = appended.stream_position,
                    global = %appended.global_position,
                    "Produced to stream"
                );
                Ok(ProduceResult::at(
                    appended.stream_position,
                    appended.global_position,
                ))
            }
            Err(err) => {
                self.metrics.record_error(if err.is_concurrency_conflict() {
                    "conflict"
                } else if err.is_cancelled() {
                    "cancelled"
                } else {
                    "store"
                });
                Err(err)
            }
        }
    }
}
