//! Shovel runtime
//!
//! Polls a source store in global-position order, wraps each event in a
//! consume context, and feeds the gateway handler. Progress is committed to
//! a checkpoint after each batch so a restart resumes without losing or
//! duplicating work the handler already confirmed.

use crate::checkpoint::CheckpointStore;
use crate::handler::GatewayHandler;
use evs_event_store::AllStreamReader;
use evs_gateway_core::prelude::*;
use evs_gateway_core::ShovelConfig;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bridges a source store to a gateway handler
pub struct Shovel<R, P, T>
where
    R: AllStreamReader,
    P: Producer,
    T: RouteTransform<Options = P::Options>,
{
    source: Arc<R>,
    handler: Arc<GatewayHandler<P, T>>,
    checkpoint: Arc<dyn CheckpointStore>,
    config: ShovelConfig,
    shutdown: CancellationSignal,
    running: AtomicBool,
    processed: AtomicU64,
    ignored: AtomicU64,
}

impl<R, P, T> Shovel<R, P, T>
where
    R: AllStreamReader + 'static,
    P: Producer + 'static,
    T: RouteTransform<Options = P::Options> + 'static,
{
    /// Create a shovel
    pub fn new(
        source: Arc<R>,
        handler: Arc<GatewayHandler<P, T>>,
        checkpoint: Arc<dyn CheckpointStore>,
        config: ShovelConfig,
    ) -> Self {
        Self {
            source,
            handler,
            checkpoint,
            config,
            shutdown: CancellationSignal::new(),
            running: AtomicBool::new(false),
            processed: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
        }
    }

    /// Signal used to stop the loop; also cancels in-flight produce calls
    pub fn shutdown_signal(&self) -> CancellationSignal {
        self.shutdown.clone()
    }

    /// Stop the loop after the current batch
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Check if the loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of events confirmed downstream
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Run until the shutdown signal fires
    pub async fn run(&self) -> Result<()> {
        let mut position = self.checkpoint.load().await?;
        self.running.store(true, Ordering::SeqCst);
        info!(
            checkpoint = %self.checkpoint.name(),
            position = %position,
            "Shovel started"
        );

        while !self.shutdown.is_cancelled() {
            let batch = self
                .source
                .read_all(position, self.config.batch_size)
                .await?;

            if batch.is_empty() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => continue,
                }
            }

            for event in batch {
                let next = GlobalPosition(event.global_position.0 + 1);
                if !self.handle_one(event).await? {
                    // Nacked on shutdown; do not advance past this event
                    self.running.store(false, Ordering::SeqCst);
                    return Ok(());
                }
                position = next;
            }

            self.checkpoint.save(position).await?;
            debug!(position = %position, "Checkpoint committed");
        }

        self.checkpoint.save(position).await?;
        self.running.store(false, Ordering::SeqCst);
        info!(
            processed = self.processed.load(Ordering::Relaxed),
            ignored = self.ignored.load(Ordering::Relaxed),
            "Shovel stopped"
        );
        Ok(())
    }

    /// Handle one event; returns false when the context was nacked
    async fn handle_one(&self, event: PersistedEvent) -> Result<bool> {
        let mut metadata = event.metadata;
        if metadata.source.is_none() {
            metadata.source = Some(self.config.source_id.clone());
        }
        let inbound = NewEvent {
            id: event.id,
            event_type: event.event_type,
            payload: event.payload,
            metadata,
        };
        let (context, listener) = if self.handler.awaits_produce() {
            ConsumeContext::new_sync(
                event.stream,
                event.stream_position,
                inbound,
                self.shutdown.clone(),
            )
        } else {
            ConsumeContext::new_async(
                event.stream,
                event.stream_position,
                inbound,
                self.shutdown.clone(),
            )
        };

        match self.handler.handle_event(&context).await {
            Ok(HandlingStatus::Success) => {
                context.ack();
                self.processed.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Ok(HandlingStatus::Ignored) => {
                context.ack();
                self.ignored.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Ok(HandlingStatus::Pending) => {
                // Deferred delivery: wait for the produce fan-in to resolve
                // the context, so the checkpoint never advances past an
                // unconfirmed event.
                match listener.wait().await {
                    Some(Acknowledgment::Ack) => {
                        self.processed.fetch_add(1, Ordering::Relaxed);
                        Ok(true)
                    }
                    Some(Acknowledgment::Nack(cause)) => {
                        warn!(
                            message_id = %context.message_id(),
                            cause = %cause,
                            "Event nacked during shutdown"
                        );
                        Ok(false)
                    }
                    Some(Acknowledgment::Fail(cause)) => Err(GatewayError::produce(cause)),
                    None => Err(GatewayError::Internal(
                        "consume context dropped without a terminal action".to_string(),
                    )),
                }
            }
            Ok(HandlingStatus::Nacked) => {
                warn!(message_id = %context.message_id(), "Event nacked during shutdown");
                Ok(false)
            }
            Err(err) => {
                context.fail(&err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpoint;
    use crate::transform::{MirrorTransform, StreamPrefixTransform};
    use async_trait::async_trait;
    use bytes::Bytes;
    use evs_event_store::{
        EventReader, EventWriter, InMemoryEventStore, StoreProduceOptions, StoreProducer,
    };
    use std::time::Duration;
    use tokio::time::timeout;

    fn events(count: usize) -> Vec<NewEvent> {
        (0..count)
            .map(|i| NewEvent::new("order.placed", Bytes::from(format!("{{\"n\":{}}}", i))))
            .collect()
    }

    #[tokio::test]
    async fn shovel_replicates_source_streams_to_prefixed_targets() {
        let source = Arc::new(InMemoryEventStore::new());
        let target = Arc::new(InMemoryEventStore::new());

        source
            .append(
                &StreamName::new("orders"),
                events(3),
                ExpectedStreamVersion::NoStream,
            )
            .await
            .unwrap();
        source
            .append(
                &StreamName::new("payments"),
                events(2),
                ExpectedStreamVersion::NoStream,
            )
            .await
            .unwrap();

        let handler = Arc::new(GatewayHandler::new(
            Arc::new(StoreProducer::new(target.clone())),
            Arc::new(StreamPrefixTransform::new(
                "replica",
                StoreProduceOptions::default(),
            )),
            true,
        ));
        let checkpoint = Arc::new(MemoryCheckpoint::new());
        let shovel = Arc::new(Shovel::new(
            source,
            handler,
            checkpoint.clone(),
            ShovelConfig::default(),
        ));

        let runner = {
            let shovel = shovel.clone();
            tokio::spawn(async move { shovel.run().await })
        };

        // Wait until both target streams are fully replicated
        timeout(Duration::from_secs(2), async {
            loop {
                let orders = target
                    .read(
                        &StreamName::new("replica-orders"),
                        StreamReadPosition::Start,
                        10,
                    )
                    .await
                    .unwrap();
                let payments = target
                    .read(
                        &StreamName::new("replica-payments"),
                        StreamReadPosition::Start,
                        10,
                    )
                    .await
                    .unwrap();
                if orders.len() == 3 && payments.len() == 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("replication did not complete");

        shovel.stop();
        runner.await.unwrap().unwrap();

        assert_eq!(shovel.processed_count(), 5);
        assert_eq!(checkpoint.load().await.unwrap(), GlobalPosition(5));

        // Per-stream order survived the shovel
        let orders = target
            .read(
                &StreamName::new("replica-orders"),
                StreamReadPosition::Start,
                10,
            )
            .await
            .unwrap();
        let payloads: Vec<_> = orders
            .iter()
            .map(|e| String::from_utf8_lossy(&e.payload).into_owned())
            .collect();
        assert_eq!(payloads, vec!["{\"n\":0}", "{\"n\":1}", "{\"n\":2}"]);
    }

    #[tokio::test]
    async fn shovel_resumes_from_checkpoint() {
        let source = Arc::new(InMemoryEventStore::new());
        let target = Arc::new(InMemoryEventStore::new());

        source
            .append(
                &StreamName::new("orders"),
                events(4),
                ExpectedStreamVersion::NoStream,
            )
            .await
            .unwrap();

        // Checkpoint past the first two events
        let checkpoint = Arc::new(MemoryCheckpoint::at(GlobalPosition(2)));
        let handler = Arc::new(GatewayHandler::new(
            Arc::new(StoreProducer::new(target.clone())),
            Arc::new(StreamPrefixTransform::new(
                "replica",
                StoreProduceOptions::default(),
            )),
            true,
        ));
        let shovel = Arc::new(Shovel::new(
            source,
            handler,
            checkpoint,
            ShovelConfig::default(),
        ));

        let runner = {
            let shovel = shovel.clone();
            tokio::spawn(async move { shovel.run().await })
        };

        timeout(Duration::from_secs(2), async {
            while shovel.processed_count() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("resume did not complete");

        shovel.stop();
        runner.await.unwrap().unwrap();

        let replicated = target
            .read(
                &StreamName::new("replica-orders"),
                StreamReadPosition::Start,
                10,
            )
            .await
            .unwrap();
        assert_eq!(replicated.len(), 2);
    }

    /// Producer that rejects every write
    struct RejectingProducer;

    #[async_trait]
    impl Producer for RejectingProducer {
        type Options = ();

        async fn produce(
            &self,
            stream: &StreamName,
            _message: NewEvent,
            _options: &(),
            _cancellation: &CancellationSignal,
        ) -> Result<ProduceResult> {
            Err(GatewayError::produce(format!(
                "target {} rejected the write",
                stream
            )))
        }
    }

    #[tokio::test]
    async fn deferred_delivery_failure_stops_the_loop_without_advancing() {
        let source = Arc::new(InMemoryEventStore::new());
        source
            .append(
                &StreamName::new("orders"),
                events(1),
                ExpectedStreamVersion::NoStream,
            )
            .await
            .unwrap();

        let handler = Arc::new(GatewayHandler::new(
            Arc::new(RejectingProducer),
            Arc::new(MirrorTransform::new(())),
            false,
        ));
        let checkpoint = Arc::new(MemoryCheckpoint::new());
        let shovel = Shovel::new(
            source,
            handler,
            checkpoint.clone(),
            ShovelConfig::default(),
        );

        let err = shovel.run().await.unwrap_err();

        assert!(matches!(err, GatewayError::Produce { .. }));
        assert_eq!(shovel.processed_count(), 0);
        assert_eq!(checkpoint.load().await.unwrap(), GlobalPosition::START);
    }

    #[tokio::test]
    async fn deferred_delivery_advances_checkpoint_only_after_confirmation() {
        let source = Arc::new(InMemoryEventStore::new());
        let target = Arc::new(InMemoryEventStore::new());
        source
            .append(
                &StreamName::new("orders"),
                events(3),
                ExpectedStreamVersion::NoStream,
            )
            .await
            .unwrap();

        let handler = Arc::new(GatewayHandler::new(
            Arc::new(StoreProducer::new(target.clone())),
            Arc::new(StreamPrefixTransform::new(
                "replica",
                StoreProduceOptions::default(),
            )),
            false,
        ));
        let checkpoint = Arc::new(MemoryCheckpoint::new());
        let shovel = Arc::new(Shovel::new(
            source,
            handler,
            checkpoint.clone(),
            ShovelConfig::default(),
        ));

        let runner = {
            let shovel = shovel.clone();
            tokio::spawn(async move { shovel.run().await })
        };

        timeout(Duration::from_secs(2), async {
            while shovel.processed_count() < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("deferred replication did not complete");

        shovel.stop();
        runner.await.unwrap().unwrap();

        assert_eq!(checkpoint.load().await.unwrap(), GlobalPosition(3));
        let replicated = target
            .read(
                &StreamName::new("replica-orders"),
                StreamReadPosition::Start,
                10,
            )
            .await
            .unwrap();
        assert_eq!(replicated.len(), 3);
    }
}
