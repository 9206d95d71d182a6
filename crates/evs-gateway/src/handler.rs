//! Gateway event handler
//!
//! Turns one consumed message into confirmed (or pending) downstream writes:
//! transform, group by target stream, then produce with per-stream ordering
//! and cross-stream parallelism. Supports synchronous delivery (wait for all
//! confirmations) and asynchronous delivery (acknowledgment resolved
//! out-of-band by the produce fan-in).

use evs_gateway_core::prelude::*;
use evs_gateway_core::HandlerMetrics;
use futures::future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, trace, warn};

/// The routing-and-produce pipeline for one subscription
pub struct GatewayHandler<P, T>
where
    P: Producer,
    T: RouteTransform<Options = P::Options>,
{
    producer: Arc<P>,
    transform: Arc<T>,
    await_produce: bool,
    metrics: HandlerMetrics,
}

impl<P, T> GatewayHandler<P, T>
where
    P: Producer + 'static,
    T: RouteTransform<Options = P::Options> + 'static,
{
    /// Create a handler
    ///
    /// With `await_produce` set, `handle_event` confirms all produce
    /// operations before returning `Success`; without it, the handler
    /// returns `Pending` immediately and the inbound context is resolved by
    /// the last relevant produce completion.
    pub fn new(producer: Arc<P>, transform: Arc<T>, await_produce: bool) -> Self {
        Self {
            producer,
            transform,
            await_produce,
            metrics: HandlerMetrics::new("gateway_handler"),
        }
    }

    /// Whether `handle_event` waits for produce confirmation
    ///
    /// Callers building consume contexts use this to decide between
    /// synchronous-only and asynchronous-capable contexts.
    pub fn awaits_produce(&self) -> bool {
        self.await_produce
    }

    /// Handle one inbound message
    ///
    /// Transform faults and non-cancellation produce faults (synchronous
    /// mode) propagate to the caller; cancellation resolves to a negative
    /// acknowledgment, never an unhandled fault.
    pub async fn handle_event(&self, context: &ConsumeContext) -> Result<HandlingStatus> {
        let start = Instant::now();
        let messages = self.transform.route(context).await?;
        self.metrics.record_transform_latency(start.elapsed());

        if messages.is_empty() {
            trace!(message_id = %context.message_id(), "Transform produced nothing");
            self.metrics.record_status(HandlingStatus::Ignored.as_str());
            return Ok(HandlingStatus::Ignored);
        }

        let total = messages.len();
        self.metrics.record_fan_out(total);
        let groups = group_by_stream(messages);
        debug!(
            message_id = %context.message_id(),
            messages = total,
            streams = groups.len(),
            "Routing inbound message"
        );
        let cancellation = context.cancellation().clone();

        if self.await_produce {
            match produce_groups(self.producer.clone(), groups, cancellation, None).await {
                Ok(()) => {
                    self.metrics.record_status(HandlingStatus::Success.as_str());
                    Ok(HandlingStatus::Success)
                }
                Err(err) if err.is_cancelled() => {
                    context.nack(&err);
                    self.metrics.record_status(HandlingStatus::Nacked.as_str());
                    Ok(HandlingStatus::Nacked)
                }
                Err(err) => Err(err),
            }
        } else {
            let fan_in = context
                .async_acker()
                .map(|acker| DeliveryFanIn::new(acker, total));
            if fan_in.is_none() {
                warn!(
                    message_id = %context.message_id(),
                    "Context has no async acknowledgment; producing fire-and-forget"
                );
            }

            let producer = self.producer.clone();
            tokio::spawn(async move {
                if let Err(err) = produce_groups(producer, groups, cancellation, fan_in).await {
                    // Per-message outcomes were already reported into the
                    // fan-in; this log is the only trace for contexts without
                    // an async acknowledgment.
                    error!(error = %err, "Deferred produce failed");
                }
            });

            self.metrics.record_status(HandlingStatus::Pending.as_str());
            Ok(HandlingStatus::Pending)
        }
    }
}

/// Partition messages by target stream, preserving each group's order
fn group_by_stream<O>(messages: Vec<GatewayMessage<O>>) -> Vec<(StreamName, Vec<GatewayMessage<O>>)> {
    let mut groups: Vec<(StreamName, Vec<GatewayMessage<O>>)> = Vec::new();
    for message in messages {
        match groups
            .iter_mut()
            .find(|(stream, _)| *stream == message.target_stream)
        {
            Some((_, group)) => group.push(message),
            None => groups.push((message.target_stream.clone(), vec![message])),
        }
    }
    groups
}

/// Produce all groups: parallel across streams, sequential within one
///
/// A failing group stops submitting its own remaining messages but does not
/// abort unrelated groups already in flight. Cancellation takes precedence
/// over other faults in the aggregated result.
async fn produce_groups<P: Producer>(
    producer: Arc<P>,
    groups: Vec<(StreamName, Vec<GatewayMessage<P::Options>>)>,
    cancellation: CancellationSignal,
    fan_in: Option<Arc<DeliveryFanIn>>,
) -> Result<()> {
    let group_futures = groups.into_iter().map(|(stream, group)| {
        let producer = producer.clone();
        let cancellation = cancellation.clone();
        let fan_in = fan_in.clone();
        async move {
            for message in group {
                match producer
                    .produce(&stream, message.message, &message.options, &cancellation)
                    .await
                {
                    Ok(_) => {
                        if let Some(fan_in) = &fan_in {
                            fan_in.delivered();
                        }
                    }
                    Err(err) => {
                        if let Some(fan_in) = &fan_in {
                            fan_in.delivery_failed(&err);
                        }
                        // An earlier write must observably precede any later
                        // write to the same stream, so the rest of this group
                        // is not submitted.
                        return Err(err);
                    }
                }
            }
            Ok(())
        }
    });

    let results = future::join_all(group_futures).await;

    let mut first_error = None;
    for result in results {
        if let Err(err) = result {
            if err.is_cancelled() {
                return Err(err);
            }
            if first_error.is_none() {
                first_error = Some(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use evs_event_store::{InMemoryEventStore, StoreProduceOptions, StoreProducer};
    use evs_event_store::store::EventReader;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Barrier;
    use tokio::time::timeout;

    fn inbound(async_capable: bool) -> (ConsumeContext, AckListener) {
        let event = NewEvent::new("order.placed", Bytes::from_static(b"{\"total\":42}"));
        let stream = StreamName::new("source-1");
        if async_capable {
            ConsumeContext::new_async(stream, 0, event, CancellationSignal::new())
        } else {
            ConsumeContext::new_sync(stream, 0, event, CancellationSignal::new())
        }
    }

    fn outgoing(target: &str, n: u32) -> GatewayMessage<()> {
        GatewayMessage::new(
            target,
            NewEvent::new("order.routed", Bytes::from(format!("{{\"n\":{}}}", n))),
            (),
        )
    }

    /// Transform that returns a fixed message sequence
    struct FixedTransform {
        messages: Vec<GatewayMessage<()>>,
    }

    #[async_trait]
    impl RouteTransform for FixedTransform {
        type Options = ();

        async fn route(&self, _context: &ConsumeContext) -> Result<Vec<GatewayMessage<()>>> {
            Ok(self.messages.clone())
        }
    }

    /// Transform that faults
    struct FaultingTransform;

    #[async_trait]
    impl RouteTransform for FaultingTransform {
        type Options = ();

        async fn route(&self, _context: &ConsumeContext) -> Result<Vec<GatewayMessage<()>>> {
            Err(GatewayError::transform("lookup failed"))
        }
    }

    /// Producer that records produce order per stream, with optional
    /// per-call delay, failure injection, and a rendezvous barrier
    struct RecordingProducer {
        calls: Mutex<HashMap<String, Vec<String>>>,
        delay: Duration,
        fail_stream: Option<String>,
        barrier: Option<Arc<Barrier>>,
    }

    impl RecordingProducer {
        fn new() -> Self {
            Self {
                calls: Mutex::new(HashMap::new()),
                delay: Duration::ZERO,
                fail_stream: None,
                barrier: None,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn failing_on(mut self, stream: &str) -> Self {
            self.fail_stream = Some(stream.to_string());
            self
        }

        fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
            self.barrier = Some(barrier);
            self
        }

        fn calls_for(&self, stream: &str) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .get(stream)
                .cloned()
                .unwrap_or_default()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().values().map(Vec::len).sum()
        }
    }

    #[async_trait]
    impl Producer for RecordingProducer {
        type Options = ();

        async fn produce(
            &self,
            stream: &StreamName,
            message: NewEvent,
            _options: &(),
            cancellation: &CancellationSignal,
        ) -> Result<ProduceResult> {
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            if !self.delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => {
                        return Err(GatewayError::cancelled(format!("produce to {}", stream)));
                    }
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }
            if cancellation.is_cancelled() {
                return Err(GatewayError::cancelled(format!("produce to {}", stream)));
            }
            if self.fail_stream.as_deref() == Some(stream.as_str()) {
                return Err(GatewayError::produce("injected failure"));
            }
            self.calls
                .lock()
                .unwrap()
                .entry(stream.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(&message.payload).into_owned());
            Ok(ProduceResult::delivered())
        }
    }

    #[tokio::test]
    async fn empty_transform_is_ignored_without_produce() {
        let producer = Arc::new(RecordingProducer::new());
        let transform = Arc::new(FixedTransform { messages: vec![] });
        let handler = GatewayHandler::new(producer.clone(), transform, true);
        let (ctx, _listener) = inbound(false);

        let status = handler.handle_event(&ctx).await.unwrap();

        assert_eq!(status, HandlingStatus::Ignored);
        assert_eq!(producer.total_calls(), 0);
        assert!(!ctx.is_terminated());
    }

    #[tokio::test]
    async fn transform_fault_propagates_uncaught() {
        let producer = Arc::new(RecordingProducer::new());
        let handler = GatewayHandler::new(producer, Arc::new(FaultingTransform), true);
        let (ctx, _listener) = inbound(false);

        let err = handler.handle_event(&ctx).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transform { .. }));
    }

    #[tokio::test]
    async fn per_stream_order_is_preserved_under_interleaving() {
        let producer = Arc::new(RecordingProducer::new().with_delay(Duration::from_millis(2)));
        // s-a and s-b interleaved in emission order
        let transform = Arc::new(FixedTransform {
            messages: vec![
                outgoing("s-a", 1),
                outgoing("s-b", 1),
                outgoing("s-a", 2),
                outgoing("s-b", 2),
                outgoing("s-a", 3),
            ],
        });
        let handler = GatewayHandler::new(producer.clone(), transform, true);
        let (ctx, _listener) = inbound(false);

        let status = handler.handle_event(&ctx).await.unwrap();

        assert_eq!(status, HandlingStatus::Success);
        assert_eq!(
            producer.calls_for("s-a"),
            vec!["{\"n\":1}", "{\"n\":2}", "{\"n\":3}"]
        );
        assert_eq!(producer.calls_for("s-b"), vec!["{\"n\":1}", "{\"n\":2}"]);
    }

    #[tokio::test]
    async fn distinct_streams_are_produced_in_parallel() {
        // All three group produces must be in flight at once for the
        // barrier to release; a serialized handler would deadlock here.
        let barrier = Arc::new(Barrier::new(3));
        let producer = Arc::new(RecordingProducer::new().with_barrier(barrier));
        let transform = Arc::new(FixedTransform {
            messages: vec![outgoing("s-a", 1), outgoing("s-b", 1), outgoing("s-c", 1)],
        });
        let handler = GatewayHandler::new(producer.clone(), transform, true);
        let (ctx, _listener) = inbound(false);

        let status = timeout(Duration::from_secs(1), handler.handle_event(&ctx))
            .await
            .expect("produce groups did not run in parallel")
            .unwrap();

        assert_eq!(status, HandlingStatus::Success);
        assert_eq!(producer.total_calls(), 3);
    }

    #[tokio::test]
    async fn one_failing_group_does_not_abort_the_others() {
        let producer = Arc::new(RecordingProducer::new().failing_on("s-bad"));
        let transform = Arc::new(FixedTransform {
            messages: vec![outgoing("s-good", 1), outgoing("s-bad", 1), outgoing("s-good", 2)],
        });
        let handler = GatewayHandler::new(producer.clone(), transform, true);
        let (ctx, _listener) = inbound(false);

        let err = handler.handle_event(&ctx).await.unwrap_err();

        assert!(matches!(err, GatewayError::Produce { .. }));
        assert_eq!(producer.calls_for("s-good").len(), 2);
    }

    #[tokio::test]
    async fn cancellation_during_produce_resolves_to_nack() {
        let producer = Arc::new(RecordingProducer::new().with_delay(Duration::from_millis(200)));
        let transform = Arc::new(FixedTransform {
            messages: vec![outgoing("s-a", 1)],
        });
        let handler = GatewayHandler::new(producer, transform, true);
        let (ctx, listener) = inbound(false);

        let cancellation = ctx.cancellation().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancellation.cancel();
        });

        let status = handler.handle_event(&ctx).await.unwrap();

        assert_eq!(status, HandlingStatus::Nacked);
        match listener.wait().await {
            Some(Acknowledgment::Nack(cause)) => assert!(cause.contains("produce")),
            other => panic!("expected Nack, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn async_mode_returns_pending_and_acks_after_last_delivery() {
        let producer = Arc::new(RecordingProducer::new().with_delay(Duration::from_millis(5)));
        let transform = Arc::new(FixedTransform {
            messages: vec![outgoing("s-a", 1), outgoing("s-b", 1), outgoing("s-a", 2)],
        });
        let handler = GatewayHandler::new(producer.clone(), transform, false);
        let (ctx, listener) = inbound(true);

        let status = handler.handle_event(&ctx).await.unwrap();
        assert_eq!(status, HandlingStatus::Pending);

        let ack = timeout(Duration::from_secs(1), listener.wait())
            .await
            .unwrap();
        assert_eq!(ack, Some(Acknowledgment::Ack));
        assert_eq!(producer.total_calls(), 3);
    }

    #[tokio::test]
    async fn async_mode_fails_context_on_first_produce_failure() {
        let producer = Arc::new(RecordingProducer::new().failing_on("s-bad"));
        let transform = Arc::new(FixedTransform {
            messages: vec![outgoing("s-good", 1), outgoing("s-bad", 1)],
        });
        let handler = GatewayHandler::new(producer, transform, false);
        let (ctx, listener) = inbound(true);

        let status = handler.handle_event(&ctx).await.unwrap();
        assert_eq!(status, HandlingStatus::Pending);

        match timeout(Duration::from_secs(1), listener.wait()).await.unwrap() {
            Some(Acknowledgment::Fail(cause)) => assert!(cause.contains("injected failure")),
            other => panic!("expected Fail, got {:?}", other),
        }
    }

    /// Transform routing one inbound event to streams A and B
    struct SplitTransform;

    #[async_trait]
    impl RouteTransform for SplitTransform {
        type Options = StoreProduceOptions;

        async fn route(
            &self,
            context: &ConsumeContext,
        ) -> Result<Vec<GatewayMessage<StoreProduceOptions>>> {
            let meta = Metadata::new().merge(context.metadata());
            Ok(vec![
                GatewayMessage::new(
                    "target-a",
                    NewEvent::new(context.message_type(), context.payload().clone())
                        .with_metadata(meta.clone()),
                    StoreProduceOptions::default(),
                ),
                GatewayMessage::new(
                    "target-b",
                    NewEvent::new(context.message_type(), context.payload().clone())
                        .with_metadata(meta),
                    StoreProduceOptions::default(),
                ),
            ])
        }
    }

    #[tokio::test]
    async fn one_inbound_event_lands_in_both_target_streams() {
        let store = Arc::new(InMemoryEventStore::new());
        let producer = Arc::new(StoreProducer::new(store.clone()));
        let handler = GatewayHandler::new(producer, Arc::new(SplitTransform), true);
        let (ctx, _listener) = inbound(false);

        let status = handler.handle_event(&ctx).await.unwrap();
        assert_eq!(status, HandlingStatus::Success);

        for target in ["target-a", "target-b"] {
            let events = store
                .read(&StreamName::new(target), StreamReadPosition::Start, 10)
                .await
                .unwrap();
            assert_eq!(events.len(), 1, "stream {} should hold one event", target);
            assert_eq!(events[0].stream_position, 0);
            assert_eq!(events[0].event_type, "order.placed");
        }
    }
}
