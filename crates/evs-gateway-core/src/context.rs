//! Consume context and acknowledgment protocol
//!
//! One inbound message plus its acknowledgment handle. Three terminal
//! actions exist, mutually exclusive and exactly-once per context:
//! acknowledge, fail with cause, or negative-acknowledge. A context also
//! carries the cooperative cancellation signal for the pipeline.

use crate::cancel::CancellationSignal;
use crate::error::GatewayError;
use crate::message::{Metadata, NewEvent, StreamName};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::warn;
use uuid::Uuid;

/// Result of handling one inbound message, reported to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlingStatus {
    /// The transform produced nothing; no side effect occurred
    Ignored,
    /// All produce operations completed and confirmed (synchronous mode)
    Success,
    /// Confirmation deferred to the context's asynchronous acknowledgment
    Pending,
    /// The context was negatively acknowledged (cancellation)
    Nacked,
}

impl HandlingStatus {
    /// Status name for logging and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Success => "success",
            Self::Pending => "pending",
            Self::Nacked => "nacked",
        }
    }
}

impl std::fmt::Display for HandlingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal action taken on a consume context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgment {
    /// Successfully handled
    Ack,
    /// Failed with cause; eligible for transport-level retry or dead-lettering
    Fail(String),
    /// Explicit negative acknowledgment, typically from cancellation
    Nack(String),
}

/// Shared exactly-once terminal state for one context
struct AckState {
    done: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<Acknowledgment>>>,
}

impl AckState {
    fn new(tx: oneshot::Sender<Acknowledgment>) -> Self {
        Self {
            done: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
        }
    }

    /// First terminal action wins; later ones are ignored
    fn resolve(&self, ack: Acknowledgment) -> bool {
        if self.done.swap(true, Ordering::SeqCst) {
            warn!(ignored = ?ack, "Duplicate terminal action on consume context");
            return false;
        }
        let tx = self.tx.lock().ok().and_then(|mut guard| guard.take());
        if let Some(tx) = tx {
            let _ = tx.send(ack);
        }
        true
    }

    fn is_terminated(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// Receiving side of a context's terminal action
///
/// Held by the subscription transport; resolves when the context is
/// acknowledged, failed, or nacked. `None` means the context was dropped
/// without a terminal action, which the transport should treat as failed.
pub struct AckListener(oneshot::Receiver<Acknowledgment>);

impl AckListener {
    /// Wait for the terminal action
    pub async fn wait(self) -> Option<Acknowledgment> {
        self.0.await.ok()
    }
}

/// Asynchronous acknowledgment capability of a context
///
/// Cheap to clone; all clones share the context's exactly-once state.
#[derive(Clone)]
pub struct AsyncAcker {
    state: Arc<AckState>,
}

impl AsyncAcker {
    /// Mark the inbound message successfully handled
    pub fn ack(&self) {
        self.state.resolve(Acknowledgment::Ack);
    }

    /// Mark the inbound message failed with cause
    pub fn fail(&self, error: impl std::fmt::Display) {
        self.state.resolve(Acknowledgment::Fail(error.to_string()));
    }

    /// Negatively acknowledge the inbound message
    pub fn nack(&self, cause: impl std::fmt::Display) {
        self.state.resolve(Acknowledgment::Nack(cause.to_string()));
    }
}

/// One inbound message with its acknowledgment handle and cancellation signal
///
/// Created by the subscription transport when a message arrives, passed
/// through transform and produce, finalized exactly once.
pub struct ConsumeContext {
    message_id: Uuid,
    message_type: String,
    stream: StreamName,
    stream_position: u64,
    payload: Bytes,
    metadata: Metadata,
    cancellation: CancellationSignal,
    state: Arc<AckState>,
    async_capable: bool,
}

impl ConsumeContext {
    /// Create a synchronous-only context
    ///
    /// The transport acknowledges it itself after a `Success` status.
    pub fn new_sync(
        stream: StreamName,
        stream_position: u64,
        event: NewEvent,
        cancellation: CancellationSignal,
    ) -> (Self, AckListener) {
        Self::new(stream, stream_position, event, cancellation, false)
    }

    /// Create an asynchronous-capable context
    ///
    /// In asynchronous delivery mode the produce fan-in resolves it
    /// out-of-band via [`AsyncAcker`].
    pub fn new_async(
        stream: StreamName,
        stream_position: u64,
        event: NewEvent,
        cancellation: CancellationSignal,
    ) -> (Self, AckListener) {
        Self::new(stream, stream_position, event, cancellation, true)
    }

    fn new(
        stream: StreamName,
        stream_position: u64,
        event: NewEvent,
        cancellation: CancellationSignal,
        async_capable: bool,
    ) -> (Self, AckListener) {
        let (tx, rx) = oneshot::channel();
        let context = Self {
            message_id: event.id,
            message_type: event.event_type,
            stream,
            stream_position,
            payload: event.payload,
            metadata: event.metadata,
            cancellation,
            state: Arc::new(AckState::new(tx)),
            async_capable,
        };
        (context, AckListener(rx))
    }

    /// Unique id of the inbound message
    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    /// Event type tag of the inbound message
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Source stream of the inbound message
    pub fn stream(&self) -> &StreamName {
        &self.stream
    }

    /// Position of the inbound message within its source stream
    pub fn stream_position(&self) -> u64 {
        self.stream_position
    }

    /// Serialized payload
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Inbound metadata, merged into outgoing messages by transforms
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Cancellation signal for this message's pipeline
    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    /// Capability query: asynchronous acknowledgment handle, if supported
    pub fn async_acker(&self) -> Option<AsyncAcker> {
        self.async_capable.then(|| AsyncAcker {
            state: self.state.clone(),
        })
    }

    /// Mark successfully handled
    pub fn ack(&self) {
        self.state.resolve(Acknowledgment::Ack);
    }

    /// Mark failed with cause
    pub fn fail(&self, error: impl std::fmt::Display) {
        self.state.resolve(Acknowledgment::Fail(error.to_string()));
    }

    /// Negatively acknowledge with cause
    pub fn nack(&self, cause: impl std::fmt::Display) {
        self.state.resolve(Acknowledgment::Nack(cause.to_string()));
    }

    /// Check whether a terminal action has been taken
    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }
}

/// Fan-in synchronization for asynchronous delivery
///
/// One inbound message may fan out into several produce calls. The inbound
/// context is acknowledged only after the last of them succeeds; the first
/// failure fails it immediately (a cancellation nacks instead). The shared
/// exactly-once state guarantees a single terminal action even when
/// completions race.
pub struct DeliveryFanIn {
    remaining: AtomicUsize,
    failed: AtomicBool,
    acker: AsyncAcker,
}

impl DeliveryFanIn {
    /// Create a fan-in expecting `count` produce completions
    pub fn new(acker: AsyncAcker, count: usize) -> Arc<Self> {
        debug_assert!(count > 0, "fan-in requires at least one produce call");
        Arc::new(Self {
            remaining: AtomicUsize::new(count),
            failed: AtomicBool::new(false),
            acker,
        })
    }

    /// Report one successful produce completion
    pub fn delivered(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 && !self.failed.load(Ordering::Acquire)
        {
            self.acker.ack();
        }
    }

    /// Report one failed produce completion
    pub fn delivery_failed(&self, error: &GatewayError) {
        if !self.failed.swap(true, Ordering::AcqRel) {
            if error.is_cancelled() {
                self.acker.nack(error);
            } else {
                self.acker.fail(error);
            }
        }
    }
}
