//! Message and stream types for the event gateway
//!
//! Defines stream identity, position, and version semantics plus the
//! event shapes that flow through the routing pipeline.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Name of a destination stream or topic
///
/// Opaque, immutable, compared by value. The unit of ordering and
/// optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamName(String);

impl StreamName {
    /// Create a stream name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Stream name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for StreamName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Position to start reading a stream from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamReadPosition {
    /// Beginning of the stream (position 0)
    Start,
    /// A specific stream-local position
    Position(u64),
}

impl StreamReadPosition {
    /// Resolve to a concrete stream-local offset
    pub fn offset(&self) -> u64 {
        match self {
            Self::Start => 0,
            Self::Position(p) => *p,
        }
    }
}

/// Store-wide monotonic position, ordering events across all streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalPosition(pub u64);

impl GlobalPosition {
    /// Position of the first event in the store
    pub const START: GlobalPosition = GlobalPosition(0);
}

impl std::fmt::Display for GlobalPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optimistic concurrency precondition for appends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedStreamVersion {
    /// The stream must not exist yet
    NoStream,
    /// No version check
    #[default]
    Any,
    /// The stream's current version must be exactly this value
    Exact(u64),
}

impl std::fmt::Display for ExpectedStreamVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoStream => f.write_str("no-stream"),
            Self::Any => f.write_str("any"),
            Self::Exact(v) => write!(f, "{}", v),
        }
    }
}

/// Message metadata for tracing and context propagation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Correlation ID shared by all messages of one logical flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// ID of the message that caused this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,

    /// Source identifier (e.g. "orders-shovel")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Custom headers for extensibility
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl Metadata {
    /// Create empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set correlation ID
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Builder: set causation ID
    pub fn with_causation_id(mut self, id: impl Into<String>) -> Self {
        self.causation_id = Some(id.into());
        self
    }

    /// Builder: set source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Builder: add header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Merge ambient metadata into this one, keeping values already set
    pub fn merge(mut self, ambient: &Metadata) -> Self {
        if self.correlation_id.is_none() {
            self.correlation_id = ambient.correlation_id.clone();
        }
        if self.causation_id.is_none() {
            self.causation_id = ambient.causation_id.clone();
        }
        if self.source.is_none() {
            self.source = ambient.source.clone();
        }
        for (k, v) in &ambient.headers {
            self.headers.entry(k.clone()).or_insert_with(|| v.clone());
        }
        self
    }
}

/// A new event proposed for append or publish
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    /// Unique message identifier (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Event type tag
    pub event_type: String,

    /// Serialized payload
    pub payload: Bytes,

    /// Metadata attached to the event
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewEvent {
    /// Create a new event with a generated id
    pub fn new(event_type: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: event_type.into(),
            payload: payload.into(),
            metadata: Metadata::default(),
        }
    }

    /// Builder: set metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Approximate size in bytes
    pub fn size_bytes(&self) -> usize {
        self.payload.len() + self.event_type.len()
    }
}

/// One stored event, as returned by store reads
///
/// Created once on successful append, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEvent {
    /// Unique message identifier
    pub id: Uuid,

    /// Event type tag
    pub event_type: String,

    /// Position within the owning stream (0-based)
    pub stream_position: u64,

    /// Store-wide position
    pub global_position: GlobalPosition,

    /// Serialized payload
    pub payload: Bytes,

    /// Metadata stored alongside the payload
    pub metadata: Metadata,

    /// Timestamp assigned at append time
    pub created: DateTime<Utc>,

    /// Owning stream
    pub stream: StreamName,
}

/// One outgoing unit produced by a route transform
///
/// Consumed immediately by the produce step, never persisted on its own.
#[derive(Debug, Clone)]
pub struct GatewayMessage<O> {
    /// The event to produce
    pub message: NewEvent,

    /// Destination stream
    pub target_stream: StreamName,

    /// Per-message produce options
    pub options: O,
}

impl<O> GatewayMessage<O> {
    /// Create a gateway message
    pub fn new(target_stream: impl Into<StreamName>, message: NewEvent, options: O) -> Self {
        Self {
            message,
            target_stream: target_stream.into(),
            options,
        }
    }
}
