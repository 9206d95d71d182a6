//! # Event Gateway Core
//!
//! Core types, strategy traits, and the acknowledgment protocol for the
//! event-sourcing gateway runtime.
//!
//! This crate defines the fundamental abstractions shared across the
//! workspace:
//! - Stream identity, positions, and optimistic-concurrency versions
//! - The consume context with its exactly-once acknowledgment protocol
//! - Strategy traits for routing, producing, and client creation
//! - Cooperative cancellation observed at every suspension point
//!
//! ## Pipeline
//!
//! ```text
//! ┌───────────────┐     ┌────────────────┐     ┌──────────────┐
//! │ ConsumeContext│────►│ RouteTransform │────►│   Producer   │
//! │  (ack handle) │     │   (fan-out)    │     │ (per-stream  │
//! └───────────────┘     └────────────────┘     │   ordering)  │
//!         ▲                                    └──────┬───────┘
//!         └──────────── acknowledgment ───────────────┘
//! ```

pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod metrics;
pub mod strategy;

pub use cancel::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use message::*;
pub use metrics::*;
pub use strategy::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cancel::CancellationSignal;
    pub use crate::config::GatewayConfig;
    pub use crate::context::{
        Acknowledgment, AckListener, AsyncAcker, ConsumeContext, DeliveryFanIn, HandlingStatus,
    };
    pub use crate::error::{GatewayError, Result};
    pub use crate::message::{
        ExpectedStreamVersion, GatewayMessage, GlobalPosition, Metadata, NewEvent, PersistedEvent,
        StreamName, StreamReadPosition,
    };
    pub use crate::strategy::{
        ClientFactory, HealthCheck, Lifecycle, ProduceResult, Producer, RouteTransform,
    };
}
