//! Metrics for the event gateway
//!
//! Provides Prometheus-compatible metrics for observability.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Metric names as constants for consistency
pub mod names {
    // Handler metrics
    pub const HANDLER_EVENTS_TOTAL: &str = "gateway_handler_events_total";
    pub const HANDLER_MESSAGES_PRODUCED: &str = "gateway_handler_messages_produced_total";
    pub const HANDLER_TRANSFORM_LATENCY: &str = "gateway_handler_transform_latency_seconds";

    // Producer metrics
    pub const PRODUCER_PRODUCE_LATENCY: &str = "gateway_producer_produce_latency_seconds";
    pub const PRODUCER_ERRORS_TOTAL: &str = "gateway_producer_errors_total";

    // Registry metrics
    pub const REGISTRY_CLIENTS: &str = "gateway_registry_clients";
    pub const REGISTRY_CREATED_TOTAL: &str = "gateway_registry_created_total";

    // Store metrics
    pub const STORE_APPENDS_TOTAL: &str = "event_store_appends_total";
    pub const STORE_CONFLICTS_TOTAL: &str = "event_store_conflicts_total";
    pub const STORE_READ_LATENCY: &str = "event_store_read_latency_seconds";
}

/// Labels for metrics
pub mod labels {
    pub const COMPONENT: &str = "component";
    pub const STATUS: &str = "status";
    pub const STREAM: &str = "stream";
    pub const ERROR_TYPE: &str = "error_type";
}

/// Gateway handler metrics
#[derive(Clone)]
pub struct HandlerMetrics {
    component: String,
}

impl HandlerMetrics {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Record a handled event with its resolution status
    pub fn record_status(&self, status: &'static str) {
        counter!(
            names::HANDLER_EVENTS_TOTAL,
            labels::COMPONENT => self.component.clone(),
            labels::STATUS => status,
        )
        .increment(1);
    }

    /// Record the number of outgoing messages from one transform
    pub fn record_fan_out(&self, count: usize) {
        counter!(
            names::HANDLER_MESSAGES_PRODUCED,
            labels::COMPONENT => self.component.clone(),
        )
        .increment(count as u64);
    }

    /// Record transform latency
    pub fn record_transform_latency(&self, duration: Duration) {
        histogram!(
            names::HANDLER_TRANSFORM_LATENCY,
            labels::COMPONENT => self.component.clone(),
        )
        .record(duration.as_secs_f64());
    }
}

/// Producer metrics
#[derive(Clone)]
pub struct ProducerMetrics {
    component: String,
}

impl ProducerMetrics {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Record produce latency for a destination stream
    pub fn record_produce_latency(&self, duration: Duration) {
        histogram!(
            names::PRODUCER_PRODUCE_LATENCY,
            labels::COMPONENT => self.component.clone(),
        )
        .record(duration.as_secs_f64());
    }

    /// Record a produce error
    pub fn record_error(&self, error_type: &str) {
        counter!(
            names::PRODUCER_ERRORS_TOTAL,
            labels::COMPONENT => self.component.clone(),
            labels::ERROR_TYPE => error_type.to_string(),
        )
        .increment(1);
    }
}

/// Client registry metrics
#[derive(Clone)]
pub struct RegistryMetrics {
    component: String,
}

impl RegistryMetrics {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Record one client creation
    pub fn record_created(&self) {
        counter!(
            names::REGISTRY_CREATED_TOTAL,
            labels::COMPONENT => self.component.clone(),
        )
        .increment(1);
    }

    /// Update the number of live clients
    pub fn set_clients(&self, count: usize) {
        gauge!(
            names::REGISTRY_CLIENTS,
            labels::COMPONENT => self.component.clone(),
        )
        .set(count as f64);
    }
}

/// Event store metrics
#[derive(Clone)]
pub struct StoreMetrics {
    component: String,
}

impl StoreMetrics {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Record a successful append of `count` events
    pub fn record_append(&self, count: usize) {
        counter!(
            names::STORE_APPENDS_TOTAL,
            labels::COMPONENT => self.component.clone(),
        )
        .increment(count as u64);
    }

    /// Record an optimistic-concurrency conflict
    pub fn record_conflict(&self, stream: &str) {
        counter!(
            names::STORE_CONFLICTS_TOTAL,
            labels::COMPONENT => self.component.clone(),
            labels::STREAM => stream.to_string(),
        )
        .increment(1);
    }

    /// Record read latency
    pub fn record_read_latency(&self, duration: Duration) {
        histogram!(
            names::STORE_READ_LATENCY,
            labels::COMPONENT => self.component.clone(),
        )
        .record(duration.as_secs_f64());
    }
}
