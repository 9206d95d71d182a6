//! In-memory topic broker and registry-backed producer
//!
//! A broker backend for republishing: one topic per destination stream,
//! clients resolved lazily through the [`ClientRegistry`] with optional
//! create-if-missing provisioning. Supports confirmed and fire-and-forget
//! delivery per message.

use crate::registry::ClientRegistry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evs_gateway_core::prelude::*;
use evs_gateway_core::ProducerMetrics;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, trace};

/// One record published to a topic
#[derive(Debug, Clone)]
pub struct PublishedRecord {
    /// The published event
    pub event: NewEvent,
    /// Publish timestamp assigned by the broker
    pub published_at: DateTime<Utc>,
}

struct TopicState {
    name: String,
    records: RwLock<Vec<PublishedRecord>>,
}

/// In-memory message broker holding named topics
#[derive(Default)]
pub struct InMemoryBroker {
    topics: RwLock<HashMap<String, Arc<TopicState>>>,
}

impl InMemoryBroker {
    /// Create an empty broker
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a topic if it does not exist yet; idempotent
    pub async fn create_topic(&self, name: &str) {
        self.ensure_topic(name).await;
    }

    async fn ensure_topic(&self, name: &str) -> Arc<TopicState> {
        let mut topics = self.topics.write().await;
        topics
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(topic = name, "Created topic");
                Arc::new(TopicState {
                    name: name.to_string(),
                    records: RwLock::new(Vec::new()),
                })
            })
            .clone()
    }

    /// Check if a topic exists
    pub async fn topic_exists(&self, name: &str) -> bool {
        self.topics.read().await.contains_key(name)
    }

    async fn topic(&self, name: &str) -> Option<Arc<TopicState>> {
        self.topics.read().await.get(name).cloned()
    }

    /// All records published to a topic, in publish order
    pub async fn records(&self, name: &str) -> Vec<PublishedRecord> {
        match self.topic(name).await {
            Some(topic) => topic.records.read().await.clone(),
            None => Vec::new(),
        }
    }
}

/// An opened, reusable handle to one topic
pub struct TopicClient {
    topic: Arc<TopicState>,
}

impl TopicClient {
    /// Topic this client publishes to
    pub fn topic_name(&self) -> &str {
        &self.topic.name
    }

    /// Publish one event, durably recorded before returning
    pub async fn publish(&self, event: NewEvent) -> Result<u64> {
        let mut records = self.topic.records.write().await;
        let position = records.len() as u64;
        records.push(PublishedRecord {
            event,
            published_at: Utc::now(),
        });
        Ok(position)
    }

    /// Flush pending publishes; a no-op for the in-memory broker
    pub async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Client factory provisioning broker topics on first use
pub struct BrokerClientFactory {
    broker: Arc<InMemoryBroker>,
    create_missing: bool,
}

impl BrokerClientFactory {
    /// Factory that creates missing topics before opening a client
    pub fn new(broker: Arc<InMemoryBroker>) -> Self {
        Self {
            broker,
            create_missing: true,
        }
    }

    /// Factory that requires topics to exist already
    pub fn require_existing(broker: Arc<InMemoryBroker>) -> Self {
        Self {
            broker,
            create_missing: false,
        }
    }
}

#[async_trait]
impl ClientFactory for BrokerClientFactory {
    type Client = TopicClient;

    async fn create(&self, destination: &str) -> Result<TopicClient> {
        let topic = if self.create_missing {
            self.broker.ensure_topic(destination).await
        } else {
            self.broker.topic(destination).await.ok_or_else(|| {
                GatewayError::provisioning(destination, "topic does not exist")
            })?
        };
        debug!(topic = destination, "Opened topic client");
        Ok(TopicClient { topic })
    }
}

/// Per-message options for topic produce
#[derive(Debug, Clone, Copy)]
pub struct TopicProduceOptions {
    /// Wait for the broker's publish confirmation
    pub confirm: bool,
}

impl Default for TopicProduceOptions {
    fn default() -> Self {
        Self { confirm: true }
    }
}

/// Producer that republishes to broker topics through the client registry
pub struct TopicProducer {
    registry: ClientRegistry<BrokerClientFactory>,
    metrics: ProducerMetrics,
    running: AtomicBool,
}

impl TopicProducer {
    /// Create a producer over the given factory
    pub fn new(factory: BrokerClientFactory) -> Self {
        Self {
            registry: ClientRegistry::new(factory),
            metrics: ProducerMetrics::new("topic_producer"),
            running: AtomicBool::new(false),
        }
    }

    /// The underlying registry, for shutdown/flush routines
    pub fn registry(&self) -> &ClientRegistry<BrokerClientFactory> {
        &self.registry
    }
}

#[async_trait]
impl Producer for TopicProducer {
    type Options = TopicProduceOptions;

    async fn produce(
        &self,
        stream: &StreamName,
        message: NewEvent,
        options: &TopicProduceOptions,
        cancellation: &CancellationSignal,
    ) -> Result<ProduceResult> {
        if cancellation.is_cancelled() {
            return Err(GatewayError::cancelled(format!("publish to {}", stream)));
        }

        let start = Instant::now();
        let client = self.registry.get_or_create(stream.as_str()).await?;

        if !options.confirm {
            // Fire-and-forget: hand off to the runtime and report delivered
            tokio::spawn(async move {
                let _ = client.publish(message).await;
            });
            return Ok(ProduceResult::delivered());
        }

        let result = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                Err(GatewayError::cancelled(format!("publish to {}", stream)))
            }
            published = client.publish(message) => published,
        };

        match result {
            Ok(position) => {
                self.metrics.record_produce_latency(start.elapsed());
                trace!(topic = %stream, position, "Published to topic");
                Ok(ProduceResult {
                    stream_position: Some(position),
                    global_position: None,
                })
            }
            Err(err) => {
                self.metrics
                    .record_error(if err.is_cancelled() { "cancelled" } else { "publish" });
                Err(err)
            }
        }
    }
}

#[async_trait]
impl Lifecycle for TopicProducer {
    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!("Topic producer started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        // Drain every live client before shutdown
        for client in self.registry.get_all() {
            client.flush().await?;
        }
        info!(clients = self.registry.ready_count(), "Topic producer stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthCheck for TopicProducer {
    async fn health_check(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(GatewayError::produce("topic producer not running"))
        }
    }

    fn component_name(&self) -> &'static str {
        "topic_producer"
    }
}
