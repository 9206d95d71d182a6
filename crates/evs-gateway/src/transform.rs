//! Built-in route transforms
//!
//! Small reusable transforms for the common shovel shapes: mirror the
//! source stream on the target side, or rename it with a prefix. Systems
//! with richer routing implement [`RouteTransform`] directly.

use async_trait::async_trait;
use evs_gateway_core::prelude::*;

fn forward_event(context: &ConsumeContext, source_id: &Option<String>) -> NewEvent {
    let mut meta = Metadata::new()
        .with_causation_id(context.message_id().to_string())
        .merge(context.metadata());
    if meta.source.is_none() {
        meta.source = source_id.clone();
    }
    NewEvent::new(context.message_type(), context.payload().clone()).with_metadata(meta)
}

/// Routes every inbound message to the target stream of the same name
pub struct MirrorTransform<O> {
    options: O,
    source_id: Option<String>,
}

impl<O> MirrorTransform<O> {
    /// Create a mirror transform using fixed produce options
    pub fn new(options: O) -> Self {
        Self {
            options,
            source_id: None,
        }
    }

    /// Builder: stamp a source identifier into outgoing metadata
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }
}

#[async_trait]
impl<O: Clone + Send + Sync + 'static> RouteTransform for MirrorTransform<O> {
    type Options = O;

    async fn route(&self, context: &ConsumeContext) -> Result<Vec<GatewayMessage<O>>> {
        Ok(vec![GatewayMessage::new(
            context.stream().clone(),
            forward_event(context, &self.source_id),
            self.options.clone(),
        )])
    }
}

/// Routes every inbound message to `{prefix}-{source stream}`
pub struct StreamPrefixTransform<O> {
    prefix: String,
    options: O,
    source_id: Option<String>,
}

impl<O> StreamPrefixTransform<O> {
    /// Create a prefixing transform using fixed produce options
    pub fn new(prefix: impl Into<String>, options: O) -> Self {
        Self {
            prefix: prefix.into(),
            options,
            source_id: None,
        }
    }

    /// Builder: stamp a source identifier into outgoing metadata
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }
}

#[async_trait]
impl<O: Clone + Send + Sync + 'static> RouteTransform for StreamPrefixTransform<O> {
    type Options = O;

    async fn route(&self, context: &ConsumeContext) -> Result<Vec<GatewayMessage<O>>> {
        let target = StreamName::new(format!("{}-{}", self.prefix, context.stream()));
        Ok(vec![GatewayMessage::new(
            target,
            forward_event(context, &self.source_id),
            self.options.clone(),
        )])
    }
}
